//! Structured Query Module
//!
//! Extends the plain `key=value` affix grammar with two richer forms,
//! both evaluated against an object's full metadata record set:
//!
//! - **Multi-condition queries** (`condition.rs`): conditions joined by
//!   `AND`/`OR`, with comparison, containment and regex operators.
//! - **Range queries** (`range.rs`): `key in range [min to max]` over
//!   numeric values or dates (converted to days since epoch).
//!
//! Parsing failures surface as `QueryParseError` and leave no state
//! behind; the caller decides whether to report or retry.

pub mod condition;
pub mod range;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryParseError {
    #[error("invalid condition, no operator found: '{0}'")]
    InvalidCondition(String),

    #[error("invalid range query format: '{0}'")]
    InvalidRange(String),

    #[error("invalid date '{0}' for format {1}")]
    InvalidDate(String, String),
}

/// True when a query string uses the structured grammar (multi-condition
/// or range) rather than the plain affix form.
pub fn is_structured(query: &str) -> bool {
    range::RangeQuery::looks_like(query) || condition::MultiConditionQuery::looks_like(query)
}

#[cfg(test)]
mod tests;
