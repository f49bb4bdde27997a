//! Multi-condition queries.
//!
//! Grammar: `cond ((" AND " | " OR ") cond)*` with
//! `cond := key <op> value`. A condition matches an object when any of
//! its `(key, value)` records satisfies it. Conditions are evaluated
//! strictly left to right with short-circuiting; `AND` and `OR` carry
//! equal precedence.

use regex::Regex;

use super::QueryParseError;
use crate::index::pattern::AffixPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Contains,
    StartsWith,
    EndsWith,
    RegexMatch,
}

impl ConditionOp {
    fn as_str(self) -> &'static str {
        match self {
            ConditionOp::Equals => "=",
            ConditionOp::NotEquals => "!=",
            ConditionOp::GreaterThan => ">",
            ConditionOp::LessThan => "<",
            ConditionOp::GreaterEqual => ">=",
            ConditionOp::LessEqual => "<=",
            ConditionOp::Contains => "contains",
            ConditionOp::StartsWith => "startsWith",
            ConditionOp::EndsWith => "endsWith",
            ConditionOp::RegexMatch => "~=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A single `key <op> value` condition. The key side always honors affix
/// wildcards; the value side honors them for `=` and `!=`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub key: String,
    pub op: ConditionOp,
    pub value: String,
}

pub(crate) fn parse_numeric(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

impl Condition {
    /// Parses a condition, scanning compound operators before their
    /// single-character prefixes so `>=` is never read as `>`.
    pub fn parse(condition_str: &str) -> Result<Self, QueryParseError> {
        const OPERATORS: [(&str, ConditionOp); 10] = [
            (">=", ConditionOp::GreaterEqual),
            ("<=", ConditionOp::LessEqual),
            ("!=", ConditionOp::NotEquals),
            ("~=", ConditionOp::RegexMatch),
            ("contains", ConditionOp::Contains),
            ("startsWith", ConditionOp::StartsWith),
            ("endsWith", ConditionOp::EndsWith),
            (">", ConditionOp::GreaterThan),
            ("<", ConditionOp::LessThan),
            ("=", ConditionOp::Equals),
        ];

        for (token, op) in OPERATORS {
            if let Some(pos) = condition_str.find(token) {
                let key = condition_str[..pos].trim();
                let value = condition_str[pos + token.len()..].trim();
                return Ok(Self {
                    key: key.to_string(),
                    op,
                    value: value.to_string(),
                });
            }
        }

        Err(QueryParseError::InvalidCondition(condition_str.to_string()))
    }

    /// Whether one `(key, value)` record satisfies this condition.
    pub fn matches(&self, record_key: &str, record_value: &str) -> bool {
        if !AffixPattern::parse(&self.key).matches(record_key) {
            return false;
        }

        let value = record_value;
        match self.op {
            ConditionOp::Equals => AffixPattern::parse(&self.value).matches(value),
            ConditionOp::NotEquals => !AffixPattern::parse(&self.value).matches(value),
            ConditionOp::GreaterThan => Self::compare(value, &self.value, |o| o.is_gt()),
            ConditionOp::LessThan => Self::compare(value, &self.value, |o| o.is_lt()),
            ConditionOp::GreaterEqual => Self::compare(value, &self.value, |o| o.is_ge()),
            ConditionOp::LessEqual => Self::compare(value, &self.value, |o| o.is_le()),
            ConditionOp::Contains => value.contains(&self.value),
            ConditionOp::StartsWith => value.starts_with(&self.value),
            ConditionOp::EndsWith => value.ends_with(&self.value),
            ConditionOp::RegexMatch => match Regex::new(&format!("^(?:{})$", self.value)) {
                Ok(pattern) => pattern.is_match(value),
                Err(e) => {
                    tracing::warn!("invalid regex pattern '{}': {}", self.value, e);
                    false
                }
            },
        }
    }

    /// Compares numerically when both sides parse as numbers,
    /// lexicographically otherwise.
    fn compare(left: &str, right: &str, accept: fn(std::cmp::Ordering) -> bool) -> bool {
        match (parse_numeric(left), parse_numeric(right)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .is_some_and(accept),
            _ => accept(left.cmp(right)),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.key, self.op.as_str(), self.value)
    }
}

/// A chain of conditions joined by logical operators.
#[derive(Debug, Clone, Default)]
pub struct MultiConditionQuery {
    conditions: Vec<Condition>,
    operators: Vec<LogicalOp>,
}

impl MultiConditionQuery {
    pub fn new(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
            operators: Vec::new(),
        }
    }

    pub fn add_condition(&mut self, op: LogicalOp, condition: Condition) {
        if !self.conditions.is_empty() {
            self.operators.push(op);
        }
        self.conditions.push(condition);
    }

    /// Cheap syntactic check for the multi-condition grammar, used to pick
    /// the evaluation path for an incoming query string.
    pub fn looks_like(query: &str) -> bool {
        query.contains(" AND ")
            || query.contains(" OR ")
            || query.contains("!=")
            || query.contains("~=")
            || query.contains('>')
            || query.contains('<')
            || query.contains(" contains ")
            || query.contains(" startsWith ")
            || query.contains(" endsWith ")
    }

    /// Parses `cond (AND|OR cond)*`, splitting on connective tokens left
    /// to right.
    pub fn parse(query: &str) -> Result<Self, QueryParseError> {
        let mut parsed = Self::default();
        let mut rest = query.trim();
        let mut pending_op: Option<LogicalOp> = None;

        loop {
            let and_pos = rest.find(" AND ");
            let or_pos = rest.find(" OR ");

            let (condition_str, next_op, remainder) = match (and_pos, or_pos) {
                (Some(a), Some(o)) if a < o => (&rest[..a], Some(LogicalOp::And), &rest[a + 5..]),
                (Some(_), Some(o)) => (&rest[..o], Some(LogicalOp::Or), &rest[o + 4..]),
                (Some(a), None) => (&rest[..a], Some(LogicalOp::And), &rest[a + 5..]),
                (None, Some(o)) => (&rest[..o], Some(LogicalOp::Or), &rest[o + 4..]),
                (None, None) => (rest, None, ""),
            };

            let condition = Condition::parse(condition_str)?;
            match pending_op {
                None => parsed.conditions.push(condition),
                Some(op) => parsed.add_condition(op, condition),
            }

            match next_op {
                Some(op) => {
                    pending_op = Some(op);
                    rest = remainder;
                }
                None => break,
            }
        }

        Ok(parsed)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluates the chain against an object's metadata records, strictly
    /// left to right with short-circuiting. An empty query matches
    /// everything.
    pub fn matches(&self, records: &[(String, String)]) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        let satisfied = |condition: &Condition| {
            records
                .iter()
                .any(|(key, value)| condition.matches(key, value))
        };

        let mut result = satisfied(&self.conditions[0]);

        for (i, op) in self.operators.iter().enumerate() {
            match op {
                LogicalOp::And => {
                    if !result {
                        break;
                    }
                    result = result && satisfied(&self.conditions[i + 1]);
                }
                LogicalOp::Or => {
                    if result {
                        break;
                    }
                    result = result || satisfied(&self.conditions[i + 1]);
                }
            }
        }

        result
    }
}

impl std::fmt::Display for MultiConditionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.conditions.is_empty() {
            return Ok(());
        }

        write!(f, "{}", self.conditions[0])?;
        for (i, op) in self.operators.iter().enumerate() {
            let op_str = match op {
                LogicalOp::And => "AND",
                LogicalOp::Or => "OR",
            };
            write!(f, " {} {}", op_str, self.conditions[i + 1])?;
        }
        Ok(())
    }
}
