//! Query Popularity Module
//!
//! Tracks how often each key pattern is queried and turns sustained
//! interest into a higher replication factor for the affected keys.
//!
//! ## Submodules
//! - **`tracker`**: per-pattern exponentially decayed scores with a
//!   rich-get-richer bonus above the popularity threshold.
//! - **`adaptive`**: the router wrapper that records queries and
//!   substitutes the adaptive replication factor into replica selection.

pub mod adaptive;
pub mod tracker;
