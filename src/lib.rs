//! Distributed Affix Metadata Index Library
//!
//! This library crate defines the core modules that make up the
//! distributed metadata-indexing service. It serves as the foundation for
//! the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`index`**: The local query engine. A two-layer character trie maps
//!   metadata keys to value tries whose terminals hold object-ID sets,
//!   supporting exact, prefix, suffix, infix and wildcard lookups on both
//!   layers (suffix/infix via suffix-tree mode).
//! - **`routing`**: The placement layer. A consistent hash ring plus a
//!   fixed pool of prefix-affine virtual nodes decide which servers store
//!   each record and which servers a query must visit.
//! - **`query`**: The structured query grammars layered over the plain
//!   affix form: multi-condition chains (`AND`/`OR`, comparison and
//!   containment operators) and numeric/date range queries.
//! - **`popularity`**: Query-popularity tracking with exponential decay,
//!   feeding an adaptive replication factor for hot key patterns.
//! - **`cluster`**: The coordination layer. Typed binary wire protocol,
//!   framed TCP request plane, UDP fault plane with heartbeat failure
//!   detection, coordinated recovery, bully leader election, and index
//!   checkpoint/recover.

pub mod cluster;
pub mod config;
pub mod index;
pub mod popularity;
pub mod query;
pub mod routing;
