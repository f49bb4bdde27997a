//! Query Routing Module
//!
//! This module decides which servers see which records and queries.
//!
//! ## Architecture Overview
//! Routing is layered:
//! 1. **Hash ring** (`hash`): consistent hashing with virtual positions per
//!    server; provides stable key-to-server and replica-set lookups.
//! 2. **DART router** (`router`): a prefix-affinity layer on top of the
//!    ring. A fixed pool of 256 virtual nodes, each owning a short key
//!    prefix, is assigned to servers through the ring. Queries are
//!    classified by the affix shape of their key portion and fanned out to
//!    the minimum server set that can hold matches.
//!
//! ## Submodules
//! - **`hash`**: FNV-1a hashing and the consistent hash ring.
//! - **`vnode`**: the virtual-node type and the fixed prefix pool.
//! - **`router`**: shape-aware destination selection, mapping persistence,
//!   and server remapping after membership changes.

pub mod hash;
pub mod router;
pub mod vnode;

#[cfg(test)]
mod tests;
