//! Virtual Nodes
//!
//! A virtual node is the hand-off unit between key-space and server-space:
//! it carries a short prefix and a stable ID. The router materializes a
//! fixed pool of 256 virtual nodes at construction by cycling through a
//! seed list of prefixes. The empty-prefix node acts as a catch-all for
//! keys no other prefix claims.

/// Fixed size of the virtual-node pool.
pub const NUM_VIRTUAL_NODES: usize = 256;

/// A routing unit binding a key prefix to a stable ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    id: u32,
    prefix: String,
}

impl VirtualNode {
    pub fn new(id: u32, prefix: impl Into<String>) -> Self {
        Self {
            id,
            prefix: prefix.into(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True when `key` falls under this virtual node's prefix.
    /// The empty-prefix node matches every key.
    pub fn contains_key(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }
}

/// Two-character prefixes for combinations common in scientific metadata
/// keys (StageX, FILE_PATH, DataSet, ...).
const COMMON_PREFIXES: [&str; 20] = [
    "St", "Fi", "Da", "Ti", "Us", "Pr", "Sp", "Ke", "Va", "Ex", "Co", "In", "Re", "De", "Tr",
    "Lo", "Po", "Pa", "Mo", "Se",
];

/// Punctuation that shows up at the start of metadata keys (paths, dotted
/// names, sigil-prefixed attributes).
const SPECIAL_CHARS: &str = "_-./,:;!@#$%^&*()";

fn seed_prefixes() -> Vec<String> {
    let mut prefixes = Vec::new();

    for c in 'a'..='z' {
        prefixes.push(c.to_string());
    }
    for c in 'A'..='Z' {
        prefixes.push(c.to_string());
    }
    for c in '0'..='9' {
        prefixes.push(c.to_string());
    }
    for c in SPECIAL_CHARS.chars() {
        prefixes.push(c.to_string());
    }
    for prefix in COMMON_PREFIXES {
        prefixes.push(prefix.to_string());
    }

    // Last-resort catch-all for keys no concrete prefix claims.
    prefixes.push(String::new());

    prefixes
}

/// Materializes the fixed pool of virtual nodes by cycling through the seed
/// prefix list until `NUM_VIRTUAL_NODES` exist. IDs are assigned in
/// creation order and are stable for a given pool size.
pub fn build_virtual_node_pool() -> Vec<VirtualNode> {
    let prefixes = seed_prefixes();
    let mut pool = Vec::with_capacity(NUM_VIRTUAL_NODES);

    while pool.len() < NUM_VIRTUAL_NODES {
        for prefix in &prefixes {
            if pool.len() >= NUM_VIRTUAL_NODES {
                break;
            }
            let id = pool.len() as u32;
            pool.push(VirtualNode::new(id, prefix.clone()));
        }
    }

    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_has_exactly_256_nodes() {
        let pool = build_virtual_node_pool();
        assert_eq!(pool.len(), NUM_VIRTUAL_NODES);

        for (i, vnode) in pool.iter().enumerate() {
            assert_eq!(vnode.id(), i as u32);
        }
    }

    #[test]
    fn test_pool_contains_catch_all() {
        let pool = build_virtual_node_pool();
        assert!(pool.iter().any(|v| v.prefix().is_empty()));
    }

    #[test]
    fn test_contains_key() {
        let vnode = VirtualNode::new(7, "St");
        assert!(vnode.contains_key("StageX"));
        assert!(!vnode.contains_key("Samples"));

        let catch_all = VirtualNode::new(8, "");
        assert!(catch_all.contains_key("~odd"));
        assert!(catch_all.contains_key(""));
    }
}
