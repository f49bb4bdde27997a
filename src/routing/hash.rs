//! Consistent Hash Ring
//!
//! Maps opaque string keys to server IDs over a ring of virtual positions.
//! Every server contributes `RING_SIZE` positions, produced by hashing
//! `"server<i>_<k>"` with FNV-1a. Lookups walk the sorted ring with a
//! binary search and wrap around at the end.

/// Number of hash positions each server contributes to the ring.
pub const RING_SIZE: usize = 40;

/// 64-bit FNV-1a. Used for ring positions and key lookups.
pub fn fnv1a_64(key: &str) -> u64 {
    let mut hash: u64 = 14695981039346656037;
    for byte in key.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

/// 32-bit FNV-1a variant, used where hashes feed small modular reductions
/// (virtual-node fallback assignment).
pub fn fnv1a_32(key: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in key.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// A consistent hash ring over `num_servers` servers.
///
/// Entries are `(position, server_id)` pairs sorted by position. The sort is
/// stable, so when two entries collide on a position the lower server ID
/// (inserted first) wins.
pub struct ConsistentHashRing {
    num_servers: usize,
    ring: Vec<(u64, usize)>,
}

impl ConsistentHashRing {
    pub fn new(num_servers: usize) -> Self {
        let mut ring = Vec::with_capacity(num_servers * RING_SIZE);
        for server in 0..num_servers {
            for k in 0..RING_SIZE {
                let position = fnv1a_64(&format!("server{}_{}", server, k));
                ring.push((position, server));
            }
        }
        ring.sort_by_key(|&(position, _)| position);

        Self { num_servers, ring }
    }

    pub fn num_servers(&self) -> usize {
        self.num_servers
    }

    /// Returns the server responsible for `key`.
    ///
    /// An empty ring maps every key to server 0.
    pub fn server_for(&self, key: &str) -> usize {
        if self.ring.is_empty() {
            return 0;
        }

        let key_hash = fnv1a_64(key);
        let idx = self.ring.partition_point(|&(position, _)| position < key_hash);
        let idx = if idx == self.ring.len() { 0 } else { idx };

        self.ring[idx].1
    }

    /// Returns the primary plus up to `replication_factor` distinct replica
    /// servers for `key`, in ring order starting at the primary.
    ///
    /// The result holds `min(replication_factor + 1, num_servers)` distinct
    /// server IDs; the first entry equals `server_for(key)`.
    pub fn replica_servers(&self, key: &str, replication_factor: usize) -> Vec<usize> {
        let mut servers = Vec::new();
        if self.ring.is_empty() || replication_factor == 0 {
            return servers;
        }

        let key_hash = fnv1a_64(key);
        let start = self.ring.partition_point(|&(position, _)| position < key_hash);
        let start = if start == self.ring.len() { 0 } else { start };

        let wanted = (replication_factor + 1).min(self.num_servers);
        let mut idx = start;

        servers.push(self.ring[idx].1);
        let mut steps = 0;
        while servers.len() < wanted && steps < self.ring.len() {
            idx = (idx + 1) % self.ring.len();
            steps += 1;
            let candidate = self.ring[idx].1;
            if !servers.contains(&candidate) {
                servers.push(candidate);
            }
        }

        servers
    }
}
