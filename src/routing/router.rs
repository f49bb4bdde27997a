//! DART Router
//!
//! Translates keys and query strings into the minimum set of destination
//! servers. Owns the fixed virtual-node pool, assigns virtual nodes to
//! servers by consistent-hashing `"vnode_<id>"`, and classifies queries
//! into fan-out sets by the affix shape of the key portion.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::hash::{ConsistentHashRing, fnv1a_32};
use super::vnode::{VirtualNode, build_virtual_node_pool};
use crate::index::pattern::{AffixPattern, split_query};

/// Version header of the persisted virtual-node mapping file.
const MAPPING_HEADER: &str = "DART_MAPPING_V1";

/// Prefix-affinity router over a consistent hash ring.
pub struct DartRouter {
    num_servers: usize,
    replication_factor: usize,
    server_map: ConsistentHashRing,
    virtual_nodes: Vec<VirtualNode>,
    vnode_to_server: HashMap<u32, usize>,
    server_to_vnodes: HashMap<usize, Vec<u32>>,
}

impl DartRouter {
    /// Builds a router for `num_servers` servers. The replication factor is
    /// `max(1, floor(num_servers * replication_ratio))`.
    pub fn new(num_servers: usize, replication_ratio: f64) -> Self {
        let replication_factor = ((num_servers as f64 * replication_ratio) as usize).max(1);
        let server_map = ConsistentHashRing::new(num_servers);

        let mut router = Self {
            num_servers,
            replication_factor,
            server_map,
            virtual_nodes: Vec::new(),
            vnode_to_server: HashMap::new(),
            server_to_vnodes: HashMap::new(),
        };
        router.initialize_virtual_nodes();

        tracing::info!(
            "DART router initialized with {} servers, replication factor {}, {} virtual nodes",
            num_servers,
            replication_factor,
            router.virtual_nodes.len()
        );

        router
    }

    fn initialize_virtual_nodes(&mut self) {
        self.virtual_nodes = build_virtual_node_pool();
        self.assign_virtual_nodes();
    }

    fn assign_virtual_nodes(&mut self) {
        self.vnode_to_server.clear();
        self.server_to_vnodes.clear();

        for vnode in &self.virtual_nodes {
            let key = format!("vnode_{}", vnode.id());
            let server_id = self.server_map.server_for(&key);

            self.vnode_to_server.insert(vnode.id(), server_id);
            self.server_to_vnodes
                .entry(server_id)
                .or_default()
                .push(vnode.id());
        }
    }

    pub fn num_servers(&self) -> usize {
        self.num_servers
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Returns the virtual node owning `key`: the first node in ID order
    /// whose prefix is a prefix of the key. The empty-prefix node matches
    /// everything, so the scan always terminates with a hit; the hash
    /// fallback only guards a pool built without the catch-all.
    pub fn virtual_node_id(&self, key: &str) -> u32 {
        for vnode in &self.virtual_nodes {
            if vnode.contains_key(key) {
                return vnode.id();
            }
        }

        fnv1a_32(key) % self.virtual_nodes.len() as u32
    }

    pub fn server_for_virtual_node(&self, vnode_id: u32) -> usize {
        match self.vnode_to_server.get(&vnode_id) {
            Some(&server_id) => server_id,
            None => fnv1a_32(&vnode_id.to_string()) as usize % self.num_servers,
        }
    }

    /// All virtual-node IDs currently assigned to `server_id`. Used by the
    /// recovery coordinator to plan which partitions a failed server held.
    pub fn virtual_nodes_for_server(&self, server_id: usize) -> Vec<u32> {
        self.server_to_vnodes
            .get(&server_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Primary plus replica servers for `key`, using the configured
    /// replication factor.
    pub fn servers_for_key(&self, key: &str) -> Vec<usize> {
        self.servers_for_key_with_factor(key, self.replication_factor)
    }

    /// Primary plus replica servers for `key` with an explicit replication
    /// factor. The primary comes from the virtual-node mapping; replicas
    /// come from the hash ring, excluding the primary, capped at
    /// `replication_factor` additional servers.
    pub fn servers_for_key_with_factor(&self, key: &str, replication_factor: usize) -> Vec<usize> {
        let mut servers = Vec::new();

        let primary = self.server_for_virtual_node(self.virtual_node_id(key));
        servers.push(primary);

        if replication_factor > 0 {
            for server_id in self.server_map.replica_servers(key, replication_factor) {
                if server_id != primary && !servers.contains(&server_id) {
                    servers.push(server_id);
                    if servers.len() >= replication_factor + 1 {
                        break;
                    }
                }
            }
        }

        servers
    }

    /// Servers that may hold keys with the given prefix: every virtual node
    /// whose prefix extends the query, or which the query extends. An empty
    /// result degrades to a full fan-out.
    pub fn servers_for_prefix_query(&self, prefix: &str) -> Vec<usize> {
        let mut servers = Vec::new();

        for vnode in &self.virtual_nodes {
            let node_prefix = vnode.prefix();
            if node_prefix.starts_with(prefix) || prefix.starts_with(node_prefix) {
                let server_id = self.server_for_virtual_node(vnode.id());
                if !servers.contains(&server_id) {
                    servers.push(server_id);
                }
            }
        }

        if servers.is_empty() {
            return (0..self.num_servers).collect();
        }

        servers
    }

    /// In suffix-tree mode each suffix is indexed as its own key, so a
    /// suffix query routes like an exact lookup of the suffix.
    pub fn servers_for_suffix_query(&self, suffix: &str) -> Vec<usize> {
        self.servers_for_key(suffix)
    }

    /// Infix queries resolve through the suffixes that begin with the
    /// infix, which is a prefix fan-out.
    pub fn servers_for_infix_query(&self, infix: &str) -> Vec<usize> {
        self.servers_for_prefix_query(infix)
    }

    pub fn servers_for_wildcard_query(&self) -> Vec<usize> {
        (0..self.num_servers).collect()
    }

    /// Destination-server set for a full `keyPattern=valuePattern` query,
    /// classified by the affix shape of the key portion.
    pub fn destination_servers(&self, query: &str) -> Vec<usize> {
        let (key_part, _) = split_query(query);

        match AffixPattern::parse(&key_part) {
            AffixPattern::Wildcard => self.servers_for_wildcard_query(),
            AffixPattern::Infix(infix) => self.servers_for_infix_query(&infix),
            AffixPattern::Suffix(suffix) => self.servers_for_suffix_query(&suffix),
            AffixPattern::Prefix(prefix) => self.servers_for_prefix_query(&prefix),
            AffixPattern::Exact(key) => self.servers_for_key(&key),
        }
    }

    /// Persists the virtual-node/server mapping as a versioned text file.
    pub fn save_mapping(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        out.push_str(MAPPING_HEADER);
        out.push('\n');
        out.push_str(&format!("{} {}\n", self.num_servers, self.replication_factor));
        out.push_str(&format!("{}\n", self.virtual_nodes.len()));

        for vnode in &self.virtual_nodes {
            out.push_str(&format!("{} {}\n", vnode.id(), vnode.prefix()));
        }
        for vnode in &self.virtual_nodes {
            if let Some(server_id) = self.vnode_to_server.get(&vnode.id()) {
                out.push_str(&format!("{} {}\n", vnode.id(), server_id));
            }
        }

        fs::write(path, out).with_context(|| format!("writing mapping to {}", path.display()))?;
        Ok(())
    }

    /// Loads a previously saved mapping. Returns `Ok(false)` without
    /// touching the router when the stored server count differs from the
    /// current one (the caller must remap instead) or when the file carries
    /// an unknown version header.
    pub fn load_mapping(&mut self, path: &Path) -> Result<bool> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading mapping from {}", path.display()))?;
        let mut lines = content.lines();

        if lines.next() != Some(MAPPING_HEADER) {
            tracing::warn!("mapping file {} has an unknown header", path.display());
            return Ok(false);
        }

        let counts = lines.next().unwrap_or_default();
        let mut parts = counts.split_whitespace();
        let stored_servers: usize = parts.next().unwrap_or("0").parse().unwrap_or(0);
        let stored_replication: usize = parts.next().unwrap_or("0").parse().unwrap_or(0);

        if stored_servers != self.num_servers {
            tracing::warn!(
                "stored server count ({}) does not match current ({}); remapping required",
                stored_servers,
                self.num_servers
            );
            return Ok(false);
        }

        let vnode_count: usize = lines.next().unwrap_or("0").parse().unwrap_or(0);

        let mut virtual_nodes = Vec::with_capacity(vnode_count);
        for _ in 0..vnode_count {
            let Some(line) = lines.next() else {
                return Ok(false);
            };
            let (id_str, prefix) = line.split_once(' ').unwrap_or((line, ""));
            let Ok(id) = id_str.parse::<u32>() else {
                return Ok(false);
            };
            virtual_nodes.push(VirtualNode::new(id, prefix));
        }

        let mut vnode_to_server = HashMap::new();
        let mut server_to_vnodes: HashMap<usize, Vec<u32>> = HashMap::new();
        for line in lines {
            let mut parts = line.split_whitespace();
            if let (Some(Ok(vnode_id)), Some(Ok(server_id))) = (
                parts.next().map(str::parse::<u32>),
                parts.next().map(str::parse::<usize>),
            ) {
                vnode_to_server.insert(vnode_id, server_id);
                server_to_vnodes.entry(server_id).or_default().push(vnode_id);
            }
        }

        self.replication_factor = stored_replication;
        self.virtual_nodes = virtual_nodes;
        self.vnode_to_server = vnode_to_server;
        self.server_to_vnodes = server_to_vnodes;

        Ok(true)
    }

    /// Rebuilds the ring for a new server count and reassigns every virtual
    /// node. Returns how many virtual nodes changed server, i.e. the size
    /// of the migration plan.
    pub fn remap_servers(&mut self, new_num_servers: usize) -> usize {
        if new_num_servers == 0 {
            return 0;
        }

        let previous = self.vnode_to_server.clone();

        self.num_servers = new_num_servers;
        self.replication_factor = ((new_num_servers as f64 * 0.1) as usize).max(1);
        self.server_map = ConsistentHashRing::new(new_num_servers);
        self.assign_virtual_nodes();

        let migrations = self
            .virtual_nodes
            .iter()
            .filter(|vnode| {
                previous
                    .get(&vnode.id())
                    .is_some_and(|old| self.vnode_to_server.get(&vnode.id()) != Some(old))
            })
            .count();

        tracing::info!(
            "server count changed to {}; replication factor now {}; {} virtual nodes need migration",
            new_num_servers,
            self.replication_factor,
            migrations
        );

        migrations
    }
}
