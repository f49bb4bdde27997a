//! Cluster configuration.
//!
//! Everything a process needs to take its place in the cluster is carried
//! in one serializable struct built from construction parameters. Rank 0
//! is the client process; rank `r > 0` runs index server `r - 1`.
//! Addressing is derived: server `i` accepts requests on
//! `base_port + i`, and the fault (UDP) socket of rank `r` sits at
//! `base_port + FAULT_PORT_OFFSET + r`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Offset between a rank's request port and its fault-plane UDP port.
const FAULT_PORT_OFFSET: u16 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of index servers (excluding the client process).
    pub num_servers: usize,
    /// Host every process binds and connects on.
    pub host: String,
    /// TCP request port of server 0.
    pub base_port: u16,
    /// Base data directory; each server owns `server_<id>/` below it.
    pub data_dir: PathBuf,
    /// Build local indices in suffix-tree mode.
    pub suffix_mode: bool,
    /// Base replication ratio; the base replication factor is
    /// `max(1, floor(num_servers * replication_ratio))`.
    pub replication_ratio: f64,
    /// Popularity score above which a pattern counts as hot.
    pub popularity_threshold: f64,
    /// Exponential decay factor per hour of inactivity.
    pub decay_factor: f64,
    /// Enable popularity-driven adaptive replication.
    pub adaptive_enabled: bool,
    /// Upper bound for the adaptive replication factor.
    pub max_replication_factor: usize,
}

impl ClusterConfig {
    pub fn new(num_servers: usize) -> Self {
        Self {
            num_servers,
            host: "127.0.0.1".to_string(),
            base_port: 7400,
            data_dir: PathBuf::from("./metaffix_data"),
            suffix_mode: false,
            replication_ratio: 0.1,
            popularity_threshold: 10.0,
            decay_factor: 0.1,
            adaptive_enabled: false,
            max_replication_factor: num_servers,
        }
    }

    /// TCP request address of an index server.
    pub fn server_addr(&self, server_id: usize) -> SocketAddr {
        format!("{}:{}", self.host, self.base_port + server_id as u16)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], self.base_port)))
    }

    /// Fault-plane UDP address of a process rank (0 = client).
    pub fn fault_addr(&self, rank: usize) -> SocketAddr {
        let port = self.base_port + FAULT_PORT_OFFSET + rank as u16;
        format!("{}:{}", self.host, port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Base replication factor derived from the configured ratio.
    pub fn base_replication_factor(&self) -> usize {
        ((self.num_servers as f64 * self.replication_ratio) as usize).max(1)
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing config from {}", path.display()))
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config to {}", path.display()))
    }
}
