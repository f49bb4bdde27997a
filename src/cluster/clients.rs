//! Client Manager
//!
//! Registry of concurrently active client handles inside one client
//! process. Handles are keyed by a monotonically assigned id; lookups of
//! unknown ids are reported and ignored rather than escalated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::client::MeshClient;
use super::fault::FaultManager;
use crate::config::ClusterConfig;

pub struct ClientManager {
    config: Arc<ClusterConfig>,
    fault: Option<Arc<FaultManager>>,
    clients: DashMap<u64, Arc<MeshClient>>,
    next_client_id: AtomicU64,
}

impl ClientManager {
    pub fn new(config: Arc<ClusterConfig>, fault: Option<Arc<FaultManager>>) -> Self {
        tracing::info!(
            "client manager initialized for {} server processes",
            config.num_servers
        );

        Self {
            config,
            fault,
            clients: DashMap::new(),
            next_client_id: AtomicU64::new(0),
        }
    }

    /// Creates and registers a new client handle, returning its id.
    pub fn register_client(&self) -> u64 {
        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);

        let router = Arc::new(tokio::sync::RwLock::new(super::client::build_router(
            &self.config,
        )));
        let client = MeshClient::with_router(
            Arc::clone(&self.config),
            router,
            self.fault.clone(),
        );
        self.clients.insert(client_id, Arc::new(client));

        tracing::info!("registered client {}", client_id);
        client_id
    }

    /// Drops a client handle. Unknown ids are ignored.
    pub fn unregister_client(&self, client_id: u64) {
        if self.clients.remove(&client_id).is_some() {
            tracing::info!("unregistered client {}", client_id);
        } else {
            tracing::warn!("unregister of unknown client id {}", client_id);
        }
    }

    /// Looks up a client handle. Invalid ids are logged and yield `None`.
    pub fn client(&self, client_id: u64) -> Option<Arc<MeshClient>> {
        let found = self.clients.get(&client_id).map(|c| Arc::clone(&c));
        if found.is_none() {
            tracing::warn!("lookup of invalid client id {}", client_id);
        }
        found
    }

    pub fn is_valid_client(&self, client_id: u64) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Ids of every registered client, ascending.
    pub fn active_client_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.clients.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}
