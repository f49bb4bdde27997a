//! Cluster Client
//!
//! The client-side API over the distributed index: routes every record to
//! its replica set, fans queries out to the minimum destination set, and
//! unions the per-server results into one sorted, deduplicated answer.
//! Per-replica failures never abort the remaining replicas; the client
//! aggregates what each peer returned.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use tokio::sync::RwLock;

use super::fault::{FaultManager, ServerStatus};
use super::protocol::Message;
use super::transport::Connection;
use crate::config::ClusterConfig;
use crate::index::ObjectId;
use crate::popularity::adaptive::AdaptiveRouter;
use crate::popularity::tracker::PopularityTracker;
use crate::query::condition::MultiConditionQuery;
use crate::query::range::RangeQuery;
use crate::routing::router::DartRouter;

pub struct MeshClient {
    config: Arc<ClusterConfig>,
    router: Arc<RwLock<AdaptiveRouter>>,
    connections: DashMap<usize, Arc<Connection>>,
    fault: Option<Arc<FaultManager>>,
}

impl MeshClient {
    /// Builds a client with its own router and popularity tracker.
    pub fn new(config: Arc<ClusterConfig>) -> Self {
        let router = Arc::new(RwLock::new(build_router(&config)));
        Self::with_router(config, router, None)
    }

    /// Builds a client over an externally owned router (shared with the
    /// fault manager so recovery remaps are visible here).
    pub fn with_router(
        config: Arc<ClusterConfig>,
        router: Arc<RwLock<AdaptiveRouter>>,
        fault: Option<Arc<FaultManager>>,
    ) -> Self {
        Self {
            config,
            router,
            connections: DashMap::new(),
            fault,
        }
    }

    pub fn router(&self) -> &Arc<RwLock<AdaptiveRouter>> {
        &self.router
    }

    fn is_confirmed_down(&self, server_id: usize) -> bool {
        self.fault
            .as_ref()
            .is_some_and(|f| f.server_status(server_id) == Some(ServerStatus::ConfirmedDown))
    }

    async fn connection(&self, server_id: usize) -> Result<Arc<Connection>> {
        if let Some(conn) = self.connections.get(&server_id) {
            return Ok(Arc::clone(&conn));
        }

        let conn = Arc::new(Connection::connect(self.config.server_addr(server_id)).await?);
        self.connections.insert(server_id, Arc::clone(&conn));
        Ok(conn)
    }

    /// One request/response exchange with a server. A failed exchange
    /// drops the pooled connection so the next call reconnects.
    async fn request_server(&self, server_id: usize, message: &Message) -> Result<Message> {
        let conn = self.connection(server_id).await?;
        match conn.request(message.channel(), message).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.connections.remove(&server_id);
                Err(e)
            }
        }
    }

    /// Replica set a record must land on. In suffix-tree mode suffix and
    /// infix queries route by the suffix itself, so the record also goes
    /// to the servers owning each proper suffix of the key; without that
    /// placement those queries could miss servers holding matches.
    async fn replica_set_for_record(&self, key: &str) -> Vec<usize> {
        let router = self.router.read().await;
        let mut servers = router.servers_for_key(key);

        if self.config.suffix_mode {
            for (i, _) in key.char_indices().skip(1) {
                for server_id in router.base().servers_for_key(&key[i..]) {
                    if !servers.contains(&server_id) {
                        servers.push(server_id);
                    }
                }
            }
        }

        servers
    }

    /// Creates a metadata index record on every replica of the key.
    /// Returns only after each replica has confirmed its local insert;
    /// partial failures are reported after all replicas were attempted.
    pub async fn create_md_index(&self, key: &str, value: &str, object_id: ObjectId) -> Result<()> {
        let servers = self.replica_set_for_record(key).await;
        tracing::debug!("distributing index for key '{}' to servers {:?}", key, servers);

        let message = Message::CreateIndex {
            key: key.to_string(),
            value: value.to_string(),
            object_id,
        };
        self.send_to_replicas("create_md_index", &servers, &message)
            .await
    }

    /// Deletes a metadata index record from every replica of the key.
    pub async fn delete_md_index(&self, key: &str, value: &str, object_id: ObjectId) -> Result<()> {
        let servers = self.replica_set_for_record(key).await;
        tracing::debug!("routing delete for key '{}' to servers {:?}", key, servers);

        let message = Message::DeleteIndex {
            key: key.to_string(),
            value: value.to_string(),
            object_id,
        };
        self.send_to_replicas("delete_md_index", &servers, &message)
            .await
    }

    async fn send_to_replicas(
        &self,
        operation: &str,
        servers: &[usize],
        message: &Message,
    ) -> Result<()> {
        let mut failed: Vec<usize> = Vec::new();

        for &server_id in servers {
            if self.is_confirmed_down(server_id) {
                tracing::warn!("{}: server {} is down, skipping", operation, server_id);
                failed.push(server_id);
                continue;
            }

            match self.request_server(server_id, message).await {
                Ok(Message::Response { success: true, .. }) => {}
                Ok(reply) => {
                    tracing::warn!(
                        "{}: server {} replied with tag {} instead of success",
                        operation,
                        server_id,
                        reply.type_tag()
                    );
                    failed.push(server_id);
                }
                Err(e) => {
                    // Logged, not retried.
                    tracing::warn!("{}: server {} failed: {}", operation, server_id, e);
                    failed.push(server_id);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} failed on servers {:?}", operation, failed))
        }
    }

    /// Runs a metadata search across the destination-server set and
    /// returns the sorted union of ids. Confirmed-down or unresponsive
    /// servers contribute empty partial results.
    pub async fn md_search(&self, query: &str) -> Result<Vec<ObjectId>> {
        // Surface parse errors here, before any fan-out.
        if RangeQuery::looks_like(query) {
            RangeQuery::parse(query)?;
        } else if MultiConditionQuery::looks_like(query) {
            MultiConditionQuery::parse(query)?;
        }

        let destinations = self.destination_servers(query).await;
        tracing::debug!("query '{}' routed to servers {:?}", query, destinations);

        let message = Message::Query {
            query: query.to_string(),
        };
        let mut result_set: HashSet<ObjectId> = HashSet::new();

        for server_id in destinations {
            if self.is_confirmed_down(server_id) {
                tracing::debug!("query skipping down server {}", server_id);
                continue;
            }

            match self.request_server(server_id, &message).await {
                Ok(Message::Response { results, .. }) => result_set.extend(results),
                Ok(reply) => tracing::warn!(
                    "query: server {} replied with unexpected tag {}",
                    server_id,
                    reply.type_tag()
                ),
                Err(e) => tracing::warn!("query: server {} failed: {}", server_id, e),
            }
        }

        let mut results: Vec<ObjectId> = result_set.into_iter().collect();
        results.sort_unstable();
        Ok(results)
    }

    /// Structured queries scan the metadata map on every server, so they
    /// always fan out to the full cluster.
    async fn destination_servers(&self, query: &str) -> Vec<usize> {
        let router = self.router.read().await;
        if crate::query::is_structured(query) {
            return router.base().servers_for_wildcard_query();
        }
        router.destination_servers(query)
    }

    /// Asks every server to checkpoint its index. Returns per-server
    /// success flags.
    pub async fn checkpoint_all(&self) -> Vec<(usize, bool)> {
        self.admin_broadcast(Message::Checkpoint).await
    }

    /// Asks every server to rebuild its index from its checkpoint.
    pub async fn recover_all(&self) -> Vec<(usize, bool)> {
        self.admin_broadcast(Message::Recover).await
    }

    /// Stops every server.
    pub async fn shutdown_all(&self) -> Vec<(usize, bool)> {
        self.admin_broadcast(Message::Shutdown).await
    }

    async fn admin_broadcast(&self, message: Message) -> Vec<(usize, bool)> {
        let mut outcomes = Vec::with_capacity(self.config.num_servers);

        for server_id in 0..self.config.num_servers {
            if self.is_confirmed_down(server_id) {
                outcomes.push((server_id, false));
                continue;
            }

            let ok = match self.request_server(server_id, &message).await {
                Ok(Message::Response { success, .. }) => success,
                Ok(_) => false,
                Err(e) => {
                    tracing::warn!(
                        "admin message tag {} to server {} failed: {}",
                        message.type_tag(),
                        server_id,
                        e
                    );
                    false
                }
            };
            outcomes.push((server_id, ok));
        }

        outcomes
    }

    /// Decayed popularity scores of every tracked pattern, hottest first.
    pub async fn popularity_stats(&self) -> Vec<(String, f64)> {
        self.router.read().await.popularity_stats()
    }
}

/// Assembles the adaptive router stack from the cluster configuration.
pub fn build_router(config: &ClusterConfig) -> AdaptiveRouter {
    let base = DartRouter::new(config.num_servers, config.replication_ratio);
    let tracker = PopularityTracker::new(
        config.base_replication_factor(),
        config.max_replication_factor,
        config.popularity_threshold,
        config.decay_factor,
    );
    AdaptiveRouter::new(base, tracker, config.adaptive_enabled)
}
