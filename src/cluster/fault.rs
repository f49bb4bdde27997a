//! Fault Manager
//!
//! Client-side failure detection and recovery orchestration. The client
//! sends a heartbeat every 500 ms to every Active or Suspect server over
//! the UDP fault plane; servers answer with their own heartbeat. Silence
//! moves a server Active -> Suspect after 2 s and Suspect -> ConfirmedDown
//! after 5 s; any heartbeat moves a Suspect or Recovering server back to
//! Active.
//!
//! On ConfirmedDown the lowest-ranked Active server is appointed recovery
//! coordinator, the remaining actives are notified as participants, and
//! the router is remapped to exclude the failed server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

use super::election::LeaderElection;
use super::now_ms;
use super::protocol::{ADMIN_CHANNEL, FAULT_CHANNEL, Message};
use super::transport::{Connection, parse_datagram, send_datagram};
use crate::config::ClusterConfig;
use crate::popularity::adaptive::AdaptiveRouter;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
/// Silence before an Active server becomes Suspect.
pub const SUSPECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Silence before a Suspect server is confirmed down.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a server as seen by the failure detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Active,
    Suspect,
    ConfirmedDown,
    Recovering,
}

struct HealthEntry {
    status: ServerStatus,
    last_heartbeat: Instant,
}

pub struct FaultManager {
    config: Arc<ClusterConfig>,
    status: DashMap<usize, HealthEntry>,
    socket: Arc<UdpSocket>,
    router: Arc<RwLock<AdaptiveRouter>>,
    election: Arc<LeaderElection>,
    running: Arc<AtomicBool>,
}

impl FaultManager {
    /// Binds the client's fault-plane socket and marks every server
    /// Active.
    pub async fn new(
        config: Arc<ClusterConfig>,
        router: Arc<RwLock<AdaptiveRouter>>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(config.fault_addr(0))
            .await
            .context("binding client fault socket")?;
        let socket = Arc::new(socket);

        let status = DashMap::new();
        for server_id in 0..config.num_servers {
            status.insert(server_id, HealthEntry {
                status: ServerStatus::Active,
                last_heartbeat: Instant::now(),
            });
        }

        let election = Arc::new(LeaderElection::new(
            0,
            config.num_servers + 1,
            Arc::clone(&config),
            Arc::clone(&socket),
        ));

        Ok(Arc::new(Self {
            config,
            status,
            socket,
            router,
            election,
            running: Arc::new(AtomicBool::new(false)),
        }))
    }

    pub fn election(&self) -> &Arc<LeaderElection> {
        &self.election
    }

    /// Spawns the heartbeat and receive loops.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.heartbeat_loop().await;
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.receive_loop().await;
        });

        tracing::info!("fault manager started");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn server_status(&self, server_id: usize) -> Option<ServerStatus> {
        self.status.get(&server_id).map(|entry| entry.status)
    }

    pub fn is_server_active(&self, server_id: usize) -> bool {
        self.server_status(server_id) == Some(ServerStatus::Active)
    }

    /// Active server ids in ascending order.
    pub fn active_servers(&self) -> Vec<usize> {
        let mut servers: Vec<usize> = self
            .status
            .iter()
            .filter(|entry| entry.value().status == ServerStatus::Active)
            .map(|entry| *entry.key())
            .collect();
        servers.sort_unstable();
        servers
    }

    /// Feeds one received heartbeat into the detector. A Suspect or
    /// Recovering server returns to Active.
    pub fn process_heartbeat(&self, server_id: usize) {
        if let Some(mut entry) = self.status.get_mut(&server_id) {
            entry.last_heartbeat = Instant::now();

            if entry.status == ServerStatus::Suspect || entry.status == ServerStatus::Recovering {
                tracing::info!("server {} is back online", server_id);
                entry.status = ServerStatus::Active;
            }
        }
    }

    /// Manually marks a server down and starts recovery, bypassing the
    /// timeout path.
    pub fn notify_server_failure(self: &Arc<Self>, server_id: usize) {
        if let Some(mut entry) = self.status.get_mut(&server_id) {
            entry.status = ServerStatus::ConfirmedDown;
        }
        tracing::warn!("server {} manually marked as failed", server_id);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.initiate_recovery(server_id).await;
        });
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            self.send_heartbeats().await;

            for failed in self.check_transitions() {
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    this.initiate_recovery(failed).await;
                });
            }
        }
    }

    async fn send_heartbeats(&self) {
        let heartbeat = Message::Heartbeat {
            sender_id: 0,
            timestamp_ms: now_ms() as i64,
        };

        for server_id in 0..self.config.num_servers {
            let should_send = self
                .status
                .get(&server_id)
                .is_some_and(|entry| {
                    entry.status == ServerStatus::Active || entry.status == ServerStatus::Suspect
                });
            if !should_send {
                continue;
            }

            let addr = self.config.fault_addr(server_id + 1);
            if let Err(e) = send_datagram(&self.socket, addr, FAULT_CHANNEL, &heartbeat).await {
                tracing::warn!("failed to send heartbeat to server {}: {}", server_id, e);
            }
        }
    }

    /// Applies the timeout transitions and returns servers that just
    /// became ConfirmedDown.
    pub(crate) fn check_transitions(&self) -> Vec<usize> {
        let now = Instant::now();
        let mut newly_down = Vec::new();

        for mut entry in self.status.iter_mut() {
            let server_id = *entry.key();
            let elapsed = now.duration_since(entry.last_heartbeat);

            match entry.status {
                ServerStatus::Active => {
                    if elapsed > SUSPECT_TIMEOUT {
                        tracing::warn!("server {} is suspected down ({:?} silent)", server_id, elapsed);
                        entry.status = ServerStatus::Suspect;
                    }
                }
                ServerStatus::Suspect => {
                    if elapsed > CONFIRM_TIMEOUT {
                        tracing::warn!("server {} is confirmed down ({:?} silent)", server_id, elapsed);
                        entry.status = ServerStatus::ConfirmedDown;
                        newly_down.push(server_id);
                    }
                }
                ServerStatus::ConfirmedDown | ServerStatus::Recovering => {}
            }
        }

        newly_down
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, _src)) => match parse_datagram(&buf[..len]) {
                    Ok((_, Message::Heartbeat { sender_id, .. })) => {
                        if sender_id > 0 {
                            self.process_heartbeat(sender_id as usize - 1);
                        }
                    }
                    Ok((
                        _,
                        message @ (Message::Election { .. }
                        | Message::ElectionAlive { .. }
                        | Message::Victory { .. }),
                    )) => {
                        self.election.handle_message(&message).await;
                    }
                    Ok((_, other)) => {
                        tracing::debug!("ignoring fault-plane message {:?}", other.type_tag());
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse fault-plane datagram: {}", e);
                    }
                },
                Err(e) => {
                    tracing::error!("fault socket receive failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Appoints the lowest-ranked Active server as recovery coordinator,
    /// notifies the remaining actives as participants, and remaps the
    /// router to exclude the failed server.
    pub async fn initiate_recovery(&self, failed: usize) {
        tracing::info!("initiating recovery for server {}", failed);

        let actives = self.active_servers();
        let Some(&coordinator) = actives.first() else {
            tracing::error!("no active servers available for recovery of {}", failed);
            return;
        };

        tracing::info!("selected server {} as recovery coordinator", coordinator);

        let request = Message::RecoveryRequest {
            failed_server_id: failed as i32,
            coordinator_id: coordinator as i32,
        };

        let mut recovered = false;
        match Connection::connect(self.config.server_addr(coordinator)).await {
            Ok(conn) => match conn.request(ADMIN_CHANNEL, &request).await {
                Ok(Message::RecoveryComplete { success, .. }) => {
                    tracing::info!(
                        "recovery for server {} completed (success={})",
                        failed,
                        success
                    );
                    recovered = success;
                }
                Ok(other) => {
                    tracing::warn!(
                        "coordinator returned unexpected message tag {}",
                        other.type_tag()
                    );
                }
                Err(e) => tracing::warn!("recovery request to coordinator failed: {}", e),
            },
            Err(e) => tracing::warn!("could not reach recovery coordinator: {}", e),
        }

        let notice = Message::ServerFailure {
            failed_server_id: failed as i32,
        };
        for &participant in actives.iter().skip(1) {
            match Connection::connect(self.config.server_addr(participant)).await {
                Ok(conn) => {
                    if let Err(e) = conn.request(FAULT_CHANNEL, &notice).await {
                        tracing::warn!(
                            "failed to notify participant {} of failure: {}",
                            participant,
                            e
                        );
                    }
                }
                Err(e) => tracing::warn!("could not reach participant {}: {}", participant, e),
            }
        }

        let migrations = self
            .router
            .write()
            .await
            .base_mut()
            .remap_servers(actives.len());
        tracing::info!(
            "router remapped around failed server {}; {} virtual nodes to migrate",
            failed,
            migrations
        );

        if recovered
            && let Some(mut entry) = self.status.get_mut(&failed)
        {
            // Awaiting restart; a returning heartbeat flips it Active.
            entry.status = ServerStatus::Recovering;
        }
    }

    /// Test hook: pretend a server has been silent for `secs` seconds.
    #[cfg(test)]
    pub(crate) fn backdate_heartbeat(&self, server_id: usize, secs: u64) {
        if let Some(mut entry) = self.status.get_mut(&server_id) {
            entry.last_heartbeat -= Duration::from_secs(secs);
        }
    }
}
