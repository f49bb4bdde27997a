//! Index Server Process
//!
//! One per cluster member. Owns the local metadata store behind a
//! read/write lock, serves the request/response plane over TCP, answers
//! client heartbeats on the UDP fault plane, and takes part in recovery
//! (as coordinator or participant) and leader election.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Notify, RwLock};

use super::election::LeaderElection;
use super::now_ms;
use super::protocol::{ADMIN_CHANNEL, FAULT_CHANNEL, RESULT_CHANNEL, Message};
use super::transport::{Connection, parse_datagram, recv_frame, send_datagram, send_frame};
use crate::config::ClusterConfig;
use crate::index::store::MetadataStore;
use crate::routing::router::DartRouter;

/// Silence from the client before a server considers the client role lost
/// and starts an election.
const CLIENT_LOSS_TIMEOUT_MS: i64 = 5000;

pub struct IndexServer {
    server_id: usize,
    rank: usize,
    config: Arc<ClusterConfig>,
    store: Arc<RwLock<MetadataStore>>,
    router: Arc<RwLock<DartRouter>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    last_client_heartbeat: Arc<AtomicI64>,
}

impl IndexServer {
    pub fn new(server_id: usize, config: Arc<ClusterConfig>) -> Result<Arc<Self>> {
        let store = MetadataStore::new(server_id, &config.data_dir, config.suffix_mode)?;
        let router = DartRouter::new(config.num_servers, config.replication_ratio);

        Ok(Arc::new(Self {
            server_id,
            rank: server_id + 1,
            config,
            store: Arc::new(RwLock::new(store)),
            router: Arc::new(RwLock::new(router)),
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
            last_client_heartbeat: Arc::new(AtomicI64::new(0)),
        }))
    }

    pub fn server_id(&self) -> usize {
        self.server_id
    }

    pub fn store(&self) -> &Arc<RwLock<MetadataStore>> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serves until a `Shutdown` message arrives.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.server_addr(self.server_id))
            .await
            .with_context(|| format!("binding server {} listener", self.server_id))?;

        let fault_socket = UdpSocket::bind(self.config.fault_addr(self.rank))
            .await
            .with_context(|| format!("binding server {} fault socket", self.server_id))?;
        let fault_socket = Arc::new(fault_socket);

        let election = Arc::new(LeaderElection::new(
            self.rank,
            self.config.num_servers + 1,
            Arc::clone(&self.config),
            Arc::clone(&fault_socket),
        ));

        {
            let this = Arc::clone(&self);
            let socket = Arc::clone(&fault_socket);
            let election = Arc::clone(&election);
            tokio::spawn(async move {
                this.fault_plane_loop(socket, election).await;
            });
        }
        {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.client_loss_watchdog(election).await;
            });
        }

        tracing::info!(
            "index server {} listening on {}",
            self.server_id,
            self.config.server_addr(self.server_id)
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("server {} accepted connection from {}", self.server_id, peer);
                            let this = Arc::clone(&self);
                            tokio::spawn(async move {
                                this.handle_connection(stream).await;
                            });
                        }
                        Err(e) => tracing::warn!("server {} accept failed: {}", self.server_id, e),
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }

        tracing::info!("index server {} shut down", self.server_id);
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) {
        loop {
            let (channel, message) = match recv_frame(&mut stream).await {
                Ok(frame) => frame,
                // Peer closed the connection.
                Err(_) => return,
            };
            tracing::debug!(
                "server {} received tag {} on channel {}",
                self.server_id,
                message.type_tag(),
                channel
            );

            let stop = matches!(message, Message::Shutdown);
            let reply = self.dispatch(message).await;

            if let Err(e) = send_frame(&mut stream, RESULT_CHANNEL, &reply).await {
                tracing::warn!("server {} failed to send reply: {}", self.server_id, e);
                return;
            }

            if stop {
                // notify_one stores a permit, so the accept loop sees the
                // shutdown even if it is mid-accept right now.
                self.shutdown.notify_one();
                return;
            }
        }
    }

    async fn dispatch(&self, message: Message) -> Message {
        match message {
            Message::CreateIndex {
                key,
                value,
                object_id,
            } => {
                self.store
                    .write()
                    .await
                    .add_indexed_key(&key, &value, object_id);
                Message::Response {
                    success: true,
                    results: Vec::new(),
                }
            }

            Message::DeleteIndex {
                key,
                value,
                object_id,
            } => {
                self.store
                    .write()
                    .await
                    .remove_indexed_key(&key, &value, object_id);
                Message::Response {
                    success: true,
                    results: Vec::new(),
                }
            }

            Message::Query { query } => {
                let store = self.store.read().await;
                if !store.can_handle_query(&query) {
                    return Message::Response {
                        success: true,
                        results: Vec::new(),
                    };
                }
                match store.execute_query(&query) {
                    Ok(results) => Message::Response {
                        success: true,
                        results,
                    },
                    Err(e) => Message::ErrorResponse {
                        message: e.to_string(),
                    },
                }
            }

            Message::Checkpoint => match self.store.read().await.checkpoint() {
                Ok(()) => Message::Response {
                    success: true,
                    results: Vec::new(),
                },
                Err(e) => {
                    tracing::warn!("server {} checkpoint failed: {}", self.server_id, e);
                    Message::Response {
                        success: false,
                        results: Vec::new(),
                    }
                }
            },

            Message::Recover => {
                let recovered = match self.store.write().await.recover() {
                    Ok(ok) => ok,
                    Err(e) => {
                        tracing::warn!("server {} recovery failed: {}", self.server_id, e);
                        false
                    }
                };
                Message::Response {
                    success: recovered,
                    results: Vec::new(),
                }
            }

            Message::Shutdown => {
                // Flag first so in-flight observers see the stop before the ack.
                self.running.store(false, Ordering::SeqCst);
                tracing::info!("server {} shutting down", self.server_id);
                Message::Response {
                    success: true,
                    results: Vec::new(),
                }
            }

            Message::RecoveryRequest {
                failed_server_id,
                coordinator_id,
            } => {
                let failed = failed_server_id as usize;
                if coordinator_id as usize == self.server_id {
                    self.coordinate_recovery(failed).await
                } else {
                    self.participate_in_recovery(failed, coordinator_id as usize)
                        .await
                }
            }

            Message::ServerFailure { failed_server_id } => {
                tracing::info!(
                    "server {} notified of failure of server {}",
                    self.server_id,
                    failed_server_id
                );
                let survivors = self.config.num_servers.saturating_sub(1).max(1);
                self.router.write().await.remap_servers(survivors);
                Message::Response {
                    success: true,
                    results: Vec::new(),
                }
            }

            other => Message::ErrorResponse {
                message: format!(
                    "unexpected message tag {} on the request plane",
                    other.type_tag()
                ),
            },
        }
    }

    /// Coordinator role: plan which virtual nodes the failed server held,
    /// instruct the surviving participants to rebuild, remap, and report
    /// completion.
    async fn coordinate_recovery(&self, failed: usize) -> Message {
        tracing::info!(
            "server {} coordinating recovery for failed server {}",
            self.server_id,
            failed
        );

        let lost_vnodes = self.router.read().await.virtual_nodes_for_server(failed);
        tracing::info!(
            "{} virtual nodes held by server {} must be reassigned",
            lost_vnodes.len(),
            failed
        );

        let request = Message::RecoveryRequest {
            failed_server_id: failed as i32,
            coordinator_id: self.server_id as i32,
        };

        for participant in 0..self.config.num_servers {
            if participant == failed || participant == self.server_id {
                continue;
            }
            match Connection::connect(self.config.server_addr(participant)).await {
                Ok(conn) => match conn.request(ADMIN_CHANNEL, &request).await {
                    Ok(Message::Response { success: true, .. }) => {}
                    Ok(_) | Err(_) => tracing::warn!(
                        "participant {} did not acknowledge recovery",
                        participant
                    ),
                },
                // Possibly down as well; recovery proceeds without it.
                Err(e) => tracing::warn!("cannot reach participant {}: {}", participant, e),
            }
        }

        let survivors = self.config.num_servers.saturating_sub(1).max(1);
        self.router.write().await.remap_servers(survivors);

        tracing::info!(
            "server {} completed recovery coordination for server {}",
            self.server_id,
            failed
        );
        Message::RecoveryComplete {
            failed_server_id: failed as i32,
            success: true,
        }
    }

    /// Participant role: rebuild the local view around the failed server.
    async fn participate_in_recovery(&self, failed: usize, coordinator: usize) -> Message {
        tracing::info!(
            "server {} participating in recovery of server {} (coordinator {})",
            self.server_id,
            failed,
            coordinator
        );

        let survivors = self.config.num_servers.saturating_sub(1).max(1);
        self.router.write().await.remap_servers(survivors);

        Message::Response {
            success: true,
            results: Vec::new(),
        }
    }

    /// Answers client heartbeats and routes election traffic.
    async fn fault_plane_loop(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        election: Arc<LeaderElection>,
    ) {
        let mut buf = vec![0u8; 65536];

        while self.running.load(Ordering::SeqCst) {
            match socket.recv_from(&mut buf).await {
                Ok((len, _src)) => match parse_datagram(&buf[..len]) {
                    Ok((_, Message::Heartbeat { sender_id, .. })) => {
                        if sender_id == 0 {
                            self.last_client_heartbeat
                                .store(now_ms() as i64, Ordering::SeqCst);

                            let reply = Message::Heartbeat {
                                sender_id: self.rank as i32,
                                timestamp_ms: now_ms() as i64,
                            };
                            let client_addr = self.config.fault_addr(0);
                            if let Err(e) =
                                send_datagram(&socket, client_addr, FAULT_CHANNEL, &reply).await
                            {
                                tracing::warn!(
                                    "server {} failed to answer heartbeat: {}",
                                    self.server_id,
                                    e
                                );
                            }
                        }
                    }
                    Ok((
                        _,
                        message @ (Message::Election { .. }
                        | Message::ElectionAlive { .. }
                        | Message::Victory { .. }),
                    )) => {
                        election.handle_message(&message).await;
                    }
                    Ok((_, other)) => {
                        tracing::debug!(
                            "server {} ignoring fault-plane tag {}",
                            self.server_id,
                            other.type_tag()
                        );
                    }
                    Err(e) => tracing::warn!("server {} bad datagram: {}", self.server_id, e),
                },
                Err(e) => {
                    tracing::error!("server {} fault socket error: {}", self.server_id, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Starts a bully election once the client has been silent too long.
    async fn client_loss_watchdog(self: Arc<Self>, election: Arc<LeaderElection>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            let last = self.last_client_heartbeat.load(Ordering::SeqCst);
            if last == 0 {
                // The client has not introduced itself yet.
                continue;
            }

            let silent_for = now_ms() as i64 - last;
            if silent_for > CLIENT_LOSS_TIMEOUT_MS
                && election.current_leader() == 0
                && !election.election_in_progress()
            {
                tracing::warn!(
                    "server {}: client silent for {} ms, starting leader election",
                    self.server_id,
                    silent_for
                );
                let election = Arc::clone(&election);
                tokio::spawn(async move {
                    election.initiate_election().await;
                });
            }
        }
    }
}
