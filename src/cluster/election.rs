//! Bully Leader Election
//!
//! Used when the client role itself is lost or ambiguous. The initiator
//! sends `Election` to every higher-ranked peer; any live higher peer
//! answers `ElectionAlive` and starts its own election. An initiator that
//! hears no `ElectionAlive` declares itself leader by broadcasting
//! `Victory` to every lower-ranked peer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Notify;

use super::protocol::{FAULT_CHANNEL, Message};
use super::transport::send_datagram;
use crate::config::ClusterConfig;

/// How long the initiator waits for a higher-ranked peer to respond.
const ALIVE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long to wait for the responding peer's own election to conclude
/// before trying again.
const VICTORY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct LeaderElection {
    rank: usize,
    world_size: usize,
    config: Arc<ClusterConfig>,
    socket: Arc<UdpSocket>,
    current_leader: AtomicI64,
    election_running: AtomicBool,
    alive_seen: Notify,
    victory_seen: Notify,
}

impl LeaderElection {
    /// Rank 0 (the client) is the initial leader.
    pub fn new(
        rank: usize,
        world_size: usize,
        config: Arc<ClusterConfig>,
        socket: Arc<UdpSocket>,
    ) -> Self {
        Self {
            rank,
            world_size,
            config,
            socket,
            current_leader: AtomicI64::new(0),
            election_running: AtomicBool::new(false),
            alive_seen: Notify::new(),
            victory_seen: Notify::new(),
        }
    }

    pub fn current_leader(&self) -> i64 {
        self.current_leader.load(Ordering::SeqCst)
    }

    pub fn is_leader(&self) -> bool {
        self.current_leader() == self.rank as i64
    }

    pub fn election_in_progress(&self) -> bool {
        self.election_running.load(Ordering::SeqCst)
    }

    /// Starts an election unless one is already in progress.
    pub async fn initiate_election(self: Arc<Self>) {
        if self.election_running.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("rank {} initiating leader election", self.rank);

        loop {
            let higher_ranks: Vec<usize> = (self.rank + 1..self.world_size).collect();
            if higher_ranks.is_empty() {
                self.declare_victory().await;
                return;
            }

            // Arm the waiter before sending so a fast reply is not lost.
            let alive = self.alive_seen.notified();
            for peer in higher_ranks {
                self.send_to_rank(peer, Message::Election {
                    sender_id: self.rank as i32,
                })
                .await;
            }

            match tokio::time::timeout(ALIVE_TIMEOUT, alive).await {
                Err(_) => {
                    // No higher-ranked peer is alive.
                    self.declare_victory().await;
                    return;
                }
                Ok(()) => {
                    let victory = self.victory_seen.notified();
                    if tokio::time::timeout(VICTORY_TIMEOUT, victory).await.is_ok() {
                        return;
                    }
                    tracing::warn!(
                        "rank {}: higher peer answered but never declared victory, retrying election",
                        self.rank
                    );
                }
            }
        }
    }

    async fn declare_victory(&self) {
        tracing::info!("rank {} declaring victory in leader election", self.rank);
        self.current_leader.store(self.rank as i64, Ordering::SeqCst);

        for peer in 0..self.rank {
            self.send_to_rank(peer, Message::Victory {
                sender_id: self.rank as i32,
            })
            .await;
        }

        self.election_running.store(false, Ordering::SeqCst);
    }

    /// Handles an election message received on the fault plane.
    pub async fn handle_message(self: &Arc<Self>, message: &Message) {
        match message {
            Message::Election { sender_id } => {
                tracing::info!("rank {} received election from {}", self.rank, sender_id);
                self.send_to_rank(*sender_id as usize, Message::ElectionAlive {
                    sender_id: self.rank as i32,
                })
                .await;

                let this = Arc::clone(self);
                tokio::spawn(async move {
                    this.initiate_election().await;
                });
            }
            Message::ElectionAlive { sender_id } => {
                tracing::debug!("rank {} received alive from {}", self.rank, sender_id);
                self.alive_seen.notify_one();
            }
            Message::Victory { sender_id } => {
                tracing::info!("rank {}: rank {} won the election", self.rank, sender_id);
                self.current_leader.store(*sender_id as i64, Ordering::SeqCst);
                self.election_running.store(false, Ordering::SeqCst);
                self.victory_seen.notify_one();
            }
            _ => {}
        }
    }

    async fn send_to_rank(&self, rank: usize, message: Message) {
        let addr = self.config.fault_addr(rank);
        if let Err(e) = send_datagram(&self.socket, addr, FAULT_CHANNEL, &message).await {
            tracing::warn!("failed to send election message to rank {}: {}", rank, e);
        }
    }
}
