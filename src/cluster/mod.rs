//! Cluster Coordination Module
//!
//! Everything that makes the index distributed: the typed wire protocol,
//! the framed transport, the server process loop, the client API, and the
//! machinery that keeps the cluster alive when members fail.
//!
//! ## Architecture Overview
//! - **Request/response plane**: one framed TCP connection per peer pair;
//!   messages are delivered in send order between any two processes.
//! - **Fault plane**: UDP datagrams for heartbeats and leader election.
//!   The client heartbeats every active server twice a second; sustained
//!   silence walks a server through Suspect to ConfirmedDown and triggers
//!   coordinated recovery on the survivors.
//!
//! ## Submodules
//! - **`protocol`**: the tagged binary message taxonomy and its codec.
//! - **`transport`**: frame I/O and pooled request connections.
//! - **`server`**: the per-member server loop (index ops, queries, admin,
//!   recovery roles, heartbeat answers).
//! - **`client`**: replica-set writes, fan-out queries, admin broadcast.
//! - **`clients`**: registry of concurrently active client handles.
//! - **`fault`**: heartbeat-driven failure detection and recovery
//!   orchestration.
//! - **`election`**: bully leader election for a lost client role.

pub mod client;
pub mod clients;
pub mod election;
pub mod fault;
pub mod protocol;
pub mod server;
pub mod transport;


/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
