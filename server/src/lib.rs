//! # Multiplayer Relay Server Library
//!
//! This library implements the authoritative state relay for the networked
//! platformer shooter. The relay does not simulate the game: physics, input
//! handling and rendering live in the client-side engine. The server's job is
//! to track who is connected, fan discrete gameplay events out to peers, and
//! batch per-client position reports into timestamped snapshots broadcast at
//! a fixed tick rate.
//!
//! ## Core Responsibilities
//!
//! ### Session Tracking
//! Every client handshake creates a session with a server-assigned id. The
//! roster of live sessions answers "who else is here" queries from late
//! joiners and drives all fan-out. A session ends on an explicit goodbye or
//! a liveness timeout, either way broadcasting a leave notification.
//!
//! ### Event Relay
//! Discrete events (join, leave, shoot, death, kill credit) bypass all
//! buffering and relay immediately: to everyone, to everyone but the sender,
//! or to a single target, depending on the event. Delivery is fire-and-forget
//! with no acknowledgment, retry, or buffering of undelivered events.
//!
//! ### Snapshot Batching
//! Per-frame position reports are buffered per session and flushed by a
//! fixed-interval tick. Each tick drains every buffer atomically and
//! broadcasts one snapshot per session with a non-empty batch, tagged with
//! the originating id and server arrival timestamps. Empty batches produce
//! no traffic.
//!
//! ## Architecture
//!
//! A single `tokio::select!` dispatch loop processes datagrams, timeout
//! events, and snapshot ticks one at a time. Helper tasks (receiver,
//! outbound delivery, timeout checker) only move messages across channels;
//! the shared [`session::SessionRegistry`] sits behind an `RwLock`, which is
//! the explicit mutual exclusion this parallel runtime requires where a
//! cooperative single-threaded design could rely on non-preemption.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Session registry, roster queries and bounded per-session input buffers
//! with atomic draining.
//!
//! ### Relay Module (`relay`)
//! Tagged-union outbound queue with unicast and broadcast fan-out and
//! per-recipient failure isolation.
//!
//! ### Network Module (`network`)
//! UDP surface, the lifecycle manager dispatching packets, and the snapshot
//! scheduler.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:3000",
//!         Duration::from_millis(100), // snapshot tick period
//!         32,                         // session capacity
//!         Duration::from_secs(5),     // liveness timeout
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod relay;
pub mod session;
