//! Event fan-out over the shared UDP socket
//!
//! Every outbound packet, whether a one-off reply or a broadcast, is queued
//! as an [`Outbound`] value on a single FIFO channel and delivered by one
//! spawned task. The single queue preserves the relative order of events
//! originating from the same handler, and routing ids to addresses at
//! delivery time means packets addressed to a session that disconnected in
//! the meantime are silently dropped rather than misdelivered.
//!
//! Delivery is best-effort: there is no acknowledgment, no retry, and a send
//! failure to one peer never aborts delivery to the remaining peers.

use crate::session::SessionRegistry;
use bincode::serialize;
use log::{debug, error};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Outbound delivery instructions, consumed by the delivery task
#[derive(Debug)]
pub enum Outbound {
    /// Raw reply to an address that may not hold a session yet (handshake
    /// refusals).
    Send { packet: Packet, addr: SocketAddr },
    /// Deliver to exactly one registered session.
    Unicast { packet: Packet, target_id: u32 },
    /// Deliver to every registered session, optionally skipping one.
    Broadcast {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Handle for queueing outbound packets from event handlers
#[derive(Clone)]
pub struct Relay {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Relay {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Replies directly to an address, bypassing session routing.
    pub fn send_to(&self, packet: Packet, addr: SocketAddr) {
        self.queue(Outbound::Send { packet, addr });
    }

    /// Delivers to a single session; dropped silently if the target is gone
    /// by delivery time.
    pub fn unicast(&self, target_id: u32, packet: Packet) {
        self.queue(Outbound::Unicast { packet, target_id });
    }

    /// Delivers to every registered session except `sender_id`.
    pub fn broadcast_except(&self, sender_id: u32, packet: Packet) {
        self.queue(Outbound::Broadcast {
            packet,
            exclude: Some(sender_id),
        });
    }

    /// Delivers to every registered session.
    pub fn broadcast_all(&self, packet: Packet) {
        self.queue(Outbound::Broadcast {
            packet,
            exclude: None,
        });
    }

    fn queue(&self, outbound: Outbound) {
        if let Err(e) = self.tx.send(outbound) {
            error!("Failed to queue outbound packet: {}", e);
        }
    }
}

/// Spawns the delivery task draining the outbound queue onto the socket.
///
/// Ids are resolved against the registry at delivery time; per-recipient
/// failures are logged and do not interrupt the remaining fan-out.
pub fn spawn_delivery(
    socket: Arc<UdpSocket>,
    registry: Arc<RwLock<SessionRegistry>>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Send { packet, addr } => {
                    if let Err(e) = send_packet(&socket, &packet, addr).await {
                        error!("Failed to send packet to {}: {}", addr, e);
                    }
                }
                Outbound::Unicast { packet, target_id } => {
                    let addr = {
                        let registry = registry.read().await;
                        registry.addr_of(target_id)
                    };

                    match addr {
                        Some(addr) => {
                            if let Err(e) = send_packet(&socket, &packet, addr).await {
                                error!("Failed to send to session {}: {}", target_id, e);
                            }
                        }
                        None => {
                            // Target disconnected between queueing and delivery
                            debug!("Dropping unicast to unknown session {}", target_id);
                        }
                    }
                }
                Outbound::Broadcast { packet, exclude } => {
                    let peers = {
                        let registry = registry.read().await;
                        registry.peer_addrs(exclude)
                    };

                    for (session_id, addr) in peers {
                        if let Err(e) = send_packet(&socket, &packet, addr).await {
                            error!("Failed to send to session {}: {}", session_id, e);
                        }
                    }
                }
            }
        }
    });
}

async fn send_packet(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}
