//! Server network layer: UDP dispatch, session lifecycle and snapshot ticks

use crate::relay::{self, Relay};
use crate::session::SessionRegistry;
use bincode::deserialize;
use log::{debug, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Events funneled from the network tasks into the main dispatch loop
#[derive(Debug)]
pub enum ServerEvent {
    DatagramReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SessionTimeout {
        session_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// The relay server: session roster, event fan-out and the snapshot tick
///
/// All state mutation happens in the single dispatch loop inside [`run`];
/// the receiver, delivery and timeout tasks only move messages in and out.
/// The registry lock is the explicit mutual exclusion that a cooperative
/// event-loop design would get implicitly, and `drain_all` holds it for the
/// whole mapping swap.
///
/// [`run`]: Server::run
pub struct Server {
    socket: Arc<UdpSocket>,
    registry: Arc<RwLock<SessionRegistry>>,
    relay: Relay,
    snapshot_interval: Duration,
    session_timeout: Duration,

    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    outbound_rx: Option<mpsc::UnboundedReceiver<relay::Outbound>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        snapshot_interval: Duration,
        max_sessions: usize,
        session_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            registry: Arc::new(RwLock::new(SessionRegistry::new(max_sessions))),
            relay: Relay::new(outbound_tx),
            snapshot_interval,
            session_timeout,
            event_tx,
            event_rx,
            outbound_rx: Some(outbound_rx),
        })
    }

    /// The address the relay actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Spawns the task that listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if event_tx
                                .send(ServerEvent::DatagramReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize datagram from {}", addr);
                        }
                    }
                    Err(e) => {
                        warn!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that reaps sessions gone silent.
    ///
    /// UDP has no transport-level close, so a liveness timeout stands in for
    /// it. The registry entry is removed here; the leave broadcast happens in
    /// the main loop when the timeout event is dispatched.
    fn spawn_timeout_checker(&self) {
        let registry = Arc::clone(&self.registry);
        let event_tx = self.event_tx.clone();
        let timeout = self.session_timeout;

        tokio::spawn(async move {
            let mut check_interval = interval(Duration::from_secs(1));

            loop {
                check_interval.tick().await;

                let timed_out = {
                    let mut registry = registry.write().await;
                    registry.check_timeouts(timeout)
                };

                for session_id in timed_out {
                    if event_tx
                        .send(ServerEvent::SessionTimeout { session_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    /// Dispatches one client datagram through the lifecycle and relay rules
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(client_version, addr).await;
            }

            Packet::GetPlayers => {
                let Some(sender_id) = self.sender_id(addr).await else {
                    return;
                };

                // Roster answer always excludes the requester's own id,
                // regardless of when it registered relative to the query.
                let players = {
                    let mut registry = self.registry.write().await;
                    registry.touch(sender_id);
                    registry.roster_excluding(sender_id)
                };

                self.relay.unicast(
                    sender_id,
                    Packet::ReturnPlayers {
                        players,
                        client_id: sender_id,
                    },
                );
            }

            Packet::PositionUpdate { x, y } => {
                let Some(sender_id) = self.sender_id(addr).await else {
                    return;
                };

                let mut registry = self.registry.write().await;
                registry.append_position(sender_id, x, y);
            }

            Packet::ShootRequest { dir, pos, damage } => {
                let Some(sender_id) = self.sender_id(addr).await else {
                    return;
                };

                self.registry.write().await.touch(sender_id);
                self.relay.broadcast_except(
                    sender_id,
                    Packet::Shoot {
                        dir,
                        pos,
                        shooter_id: sender_id,
                        damage,
                    },
                );
            }

            Packet::Died { killer_id } => {
                let Some(sender_id) = self.sender_id(addr).await else {
                    return;
                };

                self.registry.write().await.touch(sender_id);
                debug!(
                    "Session {} credits kill to session {}",
                    sender_id, killer_id
                );
                self.relay.unicast(killer_id, Packet::GotKill);
            }

            Packet::Disconnect => {
                let Some(sender_id) = self.sender_id(addr).await else {
                    return;
                };

                self.registry.write().await.unregister(sender_id);
                self.relay.broadcast_all(Packet::PlayerLeave {
                    client_id: sender_id,
                });
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.relay.send_to(
                Packet::Refused {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // A repeated handshake from a known address replaces the old session
        let existing = {
            let registry = self.registry.read().await;
            registry.find_by_addr(addr)
        };

        if let Some(old_id) = existing {
            info!("Replacing stale session {} from {}", old_id, addr);
            self.registry.write().await.unregister(old_id);
            self.relay
                .broadcast_all(Packet::PlayerLeave { client_id: old_id });
        }

        let session_id = {
            let mut registry = self.registry.write().await;
            registry.register(addr)
        };

        match session_id {
            Some(session_id) => {
                self.relay.send_to(
                    Packet::Connected {
                        client_id: session_id,
                    },
                    addr,
                );
                self.relay.broadcast_except(
                    session_id,
                    Packet::NewPlayer {
                        client_id: session_id,
                    },
                );
            }
            None => {
                self.relay.send_to(
                    Packet::Refused {
                        reason: "Server full".to_string(),
                    },
                    addr,
                );
            }
        }
    }

    async fn sender_id(&self, addr: SocketAddr) -> Option<u32> {
        let id = {
            let registry = self.registry.read().await;
            registry.find_by_addr(addr)
        };

        if id.is_none() {
            // Normal race: the session may have disconnected between the
            // client sending and the server processing.
            debug!("Dropping packet from unknown address {}", addr);
        }

        id
    }

    /// Drains every session's buffered positions and fans each non-empty
    /// batch out to all other sessions
    async fn flush_snapshots(&mut self) {
        let batches = {
            let mut registry = self.registry.write().await;
            registry.drain_all()
        };

        for (session_id, samples) in batches {
            if samples.is_empty() {
                continue;
            }

            self.relay.broadcast_except(
                session_id,
                Packet::Snapshot {
                    client_id: session_id,
                    samples,
                },
            );
        }
    }

    /// Main dispatch loop coordinating datagram handling and snapshot ticks
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_timeout_checker();

        if let Some(outbound_rx) = self.outbound_rx.take() {
            relay::spawn_delivery(
                Arc::clone(&self.socket),
                Arc::clone(&self.registry),
                outbound_rx,
            );
        }

        let mut snapshot_tick = interval(self.snapshot_interval);
        let mut tick: u64 = 0;

        info!("Relay started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(ServerEvent::DatagramReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerEvent::SessionTimeout { session_id }) => {
                            info!("Session {} timed out", session_id);
                            self.relay.broadcast_all(Packet::PlayerLeave {
                                client_id: session_id,
                            });
                        },
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Relay shutting down");
                            break;
                        }
                    }
                },

                _ = snapshot_tick.tick() => {
                    self.flush_snapshots().await;

                    tick += 1;
                    if tick % 100 == 0 {
                        let session_count = {
                            let registry = self.registry.read().await;
                            registry.len()
                        };

                        if session_count > 0 {
                            debug!("Tick {}: {} sessions connected", tick, session_count);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
