//! Headless probe client for exercising a running relay by hand.
//!
//! Connects, asks for the roster, streams a short burst of position updates,
//! fires once, then listens for relayed traffic before saying goodbye.

use bincode::{deserialize, serialize};
use shared::{Packet, DEFAULT_PORT, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Probe socket bound to {}", socket.local_addr()?);

    let server_addr: SocketAddr = format!("127.0.0.1:{}", DEFAULT_PORT).parse()?;

    let connect = Packet::Connect {
        client_version: PROTOCOL_VERSION,
    };
    socket.send_to(&serialize(&connect)?, server_addr).await?;

    let mut buf = [0u8; 2048];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;

    let client_id = match deserialize::<Packet>(&buf[..len])? {
        Packet::Connected { client_id } => {
            println!("Connected as session {}", client_id);
            client_id
        }
        Packet::Refused { reason } => {
            println!("Connection refused: {}", reason);
            return Ok(());
        }
        other => {
            println!("Unexpected handshake reply: {:?}", other);
            return Ok(());
        }
    };

    socket
        .send_to(&serialize(&Packet::GetPlayers)?, server_addr)
        .await?;

    // Stream a few frames of movement
    for i in 0..10u32 {
        let update = Packet::PositionUpdate {
            x: 100.0 + i as f32 * 5.0,
            y: 300.0,
        };
        socket.send_to(&serialize(&update)?, server_addr).await?;
        sleep(Duration::from_millis(16)).await;
    }

    let shot = Packet::ShootRequest {
        dir: (1.0, 0.0),
        pos: (150.0, 300.0),
        damage: Some(10),
    };
    socket.send_to(&serialize(&shot)?, server_addr).await?;

    // Listen for relayed traffic for a couple of seconds
    println!("Listening for relayed events...");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[..len]) {
                Ok(Packet::ReturnPlayers { players, client_id }) => {
                    println!("Roster for session {}: {:?}", client_id, players);
                }
                Ok(Packet::Snapshot { client_id, samples }) => {
                    println!(
                        "Snapshot from session {}: {} samples",
                        client_id,
                        samples.len()
                    );
                }
                Ok(packet) => println!("Received: {:?}", packet),
                Err(e) => println!("Undecodable datagram: {}", e),
            },
            Ok(Err(e)) => {
                println!("Receive error: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    socket
        .send_to(&serialize(&Packet::Disconnect)?, server_addr)
        .await?;
    println!("Session {} disconnected", client_id);

    Ok(())
}
