use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 3000;
pub const SNAPSHOT_INTERVAL_MS: u64 = 100;
pub const MAX_BUFFERED_SAMPLES: usize = 256;
pub const CLIENT_TIMEOUT_SECS: u64 = 5;

/// One buffered position report, stamped by the server on arrival.
///
/// Samples are only meaningful within the buffering window between two
/// snapshot ticks; clients interpolate between them and discard.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    /// Server arrival time, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Wire protocol between clients and the relay server.
///
/// Client-to-server variants come first, server-to-client after. The relay
/// never inspects gameplay payloads beyond attaching the sender's id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    /// Handshake. The server assigns an id and replies `Connected`.
    Connect {
        client_version: u32,
    },
    /// Ask for the current roster; answered with `ReturnPlayers`.
    GetPlayers,
    /// Raw per-frame position report, buffered until the next snapshot tick.
    PositionUpdate {
        x: f32,
        y: f32,
    },
    /// Fired a shot; relayed immediately to all peers with the sender id.
    ShootRequest {
        dir: (f32, f32),
        pos: (f32, f32),
        damage: Option<u32>,
    },
    /// The sender died; the killer gets a `GotKill` credit.
    Died {
        killer_id: u32,
    },
    /// Graceful goodbye.
    Disconnect,

    Connected {
        client_id: u32,
    },
    /// Handshake rejected (capacity, version mismatch).
    Refused {
        reason: String,
    },
    /// Roster answer: every other connected id, plus the requester's own id
    /// so it can tell itself apart in later broadcasts.
    ReturnPlayers {
        players: Vec<u32>,
        client_id: u32,
    },
    NewPlayer {
        client_id: u32,
    },
    PlayerLeave {
        client_id: u32,
    },
    /// Periodic batch of one peer's buffered positions since the last tick.
    Snapshot {
        client_id: u32,
        samples: Vec<PositionSample>,
    },
    Shoot {
        dir: (f32, f32),
        pos: (f32, f32),
        shooter_id: u32,
        damage: Option<u32>,
    },
    GotKill,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_sample_fields() {
        let sample = PositionSample {
            x: 120.5,
            y: 340.0,
            timestamp: 1234567890,
        };

        assert_eq!(sample.x, 120.5);
        assert_eq!(sample.y, 340.0);
        assert_eq!(sample.timestamp, 1234567890);
    }

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect { client_version: 42 };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Connect { client_version } => assert_eq!(client_version, 42),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_position_update() {
        let packet = Packet::PositionUpdate { x: 15.0, y: -3.25 };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::PositionUpdate { x, y } => {
                assert_eq!(x, 15.0);
                assert_eq!(y, -3.25);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_snapshot() {
        let samples = vec![
            PositionSample {
                x: 1.0,
                y: 1.0,
                timestamp: 100,
            },
            PositionSample {
                x: 2.0,
                y: 2.0,
                timestamp: 110,
            },
        ];

        let packet = Packet::Snapshot {
            client_id: 7,
            samples,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Snapshot { client_id, samples } => {
                assert_eq!(client_id, 7);
                assert_eq!(samples.len(), 2);
                assert_eq!(samples[0].timestamp, 100);
                assert_eq!(samples[1].x, 2.0);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_shoot() {
        let packet = Packet::Shoot {
            dir: (0.0, -1.0),
            pos: (400.0, 300.0),
            shooter_id: 3,
            damage: Some(25),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Shoot {
                dir,
                pos,
                shooter_id,
                damage,
            } => {
                assert_eq!(dir, (0.0, -1.0));
                assert_eq!(pos, (400.0, 300.0));
                assert_eq!(shooter_id, 3);
                assert_eq!(damage, Some(25));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_return_players() {
        let packet = Packet::ReturnPlayers {
            players: vec![1, 2, 5],
            client_id: 9,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::ReturnPlayers { players, client_id } => {
                assert_eq!(players, vec![1, 2, 5]);
                assert_eq!(client_id, 9);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_shoot_request_without_damage() {
        let packet = Packet::ShootRequest {
            dir: (1.0, 0.0),
            pos: (10.0, 20.0),
            damage: None,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::ShootRequest { damage, .. } => assert_eq!(damage, None),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
