//! Session registry and per-session input buffering
//!
//! This module owns the roster of connected clients and the position samples
//! they report between snapshot ticks:
//! - Session lifecycle bookkeeping (register, unregister, timeout)
//! - Registration-ordered roster queries for late joiners
//! - Bounded input buffers drained atomically by the snapshot tick
//!
//! The registry is the single owner of all session state; it is shared behind
//! a lock and never mutated outside the lifecycle and tick handlers.

use log::{debug, info};
use shared::{PositionSample, MAX_BUFFERED_SAMPLES};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch, used to stamp samples.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// One connected client and the positions it has reported since the last tick
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the server
    pub id: u32,
    /// Network address for routing replies
    pub addr: SocketAddr,
    /// Last time we received any datagram from this client
    pub last_seen: Instant,
    /// Position reports awaiting the next snapshot flush, in arrival order
    buffer: VecDeque<PositionSample>,
}

impl Session {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            buffer: VecDeque::new(),
        }
    }

    /// Stamps and appends a position report.
    ///
    /// The buffer is bounded: once `MAX_BUFFERED_SAMPLES` is reached the
    /// oldest sample is evicted, so a client flooding updates faster than
    /// the tick drains them cannot grow memory without bound.
    pub fn push_sample(&mut self, x: f32, y: f32) {
        self.last_seen = Instant::now();
        if self.buffer.len() >= MAX_BUFFERED_SAMPLES {
            self.buffer.pop_front();
            debug!("Session {} buffer full, evicted oldest sample", self.id);
        }
        self.buffer.push_back(PositionSample {
            x,
            y,
            timestamp: now_millis(),
        });
    }

    /// Removes and returns the buffered samples, leaving the buffer empty.
    pub fn take_samples(&mut self) -> Vec<PositionSample> {
        Vec::from(std::mem::take(&mut self.buffer))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no datagram has arrived within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Roster of all connected sessions plus their input buffers
///
/// Ids are handed out sequentially and never reused for the process lifetime.
/// The roster preserves registration order so that roster answers and drain
/// batches are deterministic.
pub struct SessionRegistry {
    /// Connected sessions indexed by id
    sessions: HashMap<u32, Session>,
    /// Session ids in registration order
    order: Vec<u32>,
    /// Next id to hand out
    next_session_id: u32,
    /// Maximum number of concurrent sessions allowed
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    /// Registers a new session for `addr`.
    ///
    /// Returns Some(id) on success, None when the server is at capacity.
    pub fn register(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} connected from {}", id, addr);
        self.sessions.insert(id, Session::new(id, addr));
        self.order.push(id);

        Some(id)
    }

    /// Removes a session and discards its buffered input.
    ///
    /// Returns true if the session existed. Unregistering an unknown id is a
    /// no-op; disconnect races make that a normal occurrence.
    pub fn unregister(&mut self, id: u32) -> bool {
        if let Some(session) = self.sessions.remove(&id) {
            self.order.retain(|&other| other != id);
            info!(
                "Session {} disconnected ({} buffered samples dropped)",
                session.id,
                session.buffered()
            );
            true
        } else {
            false
        }
    }

    /// Current roster in registration order.
    pub fn roster(&self) -> Vec<u32> {
        self.order.clone()
    }

    /// Roster without the given id, for answering that client's own query.
    pub fn roster_excluding(&self, id: u32) -> Vec<u32> {
        self.order.iter().copied().filter(|&o| o != id).collect()
    }

    /// Maps an incoming datagram's source address back to a session id.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, id: u32) -> Option<SocketAddr> {
        self.sessions.get(&id).map(|session| session.addr)
    }

    /// Refreshes the liveness timestamp for a session.
    pub fn touch(&mut self, id: u32) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.last_seen = Instant::now();
        }
    }

    /// Buffers a position report for a session.
    ///
    /// Returns false for unknown ids; the client may have disconnected
    /// between sending and processing, which is a benign race.
    pub fn append_position(&mut self, id: u32, x: f32, y: f32) -> bool {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.push_sample(x, y);
            true
        } else {
            false
        }
    }

    /// Atomically removes and returns every session's buffered samples.
    ///
    /// Callers hold the registry's write lock for the duration, so a sample
    /// racing with the drain lands either in this batch or the next, never
    /// both. Sessions with empty buffers still appear with an empty vec.
    pub fn drain_all(&mut self) -> Vec<(u32, Vec<PositionSample>)> {
        self.order
            .iter()
            .map(|&id| {
                let samples = self
                    .sessions
                    .get_mut(&id)
                    .map(Session::take_samples)
                    .unwrap_or_default();
                (id, samples)
            })
            .collect()
    }

    /// All session addresses except an optional excluded id, for fan-out.
    pub fn peer_addrs(&self, exclude: Option<u32>) -> Vec<(u32, SocketAddr)> {
        self.order
            .iter()
            .filter(|&&id| Some(id) != exclude)
            .filter_map(|&id| self.sessions.get(&id).map(|s| (id, s.addr)))
            .collect()
    }

    /// Removes sessions that have gone silent and returns their ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.unregister(*id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(1, test_addr());

        assert_eq!(session.id, 1);
        assert_eq!(session.addr, test_addr());
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_session_push_sample_order() {
        let mut session = Session::new(1, test_addr());

        session.push_sample(1.0, 1.0);
        session.push_sample(2.0, 2.0);

        let samples = session.take_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!((samples[0].x, samples[0].y), (1.0, 1.0));
        assert_eq!((samples[1].x, samples[1].y), (2.0, 2.0));
        assert!(samples[0].timestamp <= samples[1].timestamp);
    }

    #[test]
    fn test_session_buffer_eviction() {
        let mut session = Session::new(1, test_addr());

        for i in 0..(MAX_BUFFERED_SAMPLES + 10) {
            session.push_sample(i as f32, 0.0);
        }

        assert_eq!(session.buffered(), MAX_BUFFERED_SAMPLES);

        // Oldest samples were evicted, newest kept
        let samples = session.take_samples();
        assert_eq!(samples[0].x, 10.0);
        assert_eq!(samples.last().unwrap().x, (MAX_BUFFERED_SAMPLES + 9) as f32);
    }

    #[test]
    fn test_session_timeout() {
        let mut session = Session::new(1, test_addr());

        assert!(!session.is_timed_out(Duration::from_secs(1)));

        session.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(session.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = SessionRegistry::new(4);

        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_at_capacity() {
        let mut registry = SessionRegistry::new(1);

        assert!(registry.register(test_addr()).is_some());
        assert!(registry.register(test_addr2()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = SessionRegistry::new(4);
        let id = registry.register(test_addr()).unwrap();

        assert!(registry.unregister(id));
        assert!(registry.is_empty());
        assert!(registry.roster().is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut registry = SessionRegistry::new(4);

        assert!(!registry.unregister(999));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_roster_tracks_registered_set() {
        let mut registry = SessionRegistry::new(8);

        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();
        assert_eq!(registry.roster(), vec![a, b]);

        registry.unregister(a);
        assert_eq!(registry.roster(), vec![b]);

        let c = registry.register(test_addr()).unwrap();
        assert_eq!(registry.roster(), vec![b, c]);
    }

    #[test]
    fn test_roster_excluding_self() {
        let mut registry = SessionRegistry::new(4);

        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();

        assert_eq!(registry.roster_excluding(b), vec![a]);
        assert_eq!(registry.roster_excluding(a), vec![b]);
        assert_eq!(registry.roster_excluding(999), vec![a, b]);
    }

    #[test]
    fn test_find_by_addr() {
        let mut registry = SessionRegistry::new(4);

        let a = registry.register(test_addr()).unwrap();
        let _b = registry.register(test_addr2()).unwrap();

        assert_eq!(registry.find_by_addr(test_addr()), Some(a));

        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(registry.find_by_addr(unknown), None);
    }

    #[test]
    fn test_append_position_unknown_id_is_noop() {
        let mut registry = SessionRegistry::new(4);

        assert!(!registry.append_position(999, 1.0, 2.0));
    }

    #[test]
    fn test_drain_all_returns_samples_once() {
        let mut registry = SessionRegistry::new(4);
        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();

        registry.append_position(a, 1.0, 1.0);
        registry.append_position(a, 2.0, 2.0);

        let drained = registry.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, a);
        assert_eq!(drained[0].1.len(), 2);
        assert_eq!((drained[0].1[0].x, drained[0].1[0].y), (1.0, 1.0));
        assert_eq!((drained[0].1[1].x, drained[0].1[1].y), (2.0, 2.0));
        assert_eq!(drained[1].0, b);
        assert!(drained[1].1.is_empty());
    }

    #[test]
    fn test_drain_all_is_idempotent() {
        let mut registry = SessionRegistry::new(4);
        let a = registry.register(test_addr()).unwrap();

        registry.append_position(a, 1.0, 1.0);

        let first = registry.drain_all();
        assert_eq!(first[0].1.len(), 1);

        let second = registry.drain_all();
        assert!(second.iter().all(|(_, samples)| samples.is_empty()));
    }

    #[test]
    fn test_sample_lands_in_next_batch_after_drain() {
        let mut registry = SessionRegistry::new(4);
        let a = registry.register(test_addr()).unwrap();

        registry.append_position(a, 1.0, 1.0);
        let first = registry.drain_all();

        registry.append_position(a, 2.0, 2.0);
        let second = registry.drain_all();

        assert_eq!(first[0].1.len(), 1);
        assert_eq!(second[0].1.len(), 1);
        assert_eq!(second[0].1[0].x, 2.0);
    }

    #[test]
    fn test_unregister_discards_buffer() {
        let mut registry = SessionRegistry::new(4);
        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();

        registry.append_position(a, 1.0, 1.0);
        registry.unregister(a);

        let drained = registry.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, b);
    }

    #[test]
    fn test_peer_addrs_excludes_sender() {
        let mut registry = SessionRegistry::new(4);
        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();

        let peers = registry.peer_addrs(Some(a));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0], (b, test_addr2()));

        let all = registry.peer_addrs(None);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_check_timeouts() {
        let mut registry = SessionRegistry::new(4);
        let a = registry.register(test_addr()).unwrap();
        let b = registry.register(test_addr2()).unwrap();

        if let Some(session) = registry.sessions.get_mut(&a) {
            session.last_seen = Instant::now() - Duration::from_secs(10);
        }

        let timed_out = registry.check_timeouts(Duration::from_secs(5));
        assert_eq!(timed_out, vec![a]);
        assert_eq!(registry.roster(), vec![b]);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = SessionRegistry::new(4);

        let a = registry.register(test_addr()).unwrap();
        registry.unregister(a);
        let b = registry.register(test_addr()).unwrap();

        assert_ne!(a, b);
    }
}
