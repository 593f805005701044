//! Per-client session state.
//!
//! A `ClientConnection` is one recycled slot: stable id, peer address,
//! bridge handle, session state, and a fixed ring of recent input. Slots are
//! bounded by `max_players` and reused after disconnect, never freed.

use std::net::SocketAddr;

use tracing::{debug, warn};
use vanguard_shared::commands::ClientCommands;
use vanguard_shared::net::ClientId;
use vanguard_shared::world::EntityId;

use crate::bridge::ClientBridge;

/// Input snapshots retained per connection. Older input is intentionally
/// discarded; back-pressure is implicit and lossy.
pub const INPUT_RING_CAPACITY: usize = 64;

/// Stage of a client's session.
///
/// Transitions walk one step forward at a time; the only other legal edge is
/// the direct drop to `Disconnected` from anywhere. Trusted in-process
/// bridges additionally jump `Connecting → Joining` via an explicit bypass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Downloading,
    Joining,
    Connected,
}

impl SessionState {
    fn ordinal(self) -> u8 {
        match self {
            SessionState::Disconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Authenticating => 2,
            SessionState::Downloading => 3,
            SessionState::Joining => 4,
            SessionState::Connected => 5,
        }
    }

    /// True for the single-step forward edges and the terminate edge.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        next == SessionState::Disconnected || next.ordinal() == self.ordinal() + 1
    }
}

/// Fixed-capacity circular buffer of the most recent input snapshots.
#[derive(Debug)]
pub struct InputRing {
    entries: Vec<Option<ClientCommands>>,
    /// Total snapshots ever recorded; the write index is `cursor % capacity`.
    cursor: u64,
}

impl Default for InputRing {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRing {
    pub fn new() -> Self {
        Self {
            entries: vec![None; INPUT_RING_CAPACITY],
            cursor: 0,
        }
    }

    /// Records a snapshot, silently overwriting the oldest once full.
    pub fn record(&mut self, cmd: ClientCommands) {
        let idx = (self.cursor % INPUT_RING_CAPACITY as u64) as usize;
        self.entries[idx] = Some(cmd);
        self.cursor += 1;
    }

    /// Reads `steps_back` ticks into the past; 0 is the latest snapshot.
    /// Returns `None` beyond the retained window.
    pub fn recent(&self, steps_back: usize) -> Option<&ClientCommands> {
        if steps_back >= INPUT_RING_CAPACITY || (steps_back as u64) >= self.cursor {
            return None;
        }
        let idx = ((self.cursor - 1 - steps_back as u64) % INPUT_RING_CAPACITY as u64) as usize;
        self.entries[idx].as_ref()
    }

    /// Snapshots recorded over the connection lifetime.
    pub fn recorded(&self) -> u64 {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.cursor = 0;
    }
}

/// One connection slot.
pub struct ClientConnection {
    id: ClientId,
    pub addr: SocketAddr,
    pub bridge: Box<dyn ClientBridge>,
    state: SessionState,
    pub inputs: InputRing,
    /// The client's avatar once spawned.
    pub entity: Option<EntityId>,
    pub player_name: String,
}

impl ClientConnection {
    pub fn new(id: ClientId, addr: SocketAddr, bridge: Box<dyn ClientBridge>) -> Self {
        Self {
            id,
            addr,
            bridge,
            state: SessionState::Connecting,
            inputs: InputRing::new(),
            entity: None,
            player_name: String::new(),
        }
    }

    /// Stable for the lifetime of the slot.
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Takes a single-step edge. Returns false (and leaves the state alone)
    /// for any other jump.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(
                client = ?self.id,
                from = ?self.state,
                to = ?next,
                "rejected session state jump"
            );
            return false;
        }
        debug!(client = ?self.id, from = ?self.state, to = ?next, "session state");
        self.state = next;
        true
    }

    /// Explicit transition for the trusted-bridge bypass and termination.
    pub fn force(&mut self, next: SessionState) {
        debug!(client = ?self.id, from = ?self.state, to = ?next, forced = true, "session state");
        self.state = next;
    }

    /// Rebinds a disconnected slot to a new peer.
    pub fn rebind(&mut self, addr: SocketAddr, bridge: Box<dyn ClientBridge>) {
        debug_assert_eq!(self.state, SessionState::Disconnected);
        self.addr = addr;
        self.bridge = bridge;
        self.state = SessionState::Connecting;
        self.inputs.clear();
        self.entity = None;
        self.player_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanguard_shared::math::Vec3;

    fn cmd(tick: u32) -> ClientCommands {
        ClientCommands {
            tick,
            move_dir: Vec3::new(tick as f32, 0.0, 0.0),
            ..ClientCommands::default()
        }
    }

    #[test]
    fn states_advance_one_step_only() {
        assert!(SessionState::Connecting.can_advance_to(SessionState::Authenticating));
        assert!(!SessionState::Connecting.can_advance_to(SessionState::Downloading));
        assert!(!SessionState::Authenticating.can_advance_to(SessionState::Connected));
        // Termination is reachable from anywhere.
        assert!(SessionState::Connected.can_advance_to(SessionState::Disconnected));
        assert!(SessionState::Connecting.can_advance_to(SessionState::Disconnected));
    }

    #[test]
    fn ring_reads_steps_into_the_past() {
        let mut ring = InputRing::new();
        for t in 1..=5 {
            ring.record(cmd(t));
        }
        assert_eq!(ring.recent(0).unwrap().tick, 5);
        assert_eq!(ring.recent(4).unwrap().tick, 1);
        assert!(ring.recent(5).is_none());
    }

    #[test]
    fn ring_wraparound_after_overflow() {
        let mut ring = InputRing::new();
        let n = 100u32;
        for t in 1..=n {
            ring.record(cmd(t));
        }
        // Latest is the N-th snapshot, 63 steps back is the (N-63)-th.
        assert_eq!(ring.recent(0).unwrap().tick, n);
        assert_eq!(ring.recent(63).unwrap().tick, n - 63);
        // The 64-step-old snapshot has been overwritten.
        assert!(ring.recent(64).is_none());
    }

    #[test]
    fn ring_clear_resets_window() {
        let mut ring = InputRing::new();
        ring.record(cmd(1));
        ring.clear();
        assert!(ring.recent(0).is_none());
        assert_eq!(ring.recorded(), 0);
    }
}
