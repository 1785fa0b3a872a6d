//! In-memory host
//!
//! Emulates the parts of the game client the engine talks to: the lock field
//! counting down in real time, monotonic sequence tokens, the PvP flag and
//! the cast bar. Every engine write is logged.

use crate::engine::{
    CastTiming, DispatchEvent, HostError, LockHost, ResponseEvent, IDLE_LOCK,
};

/// How a response is built from host state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerReply {
    /// Sequence answered; `None` means the host's current one
    pub sequence: Option<u16>,
    /// Action the server attributes the reply to
    pub action_id: u32,
    /// Lock the server wants applied
    pub new_lock: f64,
    /// Header lock; `None` means identical to `new_lock`
    pub header_lock: Option<f64>,
    /// Whether it concerns the local actor
    pub local_actor: bool,
    /// Whether it answers a completed cast
    pub completes_cast: bool,
}

impl ServerReply {
    /// Plain local reply for the current sequence
    pub fn new(action_id: u32, new_lock: f64) -> Self {
        Self {
            sequence: None,
            action_id,
            new_lock,
            header_lock: None,
            local_actor: true,
            completes_cast: false,
        }
    }
}

/// Simulated game client
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    lock: f64,
    sequence: u16,
    pvp: bool,
    cast: Option<CastTiming>,
    writes: Vec<f64>,
    reject_writes: bool,
}

impl SimulatedHost {
    /// Idle host in PvE with no lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lock (seconds)
    pub fn lock(&self) -> f64 {
        self.lock
    }

    /// Game-side lock change (not logged as an engine write)
    pub fn set_lock(&mut self, lock: f64) {
        self.lock = lock;
    }

    /// Switch content type
    pub fn set_pvp(&mut self, pvp: bool) {
        self.pvp = pvp;
    }

    /// Make every engine write fail
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    /// Values the engine wrote, in order
    pub fn writes(&self) -> &[f64] {
        &self.writes
    }

    /// Use an action: assign the next sequence token and start the idle lock
    pub fn begin_dispatch(&mut self, action_type: u8, action_id: u32) -> DispatchEvent {
        self.sequence = self.sequence.wrapping_add(1);
        if self.lock <= 0.0 {
            self.lock = IDLE_LOCK;
        }
        DispatchEvent {
            action_type,
            action_id,
            sequence: self.sequence,
        }
    }

    /// Receive a server reply: the game applies `new_lock` and reports what
    /// was left of the previous lock
    pub fn receive(&mut self, reply: ServerReply) -> ResponseEvent {
        let old_lock = self.lock;
        if reply.local_actor {
            self.lock = reply.new_lock;
        }
        ResponseEvent {
            source_sequence: reply.sequence.unwrap_or(self.sequence),
            action_id: reply.action_id,
            local_actor: reply.local_actor,
            old_lock,
            new_lock: reply.new_lock,
            header_lock: reply.header_lock.unwrap_or(reply.new_lock),
            completes_cast: reply.completes_cast,
        }
    }

    /// Start a cast bar of `cast_time` seconds
    pub fn begin_cast(&mut self, cast_time: f64) {
        self.cast = Some(CastTiming {
            elapsed: 0.0,
            total: cast_time,
        });
    }

    /// Drop the cast bar
    pub fn interrupt_cast(&mut self) {
        self.cast = None;
    }

    /// Remove a filled cast bar
    pub fn finish_cast_if_complete(&mut self) {
        if self.cast.is_some_and(|c| c.is_complete()) {
            self.cast = None;
        }
    }

    /// Let `dt` seconds pass
    pub fn advance(&mut self, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.lock = (self.lock - dt).max(0.0);
        if let Some(cast) = self.cast.as_mut() {
            cast.elapsed += dt;
        }
    }
}

impl LockHost for SimulatedHost {
    fn current_lock(&self) -> f64 {
        self.lock
    }

    fn set_current_lock(&mut self, value: f64) -> Result<(), HostError> {
        if self.reject_writes {
            return Err(HostError::WriteRejected("simulated rejection".to_string()));
        }
        self.lock = value;
        self.writes.push(value);
        Ok(())
    }

    fn current_sequence(&self) -> u16 {
        self.sequence
    }

    fn is_pvp(&self) -> bool {
        self.pvp
    }

    fn cast_timing(&self) -> Option<CastTiming> {
        self.cast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_assigns_sequence_and_idle_lock() {
        let mut host = SimulatedHost::new();
        let first = host.begin_dispatch(1, 10);
        let second = host.begin_dispatch(1, 11);

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(host.current_sequence(), 2);
        assert_eq!(host.lock(), IDLE_LOCK);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut host = SimulatedHost::new();
        host.sequence = u16::MAX;
        assert_eq!(host.begin_dispatch(1, 1).sequence, 0);
    }

    #[test]
    fn test_receive_reports_remaining_lock() {
        let mut host = SimulatedHost::new();
        host.begin_dispatch(1, 10);
        host.advance(0.3);

        let event = host.receive(ServerReply::new(10, 0.6));
        assert!((event.old_lock - 0.2).abs() < 1e-12);
        assert_eq!(event.new_lock, 0.6);
        assert_eq!(event.header_lock, 0.6);
        assert_eq!(event.source_sequence, 1);
        assert_eq!(host.lock(), 0.6);
    }

    #[test]
    fn test_lock_decays_to_zero() {
        let mut host = SimulatedHost::new();
        host.set_lock(0.1);
        host.advance(1.0);
        assert_eq!(host.lock(), 0.0);
    }

    #[test]
    fn test_rejected_writes() {
        let mut host = SimulatedHost::new();
        host.set_reject_writes(true);
        assert!(host.set_current_lock(0.4).is_err());
        assert!(host.writes().is_empty());
    }
}
