//! Host capability interface
//!
//! The engine never sees host memory. It works through [`LockHost`], which
//! exposes only the fields it needs: the mutable current lock, the current
//! sequence token, the PvP flag and the cast timing. Lifecycle callbacks are
//! delivered as plain event structs.

use thiserror::Error;

/// The host's own lock value for a freshly dispatched action (seconds)
pub const IDLE_LOCK: f64 = 0.5;

/// Writes at or above this value never reach the host (seconds)
pub const LOCK_CEILING: f64 = 10.0;

/// Host-side failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// The host refused the write
    #[error("Host rejected lock write: {0}")]
    WriteRejected(String),

    /// The lock field is not reachable (e.g. between zones)
    #[error("Host lock field unavailable")]
    Unavailable,
}

/// Progress of the local cast bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastTiming {
    /// Seconds cast so far
    pub elapsed: f64,
    /// Full cast time in seconds
    pub total: f64,
}

impl CastTiming {
    /// Whether the cast bar has filled locally
    pub fn is_complete(&self) -> bool {
        self.total > 0.0 && self.elapsed >= self.total
    }
}

/// An action was used locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Host action category
    pub action_type: u8,
    /// Raw action identifier
    pub action_id: u32,
    /// Sequence token the host assigned to this use
    pub sequence: u16,
}

/// The server reported an authoritative lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseEvent {
    /// Sequence token of the action this answers
    pub source_sequence: u16,
    /// Action the server attributes the response to
    pub action_id: u32,
    /// Whether the response concerns the local actor
    pub local_actor: bool,
    /// Lock remaining on the host when the response arrived (seconds)
    pub old_lock: f64,
    /// Lock the server wants applied (seconds)
    pub new_lock: f64,
    /// Lock value carried in the response header
    pub header_lock: f64,
    /// The host signalled that this answers a completed cast
    pub completes_cast: bool,
}

/// Narrow view of the host
#[cfg_attr(test, mockall::automock)]
pub trait LockHost {
    /// Current lock value (seconds)
    fn current_lock(&self) -> f64;

    /// Overwrite the current lock value
    fn set_current_lock(&mut self, value: f64) -> Result<(), HostError>;

    /// Most recently assigned sequence token
    fn current_sequence(&self) -> u16;

    /// Whether the player is in competitive content
    fn is_pvp(&self) -> bool;

    /// Local cast progress, if a cast bar is active
    fn cast_timing(&self) -> Option<CastTiming>;

    /// Map a raw action to its canonical identifier
    fn resolve_action(&self, _action_type: u8, action_id: u32) -> u32 {
        action_id
    }
}
