//! Cast-Completion Predictor
//!
//! Channeled casts lock the player only after the cast bar fills, and the
//! server's value for that lock arrives a round trip later. The predictor
//! watches the local cast bar and pre-applies a fixed tax the moment it
//! completes, then hands the prediction to the correction engine for
//! reconciliation when the response arrives.
//!
//! ```text
//!            cast_begin                 cast bar full
//!   Idle ───────────────> Casting ─────────────────────> Idle + PendingCast
//!     ^                      │
//!     └──── interrupt ───────┘
//! ```
//!
//! A pending cast is only held until its response arrives. If the response
//! never shows up, the pending cast expires after [`CAST_RESPONSE_TIMEOUT`]
//! seconds of ticks so it cannot hold the lock field indefinitely.

use serde::Serialize;
use tracing::debug;

use super::host::CastTiming;

/// Default lock pre-applied at local cast completion (seconds)
pub const DEFAULT_CAST_TAX: f64 = 0.1;

/// Seconds a pending cast waits for its server response before expiring
pub const CAST_RESPONSE_TIMEOUT: f64 = 2.0;

/// Cast state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CastState {
    /// No cast in progress
    #[default]
    Idle,
    /// A cast bar is filling
    Casting {
        /// Action being cast
        action_id: u32,
    },
}

/// A completed cast awaiting its server response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCast {
    /// Action that completed
    pub action_id: u32,
    /// Lock pre-applied at completion (seconds)
    pub predicted: f64,
}

/// Local cast-completion tracker
#[derive(Debug, Clone, Default)]
pub struct CastPredictor {
    state: CastState,
    pending: Option<PendingCast>,
    pending_age: f64,
    last_predicted: Option<f64>,
    last_actual: Option<f64>,
}

impl CastPredictor {
    /// Create an idle predictor
    pub fn new() -> Self {
        Self::default()
    }

    /// A cast bar started
    pub fn on_cast_begin(&mut self, action_id: u32) {
        debug!("CastPredictor: casting action {}", action_id);
        self.state = CastState::Casting { action_id };
    }

    /// The cast was interrupted before completing
    pub fn on_cast_interrupt(&mut self) {
        if let CastState::Casting { action_id } = self.state {
            debug!("CastPredictor: action {} interrupted", action_id);
        }
        self.state = CastState::Idle;
    }

    /// Per-frame check against the host's cast bar
    ///
    /// Returns the prediction when local completion is detected and goes back
    /// to `Idle`. The prediction only becomes pending once [`arm`](Self::arm)
    /// is called. A vanished cast bar while casting counts as an interrupt.
    pub fn check_completion(&mut self, timing: Option<CastTiming>, tax: f64) -> Option<PendingCast> {
        let CastState::Casting { action_id } = self.state else {
            return None;
        };

        match timing {
            Some(timing) if timing.is_complete() => {
                let pending = PendingCast {
                    action_id,
                    predicted: tax,
                };
                debug!(
                    "CastPredictor: action {} completed locally, pre-applying {:.3}s",
                    action_id, tax
                );
                self.state = CastState::Idle;
                Some(pending)
            }
            Some(_) => None,
            None => {
                self.on_cast_interrupt();
                None
            }
        }
    }

    /// Hold `pending` until its response arrives, replacing any older one
    pub fn arm(&mut self, pending: PendingCast) {
        self.pending = Some(pending);
        self.pending_age = 0.0;
    }

    /// Age the pending cast by `delta_time`
    ///
    /// Returns the pending cast if it has now waited `timeout` seconds or
    /// more; it is dropped without recording an outcome.
    pub fn expire(&mut self, delta_time: f64, timeout: f64) -> Option<PendingCast> {
        self.pending?;
        if delta_time.is_finite() && delta_time > 0.0 {
            self.pending_age += delta_time;
        }
        if self.pending_age < timeout {
            return None;
        }
        self.abandon()
    }

    /// Drop the pending cast without reconciling it
    pub fn abandon(&mut self) -> Option<PendingCast> {
        self.pending_age = 0.0;
        self.pending.take()
    }

    /// Pending cast, if one awaits its response
    pub fn pending(&self) -> Option<&PendingCast> {
        self.pending.as_ref()
    }

    /// Complete reconciliation: drop the pending cast and remember the outcome
    pub fn finish(&mut self, actual: f64) -> Option<PendingCast> {
        let pending = self.abandon()?;
        self.last_predicted = Some(pending.predicted);
        self.last_actual = Some(actual);
        Some(pending)
    }

    /// Current state
    pub fn state(&self) -> CastState {
        self.state
    }

    /// Lock pre-applied for the last reconciled cast
    pub fn last_predicted(&self) -> Option<f64> {
        self.last_predicted
    }

    /// Server lock for the last reconciled cast
    pub fn last_actual(&self) -> Option<f64> {
        self.last_actual
    }
}
