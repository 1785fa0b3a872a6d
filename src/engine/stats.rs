//! Engine statistics and diagnostics
//!
//! Everything here is a pure read of engine state, suitable for an overlay or
//! a JSON dump.

use serde::{Deserialize, Serialize};

use super::cast::CastState;
use super::ownership::LockOwner;

/// Cumulative counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Predictions written at dispatch
    pub actions_predicted: u64,
    /// Responses that went through the full correction path
    pub actions_corrected: u64,
    /// Responses whose RTT was already under the floor
    pub fast_path_count: u64,
    /// Responses whose lock disagreed with the header
    pub mismatches: u64,
    /// Responses carrying the interference signature
    pub interference_events: u64,
    /// Cast completions reconciled with the server
    pub casts_reconciled: u64,
    /// Events dropped because of an internal error
    pub errors: u64,
    /// Net seconds saved versus applying the server lock as-is
    pub total_time_saved: f64,
    /// Correction term of the last response (seconds)
    pub last_correction: f64,
}

impl EngineStats {
    /// Average time saved per corrected action (seconds)
    pub fn average_time_saved(&self) -> f64 {
        if self.actions_corrected == 0 {
            0.0
        } else {
            self.total_time_saved / self.actions_corrected as f64
        }
    }
}

/// Point-in-time view of all engine state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Smoothed RTT (seconds), `None` before the first sample
    pub smoothed_rtt: Option<f64>,
    /// RTT variance (seconds)
    pub rtt_variance: f64,
    /// Samples accepted by the RTT estimator
    pub rtt_samples: u64,
    /// Current latency floor (seconds)
    pub floor: f64,
    /// Window minimum RTT (seconds)
    pub min_rtt: Option<f64>,
    /// Samples held by the floor window
    pub floor_samples: usize,
    /// Packets sent in the trailing 50 ms
    pub packets_in_window: u32,
    /// Weight the next RTT sample would get
    pub burst_weight: f64,
    /// Predictions awaiting a response
    pub pending_predictions: usize,
    /// Current write-intent holder
    pub owner: LockOwner,
    /// Cast state machine
    pub cast_state: CastState,
    /// Lock pre-applied for the last reconciled cast
    pub last_predicted_cast_lock: Option<f64>,
    /// Server lock for the last reconciled cast
    pub last_actual_cast_lock: Option<f64>,
    /// Writes are suppressed (dry run or interference)
    pub read_only: bool,
    /// Interference has been detected and not cleared
    pub interference_detected: bool,
    /// Keys in the lock database
    pub database_entries: usize,
    /// Counters
    pub stats: EngineStats,
}
