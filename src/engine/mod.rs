//! Adaptive lock correction
//!
//! The orchestration layer: the general predict → observe → correct
//! pipeline and the parallel cast-completion predictor, both driven by
//! serial host callbacks.
//!
//! # Data Flow
//!
//! ```text
//! action dispatched
//!   └─> CorrectionEngine::on_dispatch
//!       ├─> LockDatabase::get_lock + FloorTracker::floor
//!       └─> host.set_current_lock(predicted), pending[seq] = predicted
//!
//! server response
//!   └─> CorrectionEngine::on_response
//!       ├─> pending cast?  -> reconcile, bypass the pipeline
//!       ├─> mismatch?      -> warn, no learning
//!       ├─> interference?  -> sticky observe-only
//!       └─> RTT, floor, estimator, database -> host.set_current_lock(adjusted)
//!
//! every frame
//!   └─> CorrectionEngine::on_tick
//!       ├─> PacketBurstTracker::update
//!       └─> CastPredictor::check_completion
//! ```
//!
//! # Threading
//!
//! All callbacks arrive serially on the host's update thread. The engine is
//! `!Sync` by construction (the floor cache uses `Cell`) and needs no locks.

mod cast;
mod correction;
mod error;
mod host;
mod interference;
mod ownership;
mod stats;

pub use cast::{CastPredictor, CastState, PendingCast, CAST_RESPONSE_TIMEOUT, DEFAULT_CAST_TAX};
pub use correction::{
    CorrectionEngine, DispatchOutcome, EngineConfig, ResponseOutcome, SkipReason,
};
pub use error::{EngineError, Result};
pub use host::{
    CastTiming, DispatchEvent, HostError, LockHost, ResponseEvent, IDLE_LOCK, LOCK_CEILING,
};
pub use interference::{InterferenceParams, LOCK_QUANTUM_MS};
pub use ownership::LockOwner;
pub use stats::{Diagnostics, EngineStats};
