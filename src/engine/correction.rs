//! Correction Engine
//!
//! Predict → observe → correct state machine over the host's lock field.
//!
//! # Transitions
//!
//! ```text
//! dispatch:  predicted = db.get_lock(id, ctx, 0.5) + floor
//!            write predicted, pending[seq] = predicted        (unless read-only)
//!
//! response:  applied  = pending[seq] or 0.5
//!            rtt      = applied - old_lock
//!            floor.add_sample(rtt)
//!            rtt <= floor  -> fast path, nothing to correct
//!            otherwise:
//!              srtt.add_sample(rtt, burst_weight)
//!              correction = new_lock - (applied - floor)
//!              adjusted   = max(old_lock + correction + k·rttvar, 0)
//!              write adjusted                                 (unless read-only)
//!
//! tick:      age the burst window, expire a stale pending cast,
//!            check for local cast completion
//! ```
//!
//! A pending cast owns the lock field until its flagged response arrives. It
//! is superseded by a new cast, by a local response that answers no pending
//! general prediction, by [`CAST_RESPONSE_TIMEOUT`] of ticks, or by
//! [`CorrectionEngine::reset_network`]. While it owns the field, responses
//! to older general predictions still teach the models but are not written.
//!
//! # Failure Semantics
//!
//! Response handling stages every update (estimator, floor window, database
//! entry, pending map) on copies, performs the host write, and only then
//! commits. Any error leaves the engine exactly as it was before the event.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

use super::cast::{CastPredictor, PendingCast, CAST_RESPONSE_TIMEOUT, DEFAULT_CAST_TAX};
use super::error::{EngineError, Result};
use super::host::{DispatchEvent, LockHost, ResponseEvent, IDLE_LOCK, LOCK_CEILING};
use super::interference::{InterferenceParams, LOCK_QUANTUM_MS};
use super::ownership::LockOwner;
use super::stats::{Diagnostics, EngineStats};
use crate::database::{LockContext, LockDatabase, LockEntry, StagedRecord};
use crate::estimator::{
    FloorParams, FloorTracker, PacketBurstTracker, PacketEvent, RttEstimator, RttParams,
    MIN_WINDOW_SIZE,
};

/// Host lock closer than this to [`IDLE_LOCK`] counts as idle
const IDLE_TOLERANCE: f64 = 1e-6;

/// Configuration snapshot consumed by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// RTT estimator tunables
    pub rtt: RttParams,
    /// Floor tracker tunables
    pub floor: FloorParams,
    /// Compute everything, write nothing
    pub dry_run: bool,
    /// Lock pre-applied at local cast completion (seconds)
    pub cast_tax: f64,
    /// Interference heuristic
    pub interference: InterferenceParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rtt: RttParams::default(),
            floor: FloorParams::default(),
            dry_run: false,
            cast_tax: DEFAULT_CAST_TAX,
            interference: InterferenceParams::default(),
        }
    }
}

impl EngineConfig {
    /// Check every tunable against its allowed range
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if !(self.rtt.alpha > 0.0 && self.rtt.alpha <= 1.0) {
            return invalid(format!("alpha ({}) must be in (0, 1]", self.rtt.alpha));
        }
        if !(self.rtt.beta > 0.0 && self.rtt.beta <= 1.0) {
            return invalid(format!("beta ({}) must be in (0, 1]", self.rtt.beta));
        }
        if !(0.0..=10.0).contains(&self.rtt.k) {
            return invalid(format!("k ({}) must be in [0, 10]", self.rtt.k));
        }
        if !(self.floor.scaling_factor > 0.0 && self.floor.scaling_factor <= 1.0) {
            return invalid(format!(
                "floor scaling_factor ({}) must be in (0, 1]",
                self.floor.scaling_factor
            ));
        }
        if self.floor.window_size < MIN_WINDOW_SIZE {
            return invalid(format!(
                "floor window_size ({}) must be at least {}",
                self.floor.window_size, MIN_WINDOW_SIZE
            ));
        }
        if !(self.cast_tax > 0.0 && self.cast_tax < LOCK_CEILING) {
            return invalid(format!(
                "cast_tax ({}) must be in (0, {})",
                self.cast_tax, LOCK_CEILING
            ));
        }
        let band = &self.interference;
        if !(band.band_low_ms >= 0.0
            && band.band_low_ms <= band.band_high_ms
            && band.band_high_ms < LOCK_QUANTUM_MS)
        {
            return invalid(format!(
                "interference band [{}, {}] ms must satisfy 0 <= low <= high < {}",
                band.band_low_ms, band.band_high_ms, LOCK_QUANTUM_MS
            ));
        }
        Ok(())
    }
}

/// Why a dispatch was not predicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The cast predictor holds the lock field
    OwnedByCast,
    /// The host lock is not at its idle default
    LockBusy,
}

/// Result of a dispatch event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchOutcome {
    /// Nothing was predicted
    Skipped(SkipReason),
    /// A lock was predicted
    Predicted {
        /// Canonical action identifier
        action_id: u32,
        /// Predicted lock (seconds)
        lock: f64,
        /// Whether it reached the host
        written: bool,
    },
    /// The host write failed; nothing recorded
    Failed,
}

/// Result of a server response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseOutcome {
    /// Not ours, or a no-op response
    Ignored,
    /// Response lock disagreed with its header
    Mismatch,
    /// A pending cast completion was reconciled
    CastReconciled {
        /// Value for the host (seconds)
        adjusted: f64,
        /// Whether it reached the host
        written: bool,
    },
    /// The round trip was already under the floor
    FastPath {
        /// Measured RTT (seconds)
        rtt: f64,
    },
    /// Full correction applied
    Corrected {
        /// Measured RTT (seconds)
        rtt: f64,
        /// Correction term (seconds)
        correction: f64,
        /// Value for the host (seconds)
        adjusted: f64,
        /// Whether it reached the host
        written: bool,
    },
    /// Internal error; the event was dropped
    Failed,
}

/// Everything a response would change, computed before anything changes
struct ResponsePlan {
    rtt_estimator: Option<RttEstimator>,
    floor: FloorTracker,
    database: Option<StagedRecord>,
    sequence: u16,
    clear_all: bool,
    interference: bool,
    outcome: ResponseOutcome,
}

/// Adaptive lock correction engine
pub struct CorrectionEngine {
    config: EngineConfig,
    rtt: RttEstimator,
    floor: FloorTracker,
    burst: PacketBurstTracker,
    database: LockDatabase,
    cast: CastPredictor,
    /// Sequence token -> lock applied at dispatch
    pending: HashMap<u16, f64>,
    owner: LockOwner,
    interference: bool,
    interference_warned: bool,
    stats: EngineStats,
}

impl CorrectionEngine {
    /// Create an engine with an empty lock database
    pub fn new(config: EngineConfig) -> Self {
        Self::with_database(config, LockDatabase::new())
    }

    /// Create an engine around an existing lock database
    pub fn with_database(config: EngineConfig, database: LockDatabase) -> Self {
        Self {
            rtt: RttEstimator::new(config.rtt),
            floor: FloorTracker::new(config.floor),
            burst: PacketBurstTracker::new(),
            database,
            cast: CastPredictor::new(),
            pending: HashMap::new(),
            owner: LockOwner::Unowned,
            interference: false,
            interference_warned: false,
            stats: EngineStats::default(),
            config,
        }
    }

    /// Install a new configuration snapshot
    ///
    /// An invalid snapshot is rejected and the previous one stays active.
    pub fn apply_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        if config.dry_run != self.config.dry_run {
            info!("Dry-run mode {}", if config.dry_run { "enabled" } else { "disabled" });
        }
        self.rtt.set_params(config.rtt);
        self.floor.set_params(config.floor);
        self.config = config;
        Ok(())
    }

    /// Writes are suppressed by dry-run or detected interference
    pub fn is_read_only(&self) -> bool {
        self.config.dry_run || self.interference
    }

    /// An action was used locally
    pub fn on_dispatch<H: LockHost + ?Sized>(
        &mut self,
        host: &mut H,
        event: DispatchEvent,
    ) -> DispatchOutcome {
        if !self.owner.allows_general() {
            debug!("Dispatch seq={} skipped: cast predictor owns the lock", event.sequence);
            return DispatchOutcome::Skipped(SkipReason::OwnedByCast);
        }

        let current = host.current_lock();
        if (current - IDLE_LOCK).abs() > IDLE_TOLERANCE {
            debug!(
                "Dispatch seq={} skipped: host lock {:.3}s is not idle",
                event.sequence, current
            );
            return DispatchOutcome::Skipped(SkipReason::LockBusy);
        }

        let action_id = host.resolve_action(event.action_type, event.action_id);
        let context = LockContext::from_pvp(host.is_pvp());
        let predicted = self.database.get_lock(action_id, context, IDLE_LOCK) + self.floor.floor();

        if self.is_read_only() || !is_writable(predicted) {
            debug!(
                "Dispatch action={} seq={} predicted {:.3}s (not written)",
                action_id, event.sequence, predicted
            );
            return DispatchOutcome::Predicted {
                action_id,
                lock: predicted,
                written: false,
            };
        }

        if let Err(e) = host.set_current_lock(predicted) {
            error!("Dispatch action={} seq={}: {}", action_id, event.sequence, e);
            self.stats.errors += 1;
            return DispatchOutcome::Failed;
        }

        self.pending.insert(event.sequence, predicted);
        self.owner = LockOwner::General(event.sequence);
        self.stats.actions_predicted += 1;
        debug!(
            "Dispatch action={} ({}) seq={} predicted {:.3}s",
            action_id, context, event.sequence, predicted
        );

        DispatchOutcome::Predicted {
            action_id,
            lock: predicted,
            written: true,
        }
    }

    /// The server reported an authoritative lock
    ///
    /// Errors are logged here and the event becomes a no-op.
    pub fn on_response<H: LockHost + ?Sized>(
        &mut self,
        host: &mut H,
        event: ResponseEvent,
    ) -> ResponseOutcome {
        match self.handle_response(host, &event) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Response seq={} action={} dropped: {}",
                    event.source_sequence, event.action_id, e
                );
                self.stats.errors += 1;
                ResponseOutcome::Failed
            }
        }
    }

    /// Per-frame tick
    ///
    /// Returns the cast prediction if a local cast completed this frame and
    /// its tax could be applied.
    pub fn on_tick<H: LockHost + ?Sized>(
        &mut self,
        host: &mut H,
        delta_time: f64,
    ) -> Option<PendingCast> {
        self.burst.update(delta_time);

        if let Some(stale) = self.cast.expire(delta_time, CAST_RESPONSE_TIMEOUT) {
            warn!(
                "No server response for cast action {} within {}s, releasing the lock field",
                stale.action_id, CAST_RESPONSE_TIMEOUT
            );
            self.owner.release_cast();
        }

        let pending = self
            .cast
            .check_completion(host.cast_timing(), self.config.cast_tax)?;

        if !self.is_read_only() && is_writable(pending.predicted) {
            if let Err(e) = host.set_current_lock(pending.predicted) {
                error!("Cast completion for action {}: {}", pending.action_id, e);
                self.stats.errors += 1;
                return None;
            }
        }

        self.cast.arm(pending);
        self.owner = LockOwner::CastPredictor;
        Some(pending)
    }

    /// An outgoing packet was observed
    pub fn on_packet_sent(&mut self, event: PacketEvent) {
        self.burst.record_packet(event);
    }

    /// A cast bar started
    pub fn on_cast_begin(&mut self, action_id: u32) {
        self.supersede_cast("a new cast began");
        self.cast.on_cast_begin(action_id);
    }

    /// The cast was interrupted
    pub fn on_cast_interrupt(&mut self) {
        self.cast.on_cast_interrupt();
    }

    /// Leave interference mode
    pub fn clear_interference(&mut self) {
        if self.interference {
            info!("Interference cleared, resuming lock writes");
        }
        self.interference = false;
        self.interference_warned = false;
    }

    /// Whether interference has been detected and not cleared
    pub fn interference_detected(&self) -> bool {
        self.interference
    }

    /// Forget all network state; the lock database is kept
    pub fn reset_network(&mut self) {
        self.rtt.reset();
        self.floor.reset();
        self.burst.reset();
        self.pending.clear();
        self.supersede_cast("network reset");
        self.owner.release_general(0, true);
    }

    /// Replace the lock database with an exported snapshot
    ///
    /// A rejected snapshot leaves the current database untouched.
    pub fn import_database(&mut self, snapshot: &BTreeMap<String, LockEntry>) -> Result<usize> {
        let imported = self.database.import(snapshot)?;
        info!("Imported {} lock entries", imported);
        Ok(imported)
    }

    /// Zero the statistics
    pub fn reset_stats(&mut self) {
        self.stats = EngineStats::default();
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Learned locks
    pub fn database(&self) -> &LockDatabase {
        &self.database
    }

    /// Learned locks, mutably (for import)
    pub fn database_mut(&mut self) -> &mut LockDatabase {
        &mut self.database
    }

    /// Counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// RTT estimator
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Floor tracker
    pub fn floor(&self) -> &FloorTracker {
        &self.floor
    }

    /// Current write-intent holder
    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    /// Completed cast awaiting its response
    pub fn pending_cast(&self) -> Option<PendingCast> {
        self.cast.pending().copied()
    }

    /// Predictions awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of all engine state
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            smoothed_rtt: self.rtt.smoothed_rtt(),
            rtt_variance: self.rtt.rtt_variance(),
            rtt_samples: self.rtt.sample_count(),
            floor: self.floor.floor(),
            min_rtt: self.floor.min_rtt(),
            floor_samples: self.floor.count(),
            packets_in_window: self.burst.total_packets_sent(),
            burst_weight: self.burst.rtt_weight(),
            pending_predictions: self.pending.len(),
            owner: self.owner,
            cast_state: self.cast.state(),
            last_predicted_cast_lock: self.cast.last_predicted(),
            last_actual_cast_lock: self.cast.last_actual(),
            read_only: self.is_read_only(),
            interference_detected: self.interference,
            database_entries: self.database.len(),
            stats: self.stats.clone(),
        }
    }

    fn handle_response<H: LockHost + ?Sized>(
        &mut self,
        host: &mut H,
        event: &ResponseEvent,
    ) -> Result<ResponseOutcome> {
        if !event.local_actor || event.old_lock == event.new_lock {
            return Ok(ResponseOutcome::Ignored);
        }

        if event.completes_cast && self.cast.pending().is_some() {
            return self.reconcile_cast(host, event);
        }

        // Anything not answering a general prediction is the cast's reply
        // arriving without its flag
        let supersedes_cast =
            self.cast.pending().is_some() && !self.pending.contains_key(&event.source_sequence);

        if event.new_lock != event.header_lock {
            warn!(
                "Lock mismatch for action {}: response {:.4}s, header {:.4}s; another tool may be modifying locks",
                event.action_id, event.new_lock, event.header_lock
            );
            if supersedes_cast {
                self.supersede_cast("unflagged response");
            }
            self.stats.mismatches += 1;
            return Ok(ResponseOutcome::Mismatch);
        }

        let held_by_cast = self.owner == LockOwner::CastPredictor && !supersedes_cast;
        let plan = self.plan_response(host, event, held_by_cast)?;

        if let ResponseOutcome::Corrected {
            adjusted,
            written: true,
            ..
        } = plan.outcome
        {
            host.set_current_lock(adjusted)?;
        }

        if supersedes_cast {
            self.supersede_cast("unflagged response");
        }
        Ok(self.commit(plan, event))
    }

    fn supersede_cast(&mut self, reason: &str) {
        if let Some(stale) = self.cast.abandon() {
            debug!(
                "Pending cast action={} superseded ({}), releasing the lock field",
                stale.action_id, reason
            );
            self.owner.release_cast();
        }
    }

    fn plan_response<H: LockHost + ?Sized>(
        &self,
        host: &H,
        event: &ResponseEvent,
        held_by_cast: bool,
    ) -> Result<ResponsePlan> {
        let detected = self.config.interference.matches(event.new_lock);
        let interference = self.interference || detected;
        let read_only = self.config.dry_run || interference;

        let sequence = event.source_sequence;
        let applied = self.pending.get(&sequence).copied().unwrap_or(IDLE_LOCK);
        let clear_all = sequence == host.current_sequence();

        let context = LockContext::from_pvp(host.is_pvp());
        let database = if interference {
            None
        } else {
            self.database
                .stage_record(event.action_id, context, event.new_lock)
        };

        let rtt = applied - event.old_lock;
        if !rtt.is_finite() {
            return Err(EngineError::non_finite("rtt", rtt));
        }

        let mut floor = self.floor.clone();
        floor.add_sample(rtt);
        let floor_value = floor.floor();

        if rtt <= floor_value {
            return Ok(ResponsePlan {
                rtt_estimator: None,
                floor,
                database,
                sequence,
                clear_all,
                interference,
                outcome: ResponseOutcome::FastPath { rtt },
            });
        }

        let mut rtt_estimator = self.rtt;
        rtt_estimator.add_sample(rtt, self.burst.rtt_weight());

        let correction = event.new_lock - (applied - floor_value);
        let variance_buffer = rtt_estimator.variance_buffer();
        let adjusted = (event.old_lock + correction + variance_buffer).max(0.0);
        if !adjusted.is_finite() {
            return Err(EngineError::non_finite("adjusted lock", adjusted));
        }

        let writable = is_writable(adjusted);
        let written = !read_only && !held_by_cast && writable;
        if held_by_cast {
            debug!(
                "Adjusted lock {:.3}s for action {} not written: cast predictor owns the lock",
                adjusted, event.action_id
            );
        } else if !read_only && !writable {
            warn!(
                "Adjusted lock {:.3}s for action {} exceeds the {}s ceiling; not written",
                adjusted, event.action_id, LOCK_CEILING
            );
        }

        Ok(ResponsePlan {
            rtt_estimator: Some(rtt_estimator),
            floor,
            database,
            sequence,
            clear_all,
            interference,
            outcome: ResponseOutcome::Corrected {
                rtt,
                correction,
                adjusted,
                written,
            },
        })
    }

    fn commit(&mut self, plan: ResponsePlan, event: &ResponseEvent) -> ResponseOutcome {
        if plan.interference && !self.interference {
            self.interference = true;
            self.stats.interference_events += 1;
            if !self.interference_warned {
                self.interference_warned = true;
                warn!(
                    "Lock value {:.4}s carries a third-party modifier signature; switching to observe-only until cleared",
                    event.new_lock
                );
            }
        }

        self.floor = plan.floor;
        if let Some(rtt_estimator) = plan.rtt_estimator {
            self.rtt = rtt_estimator;
        }
        if let Some(staged) = plan.database {
            self.database.commit(staged);
        }

        self.pending.remove(&plan.sequence);
        if plan.clear_all {
            self.pending.clear();
        }
        self.owner.release_general(plan.sequence, plan.clear_all);

        match plan.outcome {
            ResponseOutcome::FastPath { rtt } => {
                self.stats.fast_path_count += 1;
                self.stats.last_correction = 0.0;
                debug!(
                    "Response action={} seq={} rtt={:.1}ms under floor, no correction",
                    event.action_id,
                    plan.sequence,
                    rtt * 1000.0
                );
            }
            ResponseOutcome::Corrected {
                rtt,
                correction,
                adjusted,
                written,
            } => {
                self.stats.actions_corrected += 1;
                self.stats.last_correction = correction;
                if written || self.is_read_only() {
                    self.stats.total_time_saved += event.new_lock - adjusted;
                }
                debug!(
                    "Response action={} seq={} rtt={:.1}ms srtt={:.1}ms floor={:.1}ms: {:.3}s -> {:.3}s",
                    event.action_id,
                    plan.sequence,
                    rtt * 1000.0,
                    self.rtt.smoothed_rtt().unwrap_or(0.0) * 1000.0,
                    self.floor.floor() * 1000.0,
                    event.new_lock,
                    adjusted
                );
            }
            _ => {}
        }

        plan.outcome
    }

    fn reconcile_cast<H: LockHost + ?Sized>(
        &mut self,
        host: &mut H,
        event: &ResponseEvent,
    ) -> Result<ResponseOutcome> {
        let adjusted = event.new_lock + event.old_lock.max(0.0);
        if !adjusted.is_finite() {
            return Err(EngineError::non_finite("cast lock", adjusted));
        }

        let written = !self.is_read_only() && is_writable(adjusted);
        if written {
            host.set_current_lock(adjusted)?;
        }

        if let Some(done) = self.cast.finish(event.new_lock) {
            debug!(
                "Cast action={} reconciled: predicted {:.3}s, server {:.3}s, applied {:.3}s",
                done.action_id, done.predicted, event.new_lock, adjusted
            );
        }
        self.owner.release_cast();
        self.stats.casts_reconciled += 1;

        Ok(ResponseOutcome::CastReconciled { adjusted, written })
    }
}

impl Default for CorrectionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn is_writable(value: f64) -> bool {
    value.is_finite() && value < LOCK_CEILING
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseError;
    use crate::engine::cast::CastState;
    use crate::engine::host::{CastTiming, HostError, MockLockHost};
    use crate::replay::{ServerReply, SimulatedHost};

    fn response(sequence: u16, action_id: u32, old_lock: f64, new_lock: f64) -> ResponseEvent {
        ResponseEvent {
            source_sequence: sequence,
            action_id,
            local_actor: true,
            old_lock,
            new_lock,
            header_lock: new_lock,
            completes_cast: false,
        }
    }

    fn dispatch(host: &mut SimulatedHost, engine: &mut CorrectionEngine, id: u32) -> DispatchOutcome {
        let event = host.begin_dispatch(1, id);
        engine.on_dispatch(host, event)
    }

    /// Run a cast bar to local completion so the cast predictor owns the lock
    fn complete_cast(host: &mut SimulatedHost, engine: &mut CorrectionEngine, id: u32) {
        host.begin_cast(0.5);
        engine.on_cast_begin(id);
        host.advance(0.5);
        assert!(engine.on_tick(host, 0.5).is_some());
        host.finish_cast_if_complete();
        assert_eq!(engine.owner(), LockOwner::CastPredictor);
    }

    #[test]
    fn test_end_to_end_first_action() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        let outcome = dispatch(&mut host, &mut engine, 100);
        match outcome {
            DispatchOutcome::Predicted { lock, written, .. } => {
                assert!((lock - 0.54).abs() < 1e-12);
                assert!(written);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!((host.lock() - 0.54).abs() < 1e-12);
        assert_eq!(engine.owner(), LockOwner::General(host.current_sequence()));

        let seq = host.current_sequence();
        let outcome = engine.on_response(&mut host, response(seq, 100, 0.2, 0.5));
        match outcome {
            ResponseOutcome::Corrected {
                rtt,
                correction,
                adjusted,
                written,
            } => {
                assert!((rtt - 0.34).abs() < 1e-9);
                assert!(correction.abs() < 1e-9);
                // First sample: rttvar = rtt / 2, k = 1
                assert!((adjusted - (0.2 + 0.17)).abs() < 1e-9);
                assert!(written);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!((host.lock() - 0.37).abs() < 1e-9);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert_eq!(engine.database().entry(100, LockContext::PvE).unwrap().sample_count, 1);
        assert_eq!(engine.stats().actions_corrected, 1);
    }

    #[test]
    fn test_fast_path_under_floor() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        dispatch(&mut host, &mut engine, 5);
        let seq = host.current_sequence();
        // 0.54 - 0.52 = 20ms round trip, under the 40ms default floor
        let outcome = engine.on_response(&mut host, response(seq, 5, 0.52, 0.6));

        assert!(matches!(outcome, ResponseOutcome::FastPath { .. }));
        assert!(!engine.rtt().is_initialized());
        assert_eq!(engine.floor().count(), 1);
        assert_eq!(engine.stats().fast_path_count, 1);
        assert_eq!(engine.stats().last_correction, 0.0);
        assert_eq!(engine.database().len(), 1);
    }

    #[test]
    fn test_ignored_responses() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        assert_eq!(
            engine.on_response(&mut host, response(1, 5, 0.5, 0.5)),
            ResponseOutcome::Ignored
        );
        let mut remote = response(1, 5, 0.2, 0.5);
        remote.local_actor = false;
        assert_eq!(engine.on_response(&mut host, remote), ResponseOutcome::Ignored);
        assert!(engine.database().is_empty());
    }

    #[test]
    fn test_mismatch_does_not_learn() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        dispatch(&mut host, &mut engine, 5);

        let mut event = response(host.current_sequence(), 5, 0.2, 0.5);
        event.header_lock = 0.6;
        assert_eq!(engine.on_response(&mut host, event), ResponseOutcome::Mismatch);

        assert!(engine.database().is_empty());
        assert_eq!(engine.floor().count(), 0);
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.stats().mismatches, 1);
    }

    #[test]
    fn test_interference_is_sticky_and_suppresses_learning() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        dispatch(&mut host, &mut engine, 5);
        let writes_before = host.writes().len();

        let seq = host.current_sequence();
        let outcome = engine.on_response(&mut host, response(seq, 5, 0.2, 0.5004));
        assert!(matches!(
            outcome,
            ResponseOutcome::Corrected { written: false, .. }
        ));
        assert!(engine.interference_detected());
        assert!(engine.is_read_only());
        assert!(engine.database().is_empty());
        assert_eq!(host.writes().len(), writes_before);

        // Clean values keep the engine observe-only until cleared
        host.set_lock(0.0);
        let outcome = dispatch(&mut host, &mut engine, 6);
        assert!(matches!(outcome, DispatchOutcome::Predicted { written: false, .. }));
        let seq = host.current_sequence();
        engine.on_response(&mut host, response(seq, 6, 0.2, 0.5));
        assert!(engine.database().is_empty());

        engine.clear_interference();
        assert!(!engine.is_read_only());
        host.set_lock(0.0);
        assert!(matches!(
            dispatch(&mut host, &mut engine, 6),
            DispatchOutcome::Predicted { written: true, .. }
        ));
    }

    #[test]
    fn test_dispatch_skipped_when_lock_busy() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        host.set_lock(0.3);
        let event = host.begin_dispatch(1, 9);
        assert_eq!(
            engine.on_dispatch(&mut host, event),
            DispatchOutcome::Skipped(SkipReason::LockBusy)
        );
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_current_sequence_clears_older_pending() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        dispatch(&mut host, &mut engine, 1);
        let first = host.current_sequence();
        host.set_lock(0.0);
        dispatch(&mut host, &mut engine, 2);
        let second = host.current_sequence();
        assert_eq!(engine.pending_count(), 2);

        // Response for the older action: only its own entry is removed
        engine.on_response(&mut host, response(first, 1, 0.3, 0.5));
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.owner(), LockOwner::General(second));

        host.set_lock(0.0);
        dispatch(&mut host, &mut engine, 3);
        assert_eq!(engine.pending_count(), 2);
        let third = host.current_sequence();
        engine.on_response(&mut host, response(third, 3, 0.3, 0.5));
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.owner(), LockOwner::Unowned);
    }

    #[test]
    fn test_unmatched_response_uses_idle_default() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        let outcome = engine.on_response(&mut host, response(42, 7, 0.3, 0.6));
        match outcome {
            ResponseOutcome::Corrected { rtt, .. } => assert!((rtt - 0.2).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_learned_lock_used_for_prediction() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        for _ in 0..3 {
            engine.database_mut().record_lock(11, LockContext::PvE, 0.6);
        }

        match dispatch(&mut host, &mut engine, 11) {
            DispatchOutcome::Predicted { lock, .. } => assert!((lock - 0.64).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pvp_context_selected() {
        let mut host = SimulatedHost::new();
        host.set_pvp(true);
        let mut engine = CorrectionEngine::default();
        dispatch(&mut host, &mut engine, 11);
        let seq = host.current_sequence();
        engine.on_response(&mut host, response(seq, 11, 0.2, 0.5));

        assert!(engine.database().entry(11, LockContext::PvP).is_some());
        assert!(engine.database().entry(11, LockContext::PvE).is_none());
    }

    #[test]
    fn test_cast_completion_and_reconcile() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        host.begin_cast(2.0);
        engine.on_cast_begin(3577);
        host.advance(1.0);
        assert!(engine.on_tick(&mut host, 1.0).is_none());
        host.advance(1.0);
        let pending = engine.on_tick(&mut host, 1.0).unwrap();

        assert_eq!(pending.action_id, 3577);
        assert!((host.lock() - DEFAULT_CAST_TAX).abs() < 1e-12);
        assert_eq!(engine.owner(), LockOwner::CastPredictor);

        // General prediction cannot take over while the cast owns the field
        host.set_lock(IDLE_LOCK);
        let event = host.begin_dispatch(1, 9);
        assert_eq!(
            engine.on_dispatch(&mut host, event),
            DispatchOutcome::Skipped(SkipReason::OwnedByCast)
        );

        let mut event = response(host.current_sequence(), 3577, 0.04, 0.1);
        event.completes_cast = true;
        match engine.on_response(&mut host, event) {
            ResponseOutcome::CastReconciled { adjusted, written } => {
                assert!((adjusted - 0.14).abs() < 1e-12);
                assert!(written);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.owner(), LockOwner::Unowned);
        let diag = engine.diagnostics();
        assert_eq!(diag.last_predicted_cast_lock, Some(DEFAULT_CAST_TAX));
        assert_eq!(diag.last_actual_cast_lock, Some(0.1));
        assert!(engine.database().is_empty());
    }

    #[test]
    fn test_burst_weight_applied() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        engine.on_response(&mut host, response(1, 1, 0.3, 0.5));
        let baseline = engine.rtt().smoothed_rtt().unwrap();

        let mut bursty = CorrectionEngine::default();
        bursty.on_response(&mut host, response(1, 1, 0.3, 0.5));
        let mut calm = CorrectionEngine::default();
        calm.on_response(&mut host, response(1, 1, 0.3, 0.5));
        for _ in 0..4 {
            bursty.on_packet_sent(PacketEvent::default());
        }
        bursty.on_response(&mut host, response(2, 1, 0.1, 0.6));
        calm.on_response(&mut host, response(2, 1, 0.1, 0.6));

        let bursty_move = bursty.rtt().smoothed_rtt().unwrap() - baseline;
        let calm_move = calm.rtt().smoothed_rtt().unwrap() - baseline;
        assert!(bursty_move > 0.0);
        assert!(bursty_move < calm_move);
    }

    #[test]
    fn test_dry_run_never_writes() {
        let mut host = MockLockHost::new();
        host.expect_current_lock().return_const(IDLE_LOCK);
        host.expect_current_sequence().return_const(1u16);
        host.expect_is_pvp().return_const(false);
        host.expect_cast_timing().return_const(None::<CastTiming>);
        host.expect_resolve_action().returning(|_, id| id);
        host.expect_set_current_lock().never();

        let mut engine = CorrectionEngine::new(EngineConfig {
            dry_run: true,
            ..EngineConfig::default()
        });

        let outcome = engine.on_dispatch(
            &mut host,
            DispatchEvent {
                action_type: 1,
                action_id: 100,
                sequence: 1,
            },
        );
        assert!(matches!(outcome, DispatchOutcome::Predicted { written: false, .. }));

        let outcome = engine.on_response(&mut host, response(1, 100, 0.2, 0.5));
        assert!(matches!(outcome, ResponseOutcome::Corrected { written: false, .. }));
        assert_eq!(engine.database().len(), 1);
        assert!(engine.rtt().is_initialized());
    }

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let mut host = MockLockHost::new();
        host.expect_current_sequence().return_const(1u16);
        host.expect_is_pvp().return_const(false);
        host.expect_set_current_lock()
            .returning(|_| Err(HostError::Unavailable));

        let mut engine = CorrectionEngine::default();
        let outcome = engine.on_response(&mut host, response(1, 100, 0.2, 0.5));

        assert_eq!(outcome, ResponseOutcome::Failed);
        assert!(engine.database().is_empty());
        assert!(!engine.rtt().is_initialized());
        assert_eq!(engine.floor().count(), 0);
        assert_eq!(engine.stats().errors, 1);
        assert_eq!(engine.stats().actions_corrected, 0);
    }

    #[test]
    fn test_ceiling_blocks_write() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        let outcome = engine.on_response(&mut host, response(1, 100, 0.2, 12.0));

        assert!(matches!(outcome, ResponseOutcome::Corrected { written: false, .. }));
        assert!(host.writes().is_empty());
        assert_eq!(engine.stats().actions_corrected, 1);
        assert_eq!(engine.stats().total_time_saved, 0.0);
    }

    #[test]
    fn test_unflagged_cast_reply_releases_ownership() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        complete_cast(&mut host, &mut engine, 3577);

        let reply = host.receive(ServerReply::new(3577, 0.6));
        assert!(matches!(
            engine.on_response(&mut host, reply),
            ResponseOutcome::Corrected { written: true, .. }
        ));
        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert!(engine.pending_cast().is_none());
        assert_eq!(engine.stats().casts_reconciled, 0);

        for _ in 0..5 {
            host.advance(10.0);
            assert!(matches!(
                dispatch(&mut host, &mut engine, 9),
                DispatchOutcome::Predicted { written: true, .. }
            ));
        }
    }

    #[test]
    fn test_unflagged_mismatch_releases_ownership() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        complete_cast(&mut host, &mut engine, 3577);

        let mut reply = ServerReply::new(3577, 0.6);
        reply.header_lock = Some(0.7);
        let reply = host.receive(reply);
        assert_eq!(engine.on_response(&mut host, reply), ResponseOutcome::Mismatch);
        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert!(engine.pending_cast().is_none());
    }

    #[test]
    fn test_reset_network_releases_cast() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        complete_cast(&mut host, &mut engine, 3577);

        engine.reset_network();
        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert!(engine.pending_cast().is_none());

        host.advance(1.0);
        assert!(matches!(
            dispatch(&mut host, &mut engine, 9),
            DispatchOutcome::Predicted { written: true, .. }
        ));
    }

    #[test]
    fn test_pending_cast_expires_without_response() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        complete_cast(&mut host, &mut engine, 3577);

        assert!(engine.on_tick(&mut host, 1.0).is_none());
        assert_eq!(engine.owner(), LockOwner::CastPredictor);
        assert!(engine.on_tick(&mut host, 1.0).is_none());
        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert!(engine.pending_cast().is_none());

        // A late flagged reply has nothing to reconcile and is learned normally
        let mut reply = ServerReply::new(3577, 0.6);
        reply.completes_cast = true;
        let reply = host.receive(reply);
        assert!(matches!(
            engine.on_response(&mut host, reply),
            ResponseOutcome::Corrected { .. }
        ));
        assert_eq!(engine.stats().casts_reconciled, 0);
    }

    #[test]
    fn test_new_cast_supersedes_pending_cast() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();
        complete_cast(&mut host, &mut engine, 3577);

        engine.on_cast_begin(3578);
        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert!(engine.pending_cast().is_none());
        assert_eq!(engine.diagnostics().cast_state, CastState::Casting { action_id: 3578 });
    }

    #[test]
    fn test_general_response_while_cast_owns_lock() {
        let mut host = SimulatedHost::new();
        let mut engine = CorrectionEngine::default();

        dispatch(&mut host, &mut engine, 5);
        let seq = host.current_sequence();
        assert_eq!(engine.owner(), LockOwner::General(seq));

        // The cast predictor takes the field from the outstanding prediction
        complete_cast(&mut host, &mut engine, 3577);
        assert_eq!(host.writes().len(), 2);
        assert!((host.lock() - DEFAULT_CAST_TAX).abs() < 1e-12);

        // The older prediction's response still teaches the models
        let outcome = engine.on_response(&mut host, response(seq, 5, 0.2, 0.5));
        assert!(matches!(outcome, ResponseOutcome::Corrected { written: false, .. }));
        assert_eq!(host.writes().len(), 2);
        assert!((host.lock() - DEFAULT_CAST_TAX).abs() < 1e-12);
        assert_eq!(engine.database().entry(5, LockContext::PvE).unwrap().sample_count, 1);
        assert!(engine.rtt().is_initialized());
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.stats().total_time_saved, 0.0);
        assert_eq!(engine.owner(), LockOwner::CastPredictor);
        assert!(engine.pending_cast().is_some());

        let mut event = response(seq, 3577, 0.04, 0.1);
        event.completes_cast = true;
        assert!(matches!(
            engine.on_response(&mut host, event),
            ResponseOutcome::CastReconciled { written: true, .. }
        ));
        assert_eq!(engine.owner(), LockOwner::Unowned);
    }

    #[test]
    fn test_failed_cast_tax_write_takes_nothing() {
        let mut host = MockLockHost::new();
        host.expect_cast_timing().return_const(Some(CastTiming {
            elapsed: 1.0,
            total: 1.0,
        }));
        host.expect_set_current_lock()
            .times(1)
            .returning(|_| Err(HostError::Unavailable));

        let mut engine = CorrectionEngine::default();
        engine.on_cast_begin(3577);
        assert!(engine.on_tick(&mut host, 0.016).is_none());

        assert_eq!(engine.owner(), LockOwner::Unowned);
        assert!(engine.pending_cast().is_none());
        assert_eq!(engine.diagnostics().cast_state, CastState::Idle);
        assert_eq!(engine.stats().errors, 1);
    }

    #[test]
    fn test_import_database_through_engine() {
        let mut engine = CorrectionEngine::default();
        engine.database_mut().record_lock(1, LockContext::PvE, 0.6);

        let entry = LockEntry {
            mean_lock: 0.6,
            sample_count: 3,
        };
        let mut snapshot = BTreeMap::new();
        snapshot.insert("bad".to_string(), entry);
        assert!(matches!(
            engine.import_database(&snapshot),
            Err(EngineError::Database(DatabaseError::InvalidKey(_)))
        ));
        assert!(engine.database().entry(1, LockContext::PvE).is_some());

        snapshot.clear();
        snapshot.insert("2:pvp".to_string(), entry);
        assert_eq!(engine.import_database(&snapshot).unwrap(), 1);
        assert!(engine.database().entry(2, LockContext::PvP).is_some());
        assert!(engine.database().entry(1, LockContext::PvE).is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut engine = CorrectionEngine::default();
        let mut config = EngineConfig::default();
        config.rtt.alpha = 0.0;
        assert!(engine.apply_config(config).is_err());

        config = EngineConfig::default();
        config.interference.band_low_ms = 0.8;
        config.interference.band_high_ms = 0.2;
        assert!(engine.apply_config(config).is_err());

        config = EngineConfig::default();
        config.floor.scaling_factor = 0.5;
        assert!(engine.apply_config(config).is_ok());
        assert_eq!(engine.floor().scaling_factor(), 0.5);
    }
}
