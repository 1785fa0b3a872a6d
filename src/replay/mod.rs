//! Trace replay
//!
//! Drives a [`CorrectionEngine`] against a [`SimulatedHost`] from a recorded
//! or hand-written JSON trace, so the engine can be exercised end to end
//! without a live game client.
//!
//! # Trace Format
//!
//! ```json
//! [
//!   { "event": "dispatch", "action_type": 1, "action_id": 100 },
//!   { "event": "tick", "dt": 0.016 },
//!   { "event": "response", "action_id": 100, "new_lock": 0.5 },
//!   { "event": "cast_begin", "action_id": 3577, "cast_time": 2.5 },
//!   { "event": "set_pvp", "pvp": true }
//! ]
//! ```
//!
//! `dispatch` assigns the next sequence token, starts the host's idle lock,
//! emits one outgoing packet and then notifies the engine. `response` reads
//! the remaining lock as `old_lock`, applies `new_lock` the way the game
//! would, then notifies the engine.

mod host;

pub use host::{ServerReply, SimulatedHost};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::database::LockEntry;
use crate::engine::{CorrectionEngine, Diagnostics, DispatchOutcome, ResponseOutcome};
use crate::estimator::PacketEvent;

/// Opcode recorded for the packet a dispatch emits
const ACTION_OPCODE: u16 = 0x0196;

/// One scripted host event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Let time pass
    Tick {
        /// Seconds
        dt: f64,
    },
    /// Use an action
    Dispatch {
        /// Host action category
        #[serde(default = "default_action_type")]
        action_type: u8,
        /// Raw action identifier
        action_id: u32,
    },
    /// An unrelated outgoing packet
    Packet {
        /// Raw opcode
        #[serde(default)]
        opcode: u16,
    },
    /// Server lock reply
    Response {
        /// Sequence answered (defaults to the current one)
        #[serde(default)]
        sequence: Option<u16>,
        /// Action attributed
        action_id: u32,
        /// Server lock (seconds)
        new_lock: f64,
        /// Header lock (defaults to `new_lock`)
        #[serde(default)]
        header_lock: Option<f64>,
        /// Local actor flag
        #[serde(default = "default_true")]
        local: bool,
        /// Answers a completed cast
        #[serde(default)]
        completes_cast: bool,
    },
    /// A cast bar starts
    CastBegin {
        /// Action being cast
        action_id: u32,
        /// Cast time (seconds)
        cast_time: f64,
    },
    /// The cast bar is interrupted
    CastInterrupt,
    /// Switch content type
    SetPvp {
        /// Competitive content
        pvp: bool,
    },
    /// Leave interference mode
    ClearInterference,
}

fn default_action_type() -> u8 {
    1
}
fn default_true() -> bool {
    true
}

/// Load a JSON trace from disk
pub fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TraceEvent>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file: {}", path.display()))?;
    parse_trace(&content).with_context(|| format!("Failed to parse trace file: {}", path.display()))
}

/// Parse a JSON trace
pub fn parse_trace(json: &str) -> Result<Vec<TraceEvent>> {
    serde_json::from_str(json).context("Invalid trace JSON")
}

/// Outcome of a replay run
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// Events processed
    pub events: usize,
    /// Dispatches that produced a written prediction
    pub predictions_written: usize,
    /// Dispatches skipped or failed
    pub predictions_skipped: usize,
    /// Outcome counts by kind
    pub responses: BTreeMap<String, usize>,
    /// Engine writes observed by the host
    pub host_writes: usize,
    /// Host lock at the end of the trace (seconds)
    pub final_lock: f64,
    /// Engine diagnostics at the end of the trace
    pub diagnostics: Diagnostics,
    /// Lock database export
    pub database: BTreeMap<String, LockEntry>,
}

/// Runs traces against an engine
pub struct Replayer {
    engine: CorrectionEngine,
    host: SimulatedHost,
}

impl Replayer {
    /// Create a replayer around an engine and a fresh host
    pub fn new(engine: CorrectionEngine) -> Self {
        Self {
            engine,
            host: SimulatedHost::new(),
        }
    }

    /// Engine under test
    pub fn engine(&self) -> &CorrectionEngine {
        &self.engine
    }

    /// Simulated host
    pub fn host(&self) -> &SimulatedHost {
        &self.host
    }

    /// Consume the replayer, returning the engine
    pub fn into_engine(self) -> CorrectionEngine {
        self.engine
    }

    /// Replay every event in order
    pub fn run(&mut self, trace: &[TraceEvent]) -> ReplayReport {
        let mut predictions_written = 0;
        let mut predictions_skipped = 0;
        let mut responses: BTreeMap<String, usize> = BTreeMap::new();

        for event in trace {
            match event {
                TraceEvent::Tick { dt } => {
                    self.host.advance(*dt);
                    self.engine.on_tick(&mut self.host, *dt);
                    self.host.finish_cast_if_complete();
                }
                TraceEvent::Dispatch {
                    action_type,
                    action_id,
                } => {
                    let dispatch = self.host.begin_dispatch(*action_type, *action_id);
                    self.engine.on_packet_sent(PacketEvent {
                        opcode: ACTION_OPCODE,
                    });
                    match self.engine.on_dispatch(&mut self.host, dispatch) {
                        DispatchOutcome::Predicted { written: true, .. } => {
                            predictions_written += 1
                        }
                        DispatchOutcome::Predicted { written: false, .. } => {}
                        DispatchOutcome::Skipped(_) | DispatchOutcome::Failed => {
                            predictions_skipped += 1
                        }
                    }
                }
                TraceEvent::Packet { opcode } => {
                    self.engine.on_packet_sent(PacketEvent { opcode: *opcode });
                }
                TraceEvent::Response {
                    sequence,
                    action_id,
                    new_lock,
                    header_lock,
                    local,
                    completes_cast,
                } => {
                    let response = self.host.receive(ServerReply {
                        sequence: *sequence,
                        action_id: *action_id,
                        new_lock: *new_lock,
                        header_lock: *header_lock,
                        local_actor: *local,
                        completes_cast: *completes_cast,
                    });
                    let outcome = self.engine.on_response(&mut self.host, response);
                    debug!("Replay response seq={}: {:?}", response.source_sequence, outcome);
                    *responses.entry(outcome_name(&outcome).to_string()).or_insert(0) += 1;
                }
                TraceEvent::CastBegin {
                    action_id,
                    cast_time,
                } => {
                    self.host.begin_cast(*cast_time);
                    self.engine.on_cast_begin(*action_id);
                }
                TraceEvent::CastInterrupt => {
                    self.host.interrupt_cast();
                    self.engine.on_cast_interrupt();
                }
                TraceEvent::SetPvp { pvp } => self.host.set_pvp(*pvp),
                TraceEvent::ClearInterference => self.engine.clear_interference(),
            }
        }

        info!(
            "Replayed {} events: {} predictions written, {} host writes",
            trace.len(),
            predictions_written,
            self.host.writes().len()
        );

        ReplayReport {
            events: trace.len(),
            predictions_written,
            predictions_skipped,
            responses,
            host_writes: self.host.writes().len(),
            final_lock: self.host.lock(),
            diagnostics: self.engine.diagnostics(),
            database: self.engine.database().export(),
        }
    }
}

fn outcome_name(outcome: &ResponseOutcome) -> &'static str {
    match outcome {
        ResponseOutcome::Ignored => "ignored",
        ResponseOutcome::Mismatch => "mismatch",
        ResponseOutcome::CastReconciled { .. } => "cast_reconciled",
        ResponseOutcome::FastPath { .. } => "fast_path",
        ResponseOutcome::Corrected { .. } => "corrected",
        ResponseOutcome::Failed => "failed",
    }
}
