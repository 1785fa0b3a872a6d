//! # action-lock-engine
//!
//! Adaptive action-lock correction for latency-bound game clients.
//!
//! When an action is used the client locks the player out of further actions
//! until the server answers with an authoritative lock. That answer arrives a
//! full round trip late, so the lock the player sees is inflated by network
//! latency. This crate measures the round trip for every action, learns the
//! real lock each action produces, and rewrites the client's lock so the
//! latency is paid once instead of twice.
//!
//! # Architecture
//!
//! ```text
//! action-lock-engine
//!   ├─> estimator   (RTT smoothing, latency floor, packet burst weighting)
//!   ├─> database    (learned per-action locks, PvE/PvP)
//!   ├─> engine      (predict → observe → correct, cast predictor, ownership)
//!   ├─> replay      (in-memory host + JSON trace runner)
//!   └─> config      (TOML configuration)
//! ```
//!
//! # Data Flow
//!
//! **Dispatch:** host → `on_dispatch` → database + floor → predicted lock → host
//!
//! **Response:** host → `on_response` → RTT + floor + estimator + database →
//! adjusted lock → host
//!
//! **Tick:** host → `on_tick` → burst window + cast completion → host
//!
//! # Example
//!
//! ```
//! use action_lock_engine::engine::CorrectionEngine;
//! use action_lock_engine::replay::{ServerReply, SimulatedHost};
//!
//! let mut host = SimulatedHost::new();
//! let mut engine = CorrectionEngine::default();
//!
//! let dispatch = host.begin_dispatch(1, 100);
//! engine.on_dispatch(&mut host, dispatch);
//! host.advance(0.1);
//! let response = host.receive(ServerReply::new(100, 0.5));
//! engine.on_response(&mut host, response);
//!
//! assert_eq!(engine.database().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration
pub mod config;

/// Learned lock storage
pub mod database;

/// Correction pipeline
pub mod engine;

/// Network estimators
pub mod estimator;

/// Trace replay against a simulated host
pub mod replay;

/// Utility functions
pub mod utils;
