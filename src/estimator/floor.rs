//! Dynamic Floor Tracker
//!
//! Sliding-window minimum RTT and the latency floor derived from it. Below
//! the floor a round trip is already fast enough that no correction is
//! applied.
//!
//! ```text
//! count < 5:   floor = DEFAULT_FLOOR
//! otherwise:   floor = clamp(min(window) · scaling, MINIMUM_FLOOR, DEFAULT_FLOOR)
//! ```
//!
//! The adaptive floor only ever moves between the safety minimum and the
//! legacy fixed default.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use tracing::trace;

/// Legacy fixed floor and upper bound of the adaptive floor (seconds)
pub const DEFAULT_FLOOR: f64 = 0.040;

/// Safety lower bound of the adaptive floor (seconds)
pub const MINIMUM_FLOOR: f64 = 0.010;

/// Samples required before the floor adapts
pub const MIN_ADAPTIVE_SAMPLES: usize = 5;

/// Smallest accepted window capacity
pub const MIN_WINDOW_SIZE: usize = 10;

/// Tunables for the floor tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorParams {
    /// Window capacity in samples (minimum 10)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Multiplier applied to the window minimum (0.0-1.0]
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f64,
}

fn default_window_size() -> usize {
    100
}
fn default_scaling_factor() -> f64 {
    0.8
}

impl Default for FloorParams {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            scaling_factor: default_scaling_factor(),
        }
    }
}

/// Circular-buffer minimum tracker
#[derive(Debug, Clone)]
pub struct FloorTracker {
    samples: Vec<f64>,
    cursor: usize,
    count: usize,
    scaling_factor: f64,
    /// Cached window minimum; `None` means dirty
    cached_min: Cell<Option<f64>>,
}

impl FloorTracker {
    /// Create an empty tracker
    pub fn new(params: FloorParams) -> Self {
        let capacity = params.window_size.max(MIN_WINDOW_SIZE);
        Self {
            samples: vec![0.0; capacity],
            cursor: 0,
            count: 0,
            scaling_factor: sanitize_scaling(params.scaling_factor),
            cached_min: Cell::new(None),
        }
    }

    /// Record an RTT sample (seconds); non-positive or non-finite values are ignored
    pub fn add_sample(&mut self, rtt: f64) {
        if !rtt.is_finite() || rtt <= 0.0 {
            return;
        }

        let capacity = self.samples.len();
        self.samples[self.cursor] = rtt;
        self.cursor = (self.cursor + 1) % capacity;
        self.count = (self.count + 1).min(capacity);
        self.cached_min.set(None);

        trace!("FloorTracker: rtt={:.4}s count={}", rtt, self.count);
    }

    /// Minimum RTT over the filled window (`None` when empty)
    pub fn min_rtt(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        if let Some(min) = self.cached_min.get() {
            return Some(min);
        }

        let min = self.samples[..self.count]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        self.cached_min.set(Some(min));
        Some(min)
    }

    /// Current floor in seconds
    pub fn floor(&self) -> f64 {
        if self.count < MIN_ADAPTIVE_SAMPLES {
            return DEFAULT_FLOOR;
        }
        match self.min_rtt() {
            Some(min) => (min * self.scaling_factor).clamp(MINIMUM_FLOOR, DEFAULT_FLOOR),
            None => DEFAULT_FLOOR,
        }
    }

    /// Filled sample count
    pub fn count(&self) -> usize {
        self.count
    }

    /// Window capacity
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Current scaling factor
    pub fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }

    /// Apply new tunables
    ///
    /// A capacity change discards the window; a scaling change keeps it.
    pub fn set_params(&mut self, params: FloorParams) {
        self.scaling_factor = sanitize_scaling(params.scaling_factor);
        let capacity = params.window_size.max(MIN_WINDOW_SIZE);
        if capacity != self.samples.len() {
            self.samples = vec![0.0; capacity];
            self.reset();
        }
    }

    /// Clear the window
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.count = 0;
        self.cached_min.set(None);
    }
}

impl Default for FloorTracker {
    fn default() -> Self {
        Self::new(FloorParams::default())
    }
}

fn sanitize_scaling(scaling: f64) -> f64 {
    if scaling.is_finite() && scaling > 0.0 {
        scaling.min(1.0)
    } else {
        default_scaling_factor()
    }
}
