//! Third-party interference detection
//!
//! Server lock values are multiples of 10 ms. Another tool rewriting the
//! same field leaves a telltale sub-quantum remainder. A remainder inside the
//! configured band flags interference, which switches the engine to
//! observe-only until cleared.
//!
//! The band is a heuristic tuned to one known modifier; legitimate values
//! with odd rounding can trip it, so it is configurable and can be disabled.

use serde::{Deserialize, Serialize};

/// Server lock quantum (milliseconds)
pub const LOCK_QUANTUM_MS: f64 = 10.0;

/// Interference heuristic tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterferenceParams {
    /// Run the check at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower edge of the suspicious remainder band (ms, inclusive)
    #[serde(default = "default_band_low_ms")]
    pub band_low_ms: f64,

    /// Upper edge of the suspicious remainder band (ms, inclusive)
    #[serde(default = "default_band_high_ms")]
    pub band_high_ms: f64,
}

fn default_enabled() -> bool {
    true
}
fn default_band_low_ms() -> f64 {
    0.1
}
fn default_band_high_ms() -> f64 {
    0.9
}

impl Default for InterferenceParams {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            band_low_ms: default_band_low_ms(),
            band_high_ms: default_band_high_ms(),
        }
    }
}

impl InterferenceParams {
    /// Whether `lock` (seconds) carries the interference signature
    pub fn matches(&self, lock: f64) -> bool {
        if !self.enabled || !lock.is_finite() {
            return false;
        }
        let remainder = (lock * 1000.0).rem_euclid(LOCK_QUANTUM_MS);
        remainder >= self.band_low_ms && remainder <= self.band_high_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantized_values_pass() {
        let params = InterferenceParams::default();
        for lock in [0.5, 0.6, 0.64, 1.1, 2.15, 0.0] {
            assert!(!params.matches(lock), "{} flagged", lock);
        }
    }

    #[test]
    fn test_signature_detected() {
        let params = InterferenceParams::default();
        assert!(params.matches(0.5005));
        assert!(params.matches(0.6102));
    }

    #[test]
    fn test_disabled() {
        let params = InterferenceParams {
            enabled: false,
            ..InterferenceParams::default()
        };
        assert!(!params.matches(0.5005));
    }
}
