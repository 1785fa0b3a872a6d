//! RTT Estimator
//!
//! Smoothed round-trip time and RTT variance in the Jacobson/Karels style
//! (RFC 6298), extended with a per-sample trust weight.
//!
//! # Update Rule
//!
//! ```text
//! first sample:   srtt = s,  rttvar = s / 2
//! afterwards:     err    = s - srtt
//!                 srtt   = srtt + (α·w)·err
//!                 rttvar = (1 - β·w)·rttvar + (β·w)·|err|
//! ```
//!
//! The weight `w ∈ (0, 1]` scales both gains together, so a low-trust sample
//! moves the mean and the spread by less.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Lower bound on the smoothed RTT once initialized (seconds)
pub const MIN_SMOOTHED_RTT: f64 = 0.001;

/// Sentinel stored in `smoothed_rtt` before the first sample
const UNINITIALIZED: f64 = -1.0;

/// Tunables for the RTT estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttParams {
    /// Gain applied to the mean (0.0-1.0, RFC 6298 uses 1/8)
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Gain applied to the variance (0.0-1.0, RFC 6298 uses 1/4)
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Variance multiplier used for the safety buffer
    #[serde(default = "default_k")]
    pub k: f64,
}

fn default_alpha() -> f64 {
    0.125
}
fn default_beta() -> f64 {
    0.25
}
fn default_k() -> f64 {
    1.0
}

impl Default for RttParams {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            k: default_k(),
        }
    }
}

/// Weighted smoothed-RTT estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttEstimator {
    params: RttParams,
    /// Smoothed RTT in seconds, or the sentinel before the first sample
    smoothed_rtt: f64,
    /// RTT mean deviation in seconds
    rtt_variance: f64,
    /// Number of accepted samples since the last reset
    sample_count: u64,
}

impl RttEstimator {
    /// Create an uninitialized estimator
    pub fn new(params: RttParams) -> Self {
        Self {
            params,
            smoothed_rtt: UNINITIALIZED,
            rtt_variance: 0.0,
            sample_count: 0,
        }
    }

    /// Feed one RTT sample (seconds) with a trust weight in (0, 1]
    ///
    /// Non-positive or non-finite samples are discarded. The weight is
    /// clamped into (0, 1]; a non-finite weight counts as full trust.
    pub fn add_sample(&mut self, sample: f64, weight: f64) {
        if !sample.is_finite() || sample <= 0.0 {
            trace!("RttEstimator: discarding invalid sample {}", sample);
            return;
        }

        let weight = if weight.is_finite() && weight > 0.0 {
            weight.min(1.0)
        } else {
            1.0
        };

        if !self.is_initialized() {
            self.smoothed_rtt = sample;
            self.rtt_variance = sample / 2.0;
        } else {
            let err = sample - self.smoothed_rtt;
            let alpha = self.params.alpha * weight;
            let beta = self.params.beta * weight;
            self.smoothed_rtt += alpha * err;
            self.rtt_variance = (1.0 - beta) * self.rtt_variance + beta * err.abs();
        }

        self.smoothed_rtt = self.smoothed_rtt.max(MIN_SMOOTHED_RTT);
        self.rtt_variance = self.rtt_variance.max(0.0);
        self.sample_count += 1;

        trace!(
            "RttEstimator: sample={:.4}s w={:.2} -> srtt={:.4}s var={:.4}s",
            sample,
            weight,
            self.smoothed_rtt,
            self.rtt_variance
        );
    }

    /// Whether at least one valid sample has been accepted
    pub fn is_initialized(&self) -> bool {
        self.smoothed_rtt >= 0.0
    }

    /// Smoothed RTT in seconds (`None` before the first sample)
    pub fn smoothed_rtt(&self) -> Option<f64> {
        self.is_initialized().then_some(self.smoothed_rtt)
    }

    /// RTT variance in seconds
    pub fn rtt_variance(&self) -> f64 {
        self.rtt_variance
    }

    /// Accepted sample count
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// `srtt + k·rttvar`, or 0 when uninitialized
    pub fn predicted_buffer(&self) -> f64 {
        if self.is_initialized() {
            self.smoothed_rtt + self.params.k * self.rtt_variance
        } else {
            0.0
        }
    }

    /// `k·rttvar`, or 0 when uninitialized
    pub fn variance_buffer(&self) -> f64 {
        if self.is_initialized() {
            self.params.k * self.rtt_variance
        } else {
            0.0
        }
    }

    /// Current tunables
    pub fn params(&self) -> &RttParams {
        &self.params
    }

    /// Replace tunables; learned state is kept
    pub fn set_params(&mut self, params: RttParams) {
        self.params = params;
    }

    /// Return to the uninitialized state
    pub fn reset(&mut self) {
        self.smoothed_rtt = UNINITIALIZED;
        self.rtt_variance = 0.0;
        self.sample_count = 0;
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(RttParams::default())
    }
}
