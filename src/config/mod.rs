//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables (via the CLI)
//! - CLI arguments
//!
//! Every section and field is optional; a missing value takes its default.
//!
//! ```toml
//! [estimator]
//! alpha = 0.125
//! beta = 0.25
//! k = 1.0
//!
//! [floor]
//! window_size = 100
//! scaling_factor = 0.8
//!
//! [correction]
//! dry_run = false
//!
//! [cast]
//! tax = 0.1
//!
//! [interference]
//! enabled = true
//! band_low_ms = 0.1
//! band_high_ms = 0.9
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod types;

pub use types::{CastConfig, CorrectionConfig, LoggingConfig};

use crate::engine::{EngineConfig, InterferenceParams};
use crate::estimator::{FloorParams, RttParams};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// RTT estimator tunables
    #[serde(default)]
    pub estimator: RttParams,
    /// Latency floor tunables
    #[serde(default)]
    pub floor: FloorParams,
    /// Correction pipeline
    #[serde(default)]
    pub correction: CorrectionConfig,
    /// Cast-completion predictor
    #[serde(default)]
    pub cast: CastConfig,
    /// Interference heuristic
    #[serde(default)]
    pub interference: InterferenceParams,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.engine_config()
            .validate()
            .context("Invalid config")?;

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid config: unknown log level {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, dry_run: bool) -> Self {
        if dry_run {
            self.correction.dry_run = true;
        }
        self
    }

    /// Snapshot consumed by the correction engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            rtt: self.estimator,
            floor: self.floor,
            dry_run: self.correction.dry_run,
            cast_tax: self.cast.tax,
            interference: self.interference,
        }
    }
}
