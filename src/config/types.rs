//! Configuration type definitions

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_CAST_TAX;

/// Correction pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Compute corrections without writing them to the host
    #[serde(default)]
    pub dry_run: bool,
}

/// Cast-completion predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastConfig {
    /// Lock pre-applied when a cast bar completes locally (seconds)
    #[serde(default = "default_cast_tax")]
    pub tax: f64,
}

fn default_cast_tax() -> f64 {
    DEFAULT_CAST_TAX
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            tax: default_cast_tax(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
