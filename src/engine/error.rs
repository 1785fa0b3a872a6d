//! Engine Error Types
//!
//! No error here is fatal. The response handler logs whatever it gets and
//! treats the event as a no-op.

use thiserror::Error;

use super::host::HostError;
use crate::database::DatabaseError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Host capability failed
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Lock database rejected an operation
    #[error("Lock database error: {0}")]
    Database(#[from] DatabaseError),

    /// A derived quantity blew up
    #[error("Non-finite {what}: {value}")]
    NonFinite {
        /// Which quantity
        what: &'static str,
        /// Offending value
        value: f64,
    },

    /// Configuration snapshot out of range
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub(crate) fn non_finite(what: &'static str, value: f64) -> Self {
        Self::NonFinite { what, value }
    }
}
