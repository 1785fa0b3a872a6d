//! Utility Functions
//!
//! User-friendly error formatting for the replay binary.
//!
//! ## Error Formatting
//!
//! The [`errors`] module provides user-friendly error messages:
//!
//! ```rust
//! use action_lock_engine::utils::format_user_error;
//!
//! let error = anyhow::anyhow!("Failed to parse config file");
//! let message = format_user_error(&error);
//! assert!(message.contains("Configuration Error"));
//! ```
//!
//! Error categories with context-aware help:
//! - Config errors → Syntax validation, allowed ranges
//! - Trace errors → File paths, event tags
//! - Database errors → Key format, entry validation

pub mod errors;

pub use errors::format_user_error;
