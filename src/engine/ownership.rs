//! Write-intent over the host's lock field
//!
//! Only one predictor may hold write-intent at a time. Priority is
//! `CastPredictor > General`: the cast predictor may take the field from a
//! general prediction, never the reverse.

use serde::Serialize;

/// Who currently intends to own the host lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "owner", content = "sequence", rename_all = "snake_case")]
pub enum LockOwner {
    /// Nobody has an outstanding prediction
    #[default]
    Unowned,
    /// The general pipeline predicted the action with this sequence token
    General(u16),
    /// A cast completion was pre-applied
    CastPredictor,
}

impl LockOwner {
    /// Whether a general prediction may take the field
    pub fn allows_general(&self) -> bool {
        !matches!(self, Self::CastPredictor)
    }

    /// Release general ownership if it belongs to `sequence` or if all
    /// general predictions were cleared
    pub fn release_general(&mut self, sequence: u16, cleared_all: bool) {
        if let Self::General(owned) = *self {
            if owned == sequence || cleared_all {
                *self = Self::Unowned;
            }
        }
    }

    /// Release cast ownership
    pub fn release_cast(&mut self) {
        if *self == Self::CastPredictor {
            *self = Self::Unowned;
        }
    }
}
