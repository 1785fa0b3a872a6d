//! Lock Database
//!
//! Learned lock duration per `(action, context)` key. Each entry keeps an
//! incremental mean and a capped sample count; confidence is derived from the
//! count and gates whether the learned value is trusted over the caller's
//! default.
//!
//! # Update Rule
//!
//! ```text
//! first observation:      mean = v, n = 1
//! |v - mean| <= 1e-4:     n = min(n + 1, 1000)
//! otherwise:              n = min(n + 1, 1000); mean += (v - mean) / n
//! confidence = min(n / 10, 1.0)
//! ```
//!
//! Capping `n` keeps the step size from decaying toward zero, so the mean can
//! still follow a balance change within a bounded number of samples.
//!
//! # Persistence
//!
//! The database itself never touches disk. [`LockDatabase::export`] and
//! [`LockDatabase::import`] hand an opaque `"{action_id}:{pve|pvp}"` keyed
//! map to whoever owns persistence.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

/// Sample count cap
pub const MAX_SAMPLE_COUNT: u32 = 1000;

/// Samples needed for full confidence
pub const FULL_CONFIDENCE_SAMPLES: u32 = 10;

/// Confidence below which the learned value is not used
pub const MIN_TRUSTED_CONFIDENCE: f64 = 0.3;

/// Confidence reported as "confident" to diagnostics
pub const HIGH_CONFIDENCE: f64 = 0.5;

/// Learned values below this are treated as corrupt (seconds)
pub const MIN_VALID_LOCK: f64 = 0.5;

/// Observations this close to the mean only bump the count
pub const MATCH_TOLERANCE: f64 = 1e-4;

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Database error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatabaseError {
    /// Composite key did not parse
    #[error("Invalid lock key: {0}")]
    InvalidKey(String),

    /// Entry failed validation during import
    #[error("Invalid entry for {key}: {reason}")]
    InvalidEntry {
        /// Offending key
        key: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Partition under which locks are learned separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LockContext {
    /// Cooperative content
    #[serde(rename = "pve")]
    PvE,
    /// Competitive content
    #[serde(rename = "pvp")]
    PvP,
}

impl LockContext {
    /// Select the partition from the host's PvP flag
    pub fn from_pvp(is_pvp: bool) -> Self {
        if is_pvp {
            Self::PvP
        } else {
            Self::PvE
        }
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PvE => write!(f, "pve"),
            Self::PvP => write!(f, "pvp"),
        }
    }
}

impl FromStr for LockContext {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pve" => Ok(Self::PvE),
            "pvp" => Ok(Self::PvP),
            _ => Err(DatabaseError::InvalidKey(format!("unknown context '{}'", s))),
        }
    }
}

/// Database key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    /// Canonical action identifier
    pub action_id: u32,
    /// Partition
    pub context: LockContext,
}

impl LockKey {
    /// Create a key
    pub fn new(action_id: u32, context: LockContext) -> Self {
        Self { action_id, context }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action_id, self.context)
    }
}

impl FromStr for LockKey {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        let (id, context) = s
            .split_once(':')
            .ok_or_else(|| DatabaseError::InvalidKey(s.to_string()))?;
        let action_id = id
            .trim()
            .parse::<u32>()
            .map_err(|_| DatabaseError::InvalidKey(s.to_string()))?;
        Ok(Self {
            action_id,
            context: context.trim().parse()?,
        })
    }
}

/// Learned lock for one key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Incremental mean of observed locks (seconds)
    pub mean_lock: f64,
    /// Observations backing the mean, capped at [`MAX_SAMPLE_COUNT`]
    pub sample_count: u32,
}

impl LockEntry {
    /// `min(sample_count / 10, 1.0)`
    pub fn confidence(&self) -> f64 {
        (self.sample_count as f64 / FULL_CONFIDENCE_SAMPLES as f64).min(1.0)
    }

    /// Entry after observing `value`, and whether the mean changed
    fn observe(&self, value: f64) -> (Self, bool) {
        let sample_count = (self.sample_count + 1).min(MAX_SAMPLE_COUNT);
        if (value - self.mean_lock).abs() <= MATCH_TOLERANCE {
            return (
                Self {
                    mean_lock: self.mean_lock,
                    sample_count,
                },
                false,
            );
        }

        let mean_lock = self.mean_lock + (value - self.mean_lock) / sample_count as f64;
        (
            Self {
                mean_lock,
                sample_count,
            },
            true,
        )
    }
}

/// A computed but not yet applied database update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedRecord {
    /// Key being updated
    pub key: LockKey,
    /// Entry that will be stored
    pub entry: LockEntry,
    /// Whether the stored mean changes
    pub changed: bool,
}

/// Learned per-action lock store
#[derive(Debug, Clone, Default)]
pub struct LockDatabase {
    entries: HashMap<LockKey, LockEntry>,
}

impl LockDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Learned lock, or `default_lock` when the entry is missing, implausibly
    /// small, or backed by too few samples
    pub fn get_lock(&self, action_id: u32, context: LockContext, default_lock: f64) -> f64 {
        match self.entries.get(&LockKey::new(action_id, context)) {
            Some(entry)
                if entry.mean_lock >= MIN_VALID_LOCK
                    && entry.confidence() >= MIN_TRUSTED_CONFIDENCE =>
            {
                entry.mean_lock
            }
            _ => default_lock,
        }
    }

    /// Compute the update for observing `value` without applying it
    ///
    /// Returns `None` for non-positive or non-finite values.
    pub fn stage_record(
        &self,
        action_id: u32,
        context: LockContext,
        value: f64,
    ) -> Option<StagedRecord> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }

        let key = LockKey::new(action_id, context);
        let (entry, changed) = match self.entries.get(&key) {
            Some(existing) => existing.observe(value),
            None => (
                LockEntry {
                    mean_lock: value,
                    sample_count: 1,
                },
                true,
            ),
        };
        Some(StagedRecord {
            key,
            entry,
            changed,
        })
    }

    /// Apply a staged update
    pub fn commit(&mut self, staged: StagedRecord) -> bool {
        trace!(
            "LockDatabase: {} -> mean={:.4}s n={}",
            staged.key,
            staged.entry.mean_lock,
            staged.entry.sample_count
        );
        self.entries.insert(staged.key, staged.entry);
        staged.changed
    }

    /// Observe a lock value; returns whether the stored mean changed
    pub fn record_lock(&mut self, action_id: u32, context: LockContext, value: f64) -> bool {
        match self.stage_record(action_id, context, value) {
            Some(staged) => self.commit(staged),
            None => false,
        }
    }

    /// Whether the key has at least [`HIGH_CONFIDENCE`]
    pub fn has_confident_entry(&self, action_id: u32, context: LockContext) -> bool {
        self.entries
            .get(&LockKey::new(action_id, context))
            .is_some_and(|e| e.confidence() >= HIGH_CONFIDENCE)
    }

    /// Raw entry for a key
    pub fn entry(&self, action_id: u32, context: LockContext) -> Option<&LockEntry> {
        self.entries.get(&LockKey::new(action_id, context))
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been learned
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot keyed by the canonical key string
    pub fn export(&self) -> BTreeMap<String, LockEntry> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    /// Replace the contents with a snapshot
    ///
    /// The whole snapshot is validated first; on error nothing changes.
    /// Sample counts above the cap are clamped.
    pub fn import(&mut self, snapshot: &BTreeMap<String, LockEntry>) -> Result<usize> {
        let mut entries = HashMap::with_capacity(snapshot.len());

        for (raw_key, entry) in snapshot {
            let key: LockKey = raw_key.parse()?;
            if !entry.mean_lock.is_finite() || entry.mean_lock <= 0.0 {
                return Err(DatabaseError::InvalidEntry {
                    key: raw_key.clone(),
                    reason: format!("mean_lock {} is not a positive finite value", entry.mean_lock),
                });
            }
            if entry.sample_count == 0 {
                return Err(DatabaseError::InvalidEntry {
                    key: raw_key.clone(),
                    reason: "sample_count is zero".to_string(),
                });
            }
            entries.insert(
                key,
                LockEntry {
                    mean_lock: entry.mean_lock,
                    sample_count: entry.sample_count.min(MAX_SAMPLE_COUNT),
                },
            );
        }

        let count = entries.len();
        self.entries = entries;
        debug!("LockDatabase: imported {} entries", count);
        Ok(count)
    }
}
