//! Concurrency-safe terminal-result storage.
//!
//! The store holds only *terminal* records: one per finished run, written
//! exactly once by that run's background worker. An absent entry means
//! "unknown or still running," never "failed." Reads hand out owned
//! clones so no caller can observe or cause a partial write.
//!
//! Storage is in-memory and run-scoped; nothing survives a restart.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use ensemble_core::records::RunRecord;

/// Storage failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A terminal record for this run already exists. Finalization is
    /// idempotent: the existing record is kept, never overwritten.
    #[error("run {0} already has a terminal record")]
    AlreadyFinalized(String),
}

/// Map from run identifier to terminal run record.
#[derive(Default)]
pub struct RunStore {
    inner: RwLock<HashMap<String, RunRecord>>,
}

impl RunStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a run's terminal record.
    ///
    /// Rejects a second insert for the same run id, keeping the first
    /// record intact.
    pub fn insert(&self, record: RunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.contains_key(&record.run_id) {
            return Err(StoreError::AlreadyFinalized(record.run_id));
        }
        let _ = inner.insert(record.run_id.clone(), record);
        Ok(())
    }

    /// Owned copy of a run's terminal record, if one exists.
    #[must_use]
    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.inner.read().get(run_id).cloned()
    }

    /// Snapshot of all known run identifiers.
    #[must_use]
    pub fn run_ids(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Number of stored terminal records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
