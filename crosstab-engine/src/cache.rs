//! Explicit dataset caching.
//!
//! The engine itself is pure; callers that tweak a configuration and
//! regenerate without re-shipping the underlying records park them in a
//! `DatasetCache`, keyed by the configuration id they belong to. The
//! mapping is explicit: nothing lands here unless `store` put it here,
//! and generating against an id that was never stored (or was
//! invalidated) is a hard [`PivotError::NoCachedData`].

use rustc_hash::FxHashMap;

use crate::config::PivotConfig;
use crate::engine;
use crate::error::PivotError;
use crate::result::PivotResult;
use crate::value::Record;

#[derive(Default)]
pub struct DatasetCache {
    datasets: FxHashMap<String, Vec<Record>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        DatasetCache::default()
    }

    /// Stores `records` under `id`, replacing any earlier dataset.
    pub fn store(&mut self, id: impl Into<String>, records: Vec<Record>) {
        let id = id.into();
        log::debug!("caching {} records under '{}'", records.len(), id);
        self.datasets.insert(id, records);
    }

    pub fn records(&self, id: &str) -> Option<&[Record]> {
        self.datasets.get(id).map(Vec::as_slice)
    }

    /// Generates the pivot for `config` against the dataset stored under
    /// `id`, or errors when no dataset is cached there.
    pub fn generate(&self, id: &str, config: &PivotConfig) -> Result<PivotResult, PivotError> {
        let records = self
            .datasets
            .get(id)
            .ok_or_else(|| PivotError::NoCachedData(id.to_string()))?;
        Ok(engine::generate(records, config))
    }

    /// Drops the dataset under `id`. Returns whether one was present.
    pub fn invalidate(&mut self, id: &str) -> bool {
        self.datasets.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.datasets.clear();
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
