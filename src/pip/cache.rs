//! Load-once cache of parsed boundary datasets.
//!
//! Each dataset path gets its own slot. The first caller for a path takes the
//! slot's load lock and parses the file; concurrent callers for the same path
//! wait on that lock and then reuse the result, while callers for other paths
//! are never blocked. A dataset is only published after it fully loads, so a
//! failed or abandoned load leaves the slot empty for the next caller.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use dashmap::DashMap;
use tracing::debug;

use super::dataset::{BoundaryDataset, DatasetSource};
use crate::error::Result;

#[derive(Default)]
struct CacheSlot {
    dataset: OnceLock<Arc<BoundaryDataset>>,
    loading: Mutex<()>,
}

/// Statistics for monitoring cache effectiveness.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Datasets parsed from disk
    pub loads: u64,
    /// Requests served from an already-loaded dataset
    pub hits: u64,
    /// Datasets currently held
    pub cached: usize,
}

#[derive(Default)]
pub struct DatasetCache {
    slots: DashMap<PathBuf, Arc<CacheSlot>>,
    loads: AtomicU64,
    hits: AtomicU64,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a dataset, parsing it on first use.
    pub fn get(&self, source: &DatasetSource) -> Result<Arc<BoundaryDataset>> {
        self.get_from(self.slot(source), source)
    }

    fn get_from(
        &self,
        mut slot: Arc<CacheSlot>,
        source: &DatasetSource,
    ) -> Result<Arc<BoundaryDataset>> {
        loop {
            if let Some(dataset) = slot.dataset.get() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(dataset));
            }

            // Only the loader for this path is serialized; the guard protects no data
            let guard = slot.loading.lock().unwrap_or_else(PoisonError::into_inner);

            // Someone else may have finished while we waited
            if let Some(dataset) = slot.dataset.get() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Reusing {} loaded by a concurrent caller", source.path.display());
                return Ok(Arc::clone(dataset));
            }

            // Slot was dropped by clear() while we waited; load through the live one
            if !self.is_current(source, &slot) {
                drop(guard);
                slot = self.slot(source);
                continue;
            }

            let dataset = Arc::new(BoundaryDataset::load(source.clone())?);
            self.loads.fetch_add(1, Ordering::Relaxed);
            let dataset = Arc::clone(slot.dataset.get_or_init(|| dataset));
            drop(guard);
            return Ok(dataset);
        }
    }

    fn slot(&self, source: &DatasetSource) -> Arc<CacheSlot> {
        if let Some(slot) = self.slots.get(&source.path) {
            return Arc::clone(&slot);
        }
        // Entry API avoids two racing callers installing different slots
        Arc::clone(&self.slots.entry(source.path.clone()).or_default())
    }

    fn is_current(&self, source: &DatasetSource, slot: &Arc<CacheSlot>) -> bool {
        self.slots
            .get(&source.path)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Drop every dataset. Callers holding an `Arc` keep their copy.
    ///
    /// A caller that picked up a slot before the clear and had not started
    /// parsing yet moves to the new slot, so the path is still parsed once.
    /// A parse already under way when `clear` runs finishes into the dropped
    /// slot and the next caller parses the file again.
    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn contains(&self, source: &DatasetSource) -> bool {
        self.slots
            .get(&source.path)
            .is_some_and(|slot| slot.dataset.get().is_some())
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            loads: self.loads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            cached: self
                .slots
                .iter()
                .filter(|slot| slot.dataset.get().is_some())
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_dataset(dir: &TempDir, name: &str) -> DatasetSource {
        let path = dir.path().join(name);
        let body = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"GID_0": "KEN", "COUNTRY": "Kenya"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[33.9, -4.7], [41.9, -4.7], [41.9, 5.0], [33.9, 5.0], [33.9, -4.7]]]
                }
            }]
        });
        std::fs::write(&path, serde_json::to_vec(&body).unwrap()).unwrap();
        DatasetSource::global(path)
    }

    #[test]
    fn test_second_get_reuses_dataset() {
        let dir = TempDir::new().unwrap();
        let source = write_dataset(&dir, "adm0.geojson");
        let cache = DatasetCache::new();

        let first = cache.get(&source).unwrap();
        let second = cache.get(&source).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                loads: 1,
                hits: 1,
                cached: 1
            }
        );
    }

    #[test]
    fn test_failed_load_is_not_published() {
        let dir = TempDir::new().unwrap();
        let source = DatasetSource::global(dir.path().join("late.geojson"));
        let cache = DatasetCache::new();

        assert!(cache.get(&source).is_err());
        assert!(!cache.contains(&source));

        // The file shows up later; the next caller loads it
        let written = write_dataset(&dir, "late.geojson");
        assert_eq!(written, source);
        assert!(cache.get(&source).is_ok());
        assert_eq!(cache.stats().loads, 1);
    }

    #[test]
    fn test_concurrent_cold_gets_parse_once() {
        let dir = TempDir::new().unwrap();
        let source = write_dataset(&dir, "adm0.geojson");
        let cache = DatasetCache::new();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| cache.get(&source).unwrap());
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 7);
    }

    #[test]
    fn test_clear_forces_reload() {
        let dir = TempDir::new().unwrap();
        let source = write_dataset(&dir, "adm0.geojson");
        let cache = DatasetCache::new();

        let before = cache.get(&source).unwrap();
        cache.clear();
        assert!(!cache.contains(&source));

        let after = cache.get(&source).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(cache.stats().loads, 2);
    }

    #[test]
    fn test_slot_taken_before_clear_does_not_parse_again() {
        let dir = TempDir::new().unwrap();
        let source = write_dataset(&dir, "adm0.geojson");
        let cache = DatasetCache::new();

        let stale = cache.slot(&source);
        cache.clear();

        let fresh = cache.get(&source).unwrap();
        let late = cache.get_from(stale, &source).unwrap();

        assert!(Arc::ptr_eq(&fresh, &late));
        assert_eq!(cache.stats().loads, 1);
    }

    #[test]
    fn test_slot_taken_before_clear_loads_into_live_slot() {
        let dir = TempDir::new().unwrap();
        let source = write_dataset(&dir, "adm0.geojson");
        let cache = DatasetCache::new();

        let stale = cache.slot(&source);
        cache.clear();

        cache.get_from(stale, &source).unwrap();
        assert!(cache.contains(&source));
        assert_eq!(cache.stats().loads, 1);
    }
}
