/// In-memory storage engine
/// Serves shared `RecordStore`s by path and counts opens and closes, which
/// lets tests and benches check that every request releases its dataset.
use super::{RecordStore, StorageEngine};
use crate::error::{StorageError, StorageResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Datasets that `open` finds directly
    stores: Mutex<HashMap<PathBuf, Arc<RecordStore>>>,
    /// Datasets only reachable through `load_from_file`
    loadable: Mutex<HashMap<PathBuf, Arc<RecordStore>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage serving a single dataset at `path`
    pub fn with_store(path: impl Into<PathBuf>, store: RecordStore) -> Self {
        let storage = Self::new();
        storage.register(path, store);
        storage
    }

    pub fn register(&self, path: impl Into<PathBuf>, store: RecordStore) {
        self.stores
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), Arc::new(store));
    }

    pub fn register_loadable(&self, path: impl Into<PathBuf>, store: RecordStore) {
        self.loadable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), Arc::new(store));
    }

    /// Successful opens and loads so far
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Datasets currently held by requests
    pub fn outstanding(&self) -> usize {
        self.open_count().saturating_sub(self.close_count())
    }

    fn lookup(
        map: &Mutex<HashMap<PathBuf, Arc<RecordStore>>>,
        path: &Path,
    ) -> StorageResult<Arc<RecordStore>> {
        map.lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path))
    }
}

impl StorageEngine for MemoryStorage {
    type Dataset = Arc<RecordStore>;

    fn open(&self, path: &Path) -> StorageResult<Self::Dataset> {
        let store = Self::lookup(&self.stores, path)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(store)
    }

    fn load_from_file(&self, path: &Path) -> StorageResult<Self::Dataset> {
        let store = Self::lookup(&self.loadable, path)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(store)
    }

    fn close(&self, dataset: Self::Dataset) {
        drop(dataset);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
