//! Execution core against stub storage engines: error propagation and
//! dataset release on every exit path.

use approx_query_engine::execution::{
    AdaptiveValidator, CltExecutor, ExecutionParameters, ExecutionRequest, SamplingExecutor,
};
use approx_query_engine::query::{parse_query, Column};
use approx_query_engine::storage::{
    Dataset, DualPointerParams, GroupStats, Sample, StorageEngine,
};
use approx_query_engine::{
    ApproxQueryEngine, AqeError, ApproximationStatus, QueryOptions, StorageError, Strategy,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A dataset that claims records but never returns any
struct HollowDataset {
    total: usize,
}

impl Dataset for HollowDataset {
    fn total_records(&self) -> usize {
        self.total
    }

    fn sum_column(&self, _column: Column) -> f64 {
        0.0
    }

    fn exact_group_stats(&self, _target: Option<Column>, _group_by: Column) -> Vec<GroupStats> {
        Vec::new()
    }

    fn sequential_sample(&self, _percent: f64) -> Sample {
        Sample::default()
    }

    fn direct_access_sample(&self, _percent: f64) -> Sample {
        Sample::default()
    }

    fn memory_stride_sample(&self, _percent: f64, _offset: usize) -> Sample {
        Sample::default()
    }

    fn block_sample(&self, _percent: f64, _block_size: usize) -> Sample {
        Sample::default()
    }

    fn clt_validated_dual_pointer_sample(&self, _params: &DualPointerParams) -> Sample {
        Sample::default()
    }
}

#[derive(Default)]
struct HollowStorage {
    opened: AtomicUsize,
    closed: AtomicUsize,
    /// Fail `open` so only the file fallback can succeed
    open_fails: bool,
}

impl StorageEngine for HollowStorage {
    type Dataset = HollowDataset;

    fn open(&self, path: &Path) -> Result<HollowDataset, StorageError> {
        if self.open_fails {
            return Err(StorageError::not_found(path));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(HollowDataset { total: 1_000 })
    }

    fn load_from_file(&self, _path: &Path) -> Result<HollowDataset, StorageError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(HollowDataset { total: 1_000 })
    }

    fn close(&self, _dataset: HollowDataset) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Storage where nothing can be opened
struct MissingStorage;

impl StorageEngine for MissingStorage {
    type Dataset = HollowDataset;

    fn open(&self, path: &Path) -> Result<HollowDataset, StorageError> {
        Err(StorageError::not_found(path))
    }

    fn load_from_file(&self, path: &Path) -> Result<HollowDataset, StorageError> {
        Err(StorageError::corrupt(path, "no loader"))
    }

    fn close(&self, _dataset: HollowDataset) {}
}

fn request(sql: &str, strategy: Strategy, percent: f64) -> ExecutionRequest {
    ExecutionRequest::new(parse_query(sql).unwrap(), "hollow.db", strategy).with_parameters(
        ExecutionParameters {
            sample_percent: Some(percent),
            error_threshold: Some(2.0),
            ..ExecutionParameters::default()
        },
    )
}

#[test]
fn test_empty_sample_is_an_error_and_releases_dataset() {
    let storage = HollowStorage::default();
    let err = SamplingExecutor::default()
        .execute(&storage, &request("SELECT SUM(amount) FROM sales", Strategy::Random, 10.0))
        .unwrap_err();

    assert!(matches!(err, AqeError::EmptySample { percent, .. } if percent == 10.0));
    assert_eq!(storage.opened.load(Ordering::SeqCst), 1);
    assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_count_from_empty_sample_fails_loudly() {
    let storage = HollowStorage::default();
    let err = SamplingExecutor::default()
        .execute(&storage, &request("SELECT COUNT(*) FROM sales", Strategy::Block, 10.0))
        .unwrap_err();
    assert!(matches!(err, AqeError::EmptySample { .. }));
    assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_clt_empty_scan_releases_dataset() {
    let storage = HollowStorage {
        open_fails: true,
        ..HollowStorage::default()
    };
    let err = CltExecutor::default()
        .execute(&storage, &request("SELECT AVG(amount) FROM sales", Strategy::Clt, 10.0))
        .unwrap_err();
    assert!(matches!(err, AqeError::EmptySample { .. }));
    // opened through the file fallback
    assert_eq!(storage.opened.load(Ordering::SeqCst), 1);
    assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_adaptive_reports_error_status_without_value() {
    let storage = HollowStorage::default();
    let result = AdaptiveValidator::default()
        .run(&storage, &request("SELECT AVG(amount) FROM sales", Strategy::Adaptive, 10.0))
        .unwrap();
    assert_eq!(result.status(), ApproximationStatus::Error);
    assert_eq!(result.value(), None);
    assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_engine_propagates_unavailable_dataset() {
    let engine = ApproxQueryEngine::with_default_config(MissingStorage);
    let err = engine
        .execute("SELECT SUM(amount) FROM sales", "gone.db", &QueryOptions::default())
        .unwrap_err();
    match err {
        AqeError::DatasetUnavailable { open_error, load_error, .. } => {
            assert!(open_error.contains("gone.db"));
            assert!(load_error.contains("no loader"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_engine_releases_every_handle_on_failure() {
    let engine = ApproxQueryEngine::with_default_config(HollowStorage::default());
    let options = QueryOptions {
        sample_percent: Some(10.0),
        compare: true,
        ..QueryOptions::default()
    };
    assert!(engine
        .execute("SELECT SUM(amount) FROM sales", "hollow.db", &options)
        .is_err());

    let storage = engine.storage();
    // one handle to read the size, one for the sampling attempt
    assert_eq!(storage.opened.load(Ordering::SeqCst), 2);
    assert_eq!(storage.closed.load(Ordering::SeqCst), 2);
}
