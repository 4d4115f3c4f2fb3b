/// Storage-engine capability surface consumed by the execution core.
/// The core never discovers storage on its own: an engine implementing
/// `StorageEngine` is injected at construction and every request acquires
/// its own dataset through `acquire`, which releases it on drop.
pub mod record_store;
pub mod sampling;
pub mod memory;

pub use record_store::*;
pub use memory::*;

use crate::error::{AqeError, AqeResult, StorageResult};
use crate::query::Column;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One stored sales record
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub amount: f64,
    pub region: i32,
    pub product_id: i32,
    pub timestamp: i64,
}

impl Record {
    pub fn new(id: i64, amount: f64, region: i32, product_id: i32, timestamp: i64) -> Self {
        Self {
            id,
            amount,
            region,
            product_id,
            timestamp,
        }
    }

    /// Numeric value of a column
    pub fn value(&self, column: Column) -> f64 {
        match column {
            Column::Id => self.id as f64,
            Column::Amount => self.amount,
            Column::Region => self.region as f64,
            Column::ProductId => self.product_id as f64,
            Column::Timestamp => self.timestamp as f64,
        }
    }

    /// Grouping key of a column. Amounts are truncated toward zero.
    pub fn key(&self, column: Column) -> i64 {
        match column {
            Column::Id => self.id,
            Column::Amount => self.amount as i64,
            Column::Region => self.region as i64,
            Column::ProductId => self.product_id as i64,
            Column::Timestamp => self.timestamp,
        }
    }
}

/// Records returned by one sampling call. Never mutated after creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    records: Vec<Record>,
}

impl Sample {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Per-record values of one column, in sample order
    pub fn values(&self, column: Column) -> Vec<f64> {
        self.records.iter().map(|r| r.value(column)).collect()
    }
}

impl From<Vec<Record>> for Sample {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

/// Exact per-group totals over the full dataset
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub key: i64,
    pub count: usize,
    pub sum: f64,
}

/// Parameters of the CLT-validated dual-pointer scan
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DualPointerParams {
    pub sample_percent: f64,
    /// Column whose running mean decides convergence
    pub column: Column,
    pub confidence_level: f64,
    /// Samples collected between convergence checks
    pub check_interval: usize,
    pub thread_count: usize,
    /// Relative error (percent) at which the scan may stop early
    pub max_error_percent: f64,
}

/// An open dataset. Sampling primitives return uniform-probability samples of
/// `floor(total_records * percent / 100)` records (all records at >= 100%).
pub trait Dataset: Send + Sync {
    fn total_records(&self) -> usize;

    fn sum_column(&self, column: Column) -> f64;

    fn sum_amount(&self) -> f64 {
        self.sum_column(Column::Amount)
    }

    /// Exact count and sum of `target` (amount for `None`) per `group_by` key, ordered by key
    fn exact_group_stats(&self, target: Option<Column>, group_by: Column) -> Vec<GroupStats>;

    /// Linear scan with systematic selection
    fn sequential_sample(&self, percent: f64) -> Sample;

    /// Random offsets, no stride precomputation
    fn direct_access_sample(&self, percent: f64) -> Sample;

    /// Every k-th record starting at `offset % k`
    fn memory_stride_sample(&self, percent: f64, offset: usize) -> Sample;

    /// Evenly spread contiguous blocks
    fn block_sample(&self, percent: f64, block_size: usize) -> Sample;

    /// Incremental fast/slow pointer scan that stops once the running mean converges
    fn clt_validated_dual_pointer_sample(&self, params: &DualPointerParams) -> Sample;
}

impl<D: Dataset + ?Sized> Dataset for Arc<D> {
    fn total_records(&self) -> usize {
        (**self).total_records()
    }

    fn sum_column(&self, column: Column) -> f64 {
        (**self).sum_column(column)
    }

    fn exact_group_stats(&self, target: Option<Column>, group_by: Column) -> Vec<GroupStats> {
        (**self).exact_group_stats(target, group_by)
    }

    fn sequential_sample(&self, percent: f64) -> Sample {
        (**self).sequential_sample(percent)
    }

    fn direct_access_sample(&self, percent: f64) -> Sample {
        (**self).direct_access_sample(percent)
    }

    fn memory_stride_sample(&self, percent: f64, offset: usize) -> Sample {
        (**self).memory_stride_sample(percent, offset)
    }

    fn block_sample(&self, percent: f64, block_size: usize) -> Sample {
        (**self).block_sample(percent, block_size)
    }

    fn clt_validated_dual_pointer_sample(&self, params: &DualPointerParams) -> Sample {
        (**self).clt_validated_dual_pointer_sample(params)
    }
}

/// A storage engine able to open datasets by path
pub trait StorageEngine: Send + Sync {
    type Dataset: Dataset;

    /// Open an existing store
    fn open(&self, path: &Path) -> StorageResult<Self::Dataset>;

    /// Fallback used when `open` fails: build the dataset from a data file
    fn load_from_file(&self, path: &Path) -> StorageResult<Self::Dataset>;

    fn close(&self, dataset: Self::Dataset);
}

/// A dataset held for the duration of one request; closed when dropped
pub struct DatasetGuard<'a, S: StorageEngine + ?Sized> {
    storage: &'a S,
    dataset: Option<S::Dataset>,
    path: PathBuf,
}

impl<'a, S: StorageEngine + ?Sized> DatasetGuard<'a, S> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<'a, S: StorageEngine + ?Sized> Deref for DatasetGuard<'a, S> {
    type Target = S::Dataset;

    fn deref(&self) -> &S::Dataset {
        self.dataset
            .as_ref()
            .expect("dataset is only taken when the guard is dropped")
    }
}

impl<'a, S: StorageEngine + ?Sized> Drop for DatasetGuard<'a, S> {
    fn drop(&mut self) {
        if let Some(dataset) = self.dataset.take() {
            self.storage.close(dataset);
            tracing::trace!("Closed dataset {}", self.path.display());
        }
    }
}

/// Open a dataset for one request: native open first, then load-from-file.
/// Fails with `DatasetUnavailable` when both fail.
pub fn acquire<'a, S: StorageEngine + ?Sized>(
    storage: &'a S,
    path: &Path,
) -> AqeResult<DatasetGuard<'a, S>> {
    let dataset = match storage.open(path) {
        Ok(dataset) => dataset,
        Err(open_error) => {
            tracing::debug!(
                "Open failed for {} ({}), trying load from file",
                path.display(),
                open_error
            );
            storage
                .load_from_file(path)
                .map_err(|load_error| AqeError::DatasetUnavailable {
                    path: path.to_path_buf(),
                    open_error: open_error.to_string(),
                    load_error: load_error.to_string(),
                })?
        }
    };

    Ok(DatasetGuard {
        storage,
        dataset: Some(dataset),
        path: path.to_path_buf(),
    })
}

/// Number of records a `percent` request should return
pub fn target_count(total: usize, percent: f64) -> usize {
    if !(percent > 0.0) {
        0
    } else if percent >= 100.0 {
        total
    } else {
        ((total as f64) * percent / 100.0).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_count_bounds() {
        assert_eq!(target_count(1000, 10.0), 100);
        assert_eq!(target_count(1000, 0.0), 0);
        assert_eq!(target_count(1000, -5.0), 0);
        assert_eq!(target_count(1000, 150.0), 1000);
        assert_eq!(target_count(9, 10.0), 0);
        assert_eq!(target_count(1000, f64::NAN), 0);
    }

    #[test]
    fn test_acquire_falls_back_then_closes() {
        let storage = MemoryStorage::new();
        let records = (0..10).map(|i| Record::new(i, 1.0, 0, 0, i)).collect();
        storage.register_loadable("fallback.csv", RecordStore::from_records("sales", records));

        {
            let dataset = acquire(&storage, Path::new("fallback.csv")).unwrap();
            assert_eq!(dataset.total_records(), 10);
            assert_eq!(storage.open_count(), 1);
        }
        assert_eq!(storage.close_count(), 1);
    }

    #[test]
    fn test_acquire_reports_both_failures() {
        let storage = MemoryStorage::new();
        let err = acquire(&storage, Path::new("nowhere.db")).err().unwrap();
        match err {
            AqeError::DatasetUnavailable { path, open_error, load_error } => {
                assert_eq!(path, PathBuf::from("nowhere.db"));
                assert!(open_error.contains("nowhere.db"));
                assert!(load_error.contains("nowhere.db"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(storage.close_count(), 0);
    }

    #[test]
    fn test_record_value_and_key() {
        let record = Record::new(7, 12.75, 3, 42, 1_700_000_000);
        assert_eq!(record.value(Column::Amount), 12.75);
        assert_eq!(record.key(Column::Region), 3);
        assert_eq!(record.key(Column::Amount), 12);
    }
}
