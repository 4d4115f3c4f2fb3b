/// Record store backing the file storage engine
/// Records are kept sorted by id in fixed-capacity leaves (the leaf level of
/// a B+Tree); positional access is computed from (leaf, slot) offsets.
use super::{Dataset, DualPointerParams, GroupStats, Record, Sample, StorageEngine};
use crate::error::{StorageError, StorageResult};
use crate::query::Column;
use bincode::Options;
use fxhash::FxHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Records per leaf
pub const LEAF_CAPACITY: usize = 255;

/// Leading bytes of a native store file
const STORE_MAGIC: &[u8; 8] = b"AQESTOR1";

#[derive(Clone, Debug, Default)]
pub struct Leaf {
    records: Vec<Record>,
}

impl Leaf {
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

#[derive(Clone, Debug)]
pub struct RecordStore {
    table: String,
    leaves: Vec<Leaf>,
    total_records: usize,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    table: String,
    records: Vec<Record>,
}

impl RecordStore {
    /// Bulk load: sort by id and pack full leaves
    pub fn from_records(table: impl Into<String>, mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| r.id);
        let total_records = records.len();
        let leaves = records
            .chunks(LEAF_CAPACITY)
            .map(|chunk| Leaf {
                records: chunk.to_vec(),
            })
            .collect();

        Self {
            table: table.into(),
            leaves,
            total_records,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.total_records
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Record at a global position; every leaf but the last is full
    pub fn record_at(&self, index: usize) -> Option<&Record> {
        self.leaves
            .get(index / LEAF_CAPACITY)
            .and_then(|leaf| leaf.records.get(index % LEAF_CAPACITY))
    }

    /// Walk the leaf chain in id order
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.leaves.iter().flat_map(|leaf| leaf.records.iter())
    }

    pub fn all_records(&self) -> Vec<Record> {
        self.iter().copied().collect()
    }

    /// Write the native store format
    pub fn save(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(STORE_MAGIC)?;

        let file = StoreFile {
            table: self.table.clone(),
            records: self.all_records(),
        };
        bincode::DefaultOptions::new().serialize_into(&mut writer, &file)?;
        writer.flush()?;

        tracing::debug!(
            "Saved {} records of '{}' to {}",
            self.total_records,
            self.table,
            path.display()
        );
        Ok(())
    }

    /// Read the native store format
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::not_found(path));
        }

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| StorageError::corrupt(path, "file too short for a store header"))?;
        if &magic != STORE_MAGIC {
            return Err(StorageError::corrupt(path, "not a native store file"));
        }

        let stored: StoreFile = bincode::DefaultOptions::new()
            .with_limit(file_len)
            .deserialize_from(&mut reader)?;
        Ok(Self::from_records(stored.table, stored.records))
    }

    /// Import a CSV file with header `id,amount,region,product_id,timestamp`.
    /// The table is named after the file stem.
    pub fn import_csv(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::not_found(path));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let records = reader
            .deserialize::<Record>()
            .collect::<Result<Vec<_>, _>>()?;

        let table = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());

        tracing::debug!("Imported {} records from {}", records.len(), path.display());
        Ok(Self::from_records(table, records))
    }

    /// Write all records as CSV
    pub fn export_csv(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        for record in self.iter() {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Dataset for RecordStore {
    fn total_records(&self) -> usize {
        self.total_records
    }

    fn sum_column(&self, column: Column) -> f64 {
        self.leaves
            .par_iter()
            .map(|leaf| leaf.records.iter().map(|r| r.value(column)).sum::<f64>())
            .sum()
    }

    fn exact_group_stats(&self, target: Option<Column>, group_by: Column) -> Vec<GroupStats> {
        let target = target.unwrap_or(Column::Amount);
        let totals = self
            .leaves
            .par_iter()
            .fold(FxHashMap::<i64, (usize, f64)>::default, |mut acc, leaf| {
                for record in &leaf.records {
                    let entry = acc.entry(record.key(group_by)).or_insert((0, 0.0));
                    entry.0 += 1;
                    entry.1 += record.value(target);
                }
                acc
            })
            .reduce(FxHashMap::default, |mut left, right| {
                for (key, (count, sum)) in right {
                    let entry = left.entry(key).or_insert((0, 0.0));
                    entry.0 += count;
                    entry.1 += sum;
                }
                left
            });

        let mut stats: Vec<GroupStats> = totals
            .into_iter()
            .map(|(key, (count, sum))| GroupStats { key, count, sum })
            .collect();
        stats.sort_by_key(|s| s.key);
        stats
    }

    fn sequential_sample(&self, percent: f64) -> Sample {
        self.systematic_scan(percent)
    }

    fn direct_access_sample(&self, percent: f64) -> Sample {
        self.random_offsets(percent)
    }

    fn memory_stride_sample(&self, percent: f64, offset: usize) -> Sample {
        self.strided(percent, offset)
    }

    fn block_sample(&self, percent: f64, block_size: usize) -> Sample {
        self.blocks(percent, block_size)
    }

    fn clt_validated_dual_pointer_sample(&self, params: &DualPointerParams) -> Sample {
        self.dual_pointer_scan(params)
    }
}

/// Storage engine over native store files, with CSV import as the fallback
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStorageEngine;

impl FileStorageEngine {
    pub fn new() -> Self {
        Self
    }
}

impl StorageEngine for FileStorageEngine {
    type Dataset = RecordStore;

    fn open(&self, path: &Path) -> StorageResult<RecordStore> {
        RecordStore::open(path)
    }

    fn load_from_file(&self, path: &Path) -> StorageResult<RecordStore> {
        RecordStore::import_csv(path)
    }

    fn close(&self, dataset: RecordStore) {
        tracing::trace!("Releasing {} records of '{}'", dataset.len(), dataset.table());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::acquire;

    fn sample_store(n: i64) -> RecordStore {
        // Insert in reverse to exercise the id sort
        let records = (0..n)
            .rev()
            .map(|i| Record::new(i, (i % 10) as f64 * 10.0, (i % 3) as i32, (i % 7) as i32, i))
            .collect();
        RecordStore::from_records("sales", records)
    }

    #[test]
    fn test_leaves_are_packed_in_id_order() {
        let store = sample_store(600);
        assert_eq!(store.leaves().len(), 3);
        assert_eq!(store.leaves()[0].records().len(), LEAF_CAPACITY);
        assert_eq!(store.leaves()[2].records().len(), 600 - 2 * LEAF_CAPACITY);

        let ids: Vec<i64> = store.iter().map(|r| r.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.record_at(300).map(|r| r.id), Some(300));
        assert!(store.record_at(600).is_none());
    }

    #[test]
    fn test_exact_sums_and_groups() {
        let store = sample_store(30);
        // amounts cycle 0..90 step 10 three times
        assert_eq!(store.sum_amount(), 3.0 * 450.0);

        let groups = store.exact_group_stats(Some(Column::Amount), Column::Region);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), 30);
        assert_eq!(groups.iter().map(|g| g.sum).sum::<f64>(), store.sum_amount());
        assert!(groups.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn test_native_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.db");
        let store = sample_store(1000);
        store.save(&path).unwrap();

        let reopened = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.table(), "sales");
        assert_eq!(reopened.len(), 1000);
        assert_eq!(reopened.sum_amount(), store.sum_amount());
    }

    #[test]
    fn test_open_rejects_csv_and_engine_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        sample_store(50).export_csv(&path).unwrap();

        assert!(matches!(
            RecordStore::open(&path),
            Err(StorageError::Corrupt { .. })
        ));

        let engine = FileStorageEngine::new();
        let dataset = acquire(&engine, &path).unwrap();
        assert_eq!(dataset.total_records(), 50);
        assert_eq!(dataset.table(), "orders");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            RecordStore::open("/definitely/not/here.db"),
            Err(StorageError::NotFound { .. })
        ));
    }
}
