/// Exact executor: full reduction over every record. Baseline for comparisons.
use super::{EstimationResult, ExecutionRequest, SamplesUsed, Strategy};
use crate::error::{AqeError, AqeResult};
use crate::query::{AggregateFunction, Query};
use crate::storage::{acquire, Dataset, GroupStats, StorageEngine};
use std::time::Instant;

#[derive(Clone, Copy, Debug, Default)]
pub struct ExactExecutor;

impl ExactExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn execute<S: StorageEngine + ?Sized>(
        &self,
        storage: &S,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        let start = Instant::now();
        let dataset = acquire(storage, &request.db_path)?;
        let result = self.execute_on(&*dataset, &request.query)?;
        drop(dataset);
        Ok(result.with_execution_time(start.elapsed()))
    }

    pub fn execute_on<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        query: &Query,
    ) -> AqeResult<EstimationResult> {
        let total = dataset.total_records();
        let value = match query.function {
            AggregateFunction::Count => total as f64,
            AggregateFunction::Sum => dataset.sum_column(query.value_column()),
            AggregateFunction::Avg => {
                if total == 0 {
                    return Err(AqeError::empty_sample("full scan", 100.0));
                }
                dataset.sum_column(query.value_column()) / total as f64
            }
        };
        tracing::debug!("Exact {} over {} records = {}", query, total, value);

        Ok(EstimationResult::new(value, Strategy::Exact, "Exact (full scan)")
            .with_samples(SamplesUsed::new(total, total)))
    }
}

/// Exact aggregate of one group from its totals
pub fn exact_group_value(function: AggregateFunction, stats: &GroupStats) -> f64 {
    match function {
        AggregateFunction::Count => stats.count as f64,
        AggregateFunction::Sum => stats.sum,
        AggregateFunction::Avg if stats.count == 0 => 0.0,
        AggregateFunction::Avg => stats.sum / stats.count as f64,
    }
}
