/// GROUP BY execution
/// Draws one sample with the request's strategy, partitions it by group key in
/// parallel and estimates every group with domain estimators.
use super::{
    classify_estimate, exact_group_value, tiered_sample, AdaptiveValidator,
    ApproximationStatus, CltExecutor, Estimate, EstimationResult, Estimator, ExecutionRequest,
    GroupedEstimationResult, SamplesUsed, SamplingExecutor, Strategy,
};
use crate::config::{check_percent, EngineConfig};
use crate::error::{AqeError, AqeResult};
use crate::query::Column;
use crate::storage::{acquire, Dataset, Sample, StorageEngine};
use fxhash::FxHashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

/// Run `f` on a pool of `threads` workers, or on the global pool if one cannot be built
fn with_pool<T: Send>(threads: usize, f: impl FnOnce() -> T + Send) -> T {
    match rayon::ThreadPoolBuilder::new().num_threads(threads.max(1)).build() {
        Ok(pool) => pool.install(f),
        Err(e) => {
            tracing::warn!("Could not build a {}-thread pool ({}), using global pool", threads, e);
            f()
        }
    }
}

/// Split sample values of `target` by `group_by` key
pub fn partition_sample(
    sample: &Sample,
    target: Column,
    group_by: Column,
) -> FxHashMap<i64, Vec<f64>> {
    sample
        .records()
        .par_iter()
        .fold(FxHashMap::<i64, Vec<f64>>::default, |mut acc, record| {
            acc.entry(record.key(group_by))
                .or_default()
                .push(record.value(target));
            acc
        })
        .reduce(FxHashMap::default, |mut left, right| {
            for (key, mut values) in right {
                left.entry(key).or_default().append(&mut values);
            }
            left
        })
}

#[derive(Clone, Debug, Default)]
pub struct GroupedExecutor {
    config: EngineConfig,
}

impl GroupedExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn execute<S: StorageEngine + ?Sized>(
        &self,
        storage: &S,
        request: &ExecutionRequest,
    ) -> AqeResult<GroupedEstimationResult> {
        let start = Instant::now();
        let dataset = acquire(storage, &request.db_path)?;
        let mut result = self.execute_on(&*dataset, request)?;
        drop(dataset);
        result.execution_time = start.elapsed();
        Ok(result)
    }

    pub fn execute_on<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<GroupedEstimationResult> {
        let group_by = request.query.group_by.ok_or_else(|| {
            AqeError::unsupported_query("grouped execution needs a GROUP BY column", request.query.to_string())
        })?;
        let threads = request.parameters.thread_count.max(1);

        with_pool(threads, || match request.strategy {
            Strategy::Exact => Ok(self.exact_groups(dataset, request, group_by)),
            _ => self.sampled_groups(dataset, request, group_by, threads),
        })
    }

    fn exact_groups<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
        group_by: Column,
    ) -> GroupedEstimationResult {
        let total = dataset.total_records();
        let method_name = "Exact (full scan)";
        let groups = dataset
            .exact_group_stats(request.query.column, group_by)
            .iter()
            .map(|stats| {
                let value = exact_group_value(request.query.function, stats);
                let result = EstimationResult::new(value, Strategy::Exact, method_name)
                    .with_samples(SamplesUsed::new(stats.count, total));
                (stats.key, result)
            })
            .collect();

        GroupedEstimationResult {
            group_by,
            groups,
            samples_used: SamplesUsed::new(total, total),
            execution_time: Default::default(),
            method_name: method_name.to_string(),
            strategy: Strategy::Exact,
        }
    }

    fn sampled_groups<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
        group_by: Column,
        threads: usize,
    ) -> AqeResult<GroupedEstimationResult> {
        let total = dataset.total_records();
        let (sample, detail) = self.draw(dataset, request)?;
        let error_threshold = self.error_threshold(request);

        let partitions = partition_sample(&sample, request.query.value_column(), group_by);
        tracing::debug!(
            "Partitioned {} samples into {} groups of {}",
            sample.len(),
            partitions.len(),
            group_by
        );

        let estimator = Estimator::new(
            request.query.function,
            total,
            request.parameters.confidence_level,
        );
        let method_name = format!(
            "{} ({}, grouped on {} threads)",
            request.method_label(),
            detail,
            threads
        );

        let groups: BTreeMap<i64, EstimationResult> = partitions
            .par_iter()
            .map(|(key, values)| {
                let estimate = estimator.domain_estimate(values, sample.len());
                let result = self.group_result(&estimate, request, &method_name, total, error_threshold);
                (*key, result)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        Ok(GroupedEstimationResult {
            group_by,
            groups,
            samples_used: SamplesUsed::new(sample.len(), total),
            execution_time: Default::default(),
            method_name,
            strategy: request.strategy,
        })
    }

    fn error_threshold(&self, request: &ExecutionRequest) -> Option<f64> {
        match request.strategy {
            Strategy::Clt => Some(CltExecutor::new(self.config.clt.clone()).error_threshold(request)),
            Strategy::Adaptive => Some(
                request
                    .parameters
                    .error_threshold
                    .unwrap_or(self.config.adaptive.error_threshold),
            ),
            _ => None,
        }
    }

    /// One sample for the whole query, drawn the way the strategy draws it
    fn draw<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<(Sample, String)> {
        match request.strategy {
            Strategy::Clt => {
                let (sample, percent) = CltExecutor::new(self.config.clt.clone()).draw(dataset, request)?;
                Ok((sample, format!("{}% dual-pointer sample", percent)))
            }
            Strategy::Adaptive => {
                let percent = request
                    .parameters
                    .sample_percent
                    .unwrap_or(self.config.adaptive.initial_sample_percent);
                check_percent("sample_percent", percent)?;
                let (sample, tier) = tiered_sample(dataset, percent, &self.config.sampling);
                if sample.is_empty() {
                    return Err(AqeError::empty_sample(format!("{} sampling", tier), percent));
                }
                Ok((sample, format!("{}% via {}", percent, tier)))
            }
            _ => SamplingExecutor::new(self.config.sampling.clone()).draw(dataset, request),
        }
    }

    fn group_result(
        &self,
        estimate: &Estimate,
        request: &ExecutionRequest,
        method_name: &str,
        total: usize,
        error_threshold: Option<f64>,
    ) -> EstimationResult {
        let status = match (request.strategy, error_threshold) {
            (Strategy::Adaptive, Some(threshold)) => {
                classify_estimate(estimate, total, threshold, self.config.adaptive.min_population)
            }
            (Strategy::Clt, Some(threshold)) if self.config.clt.classify_status => {
                classify_estimate(estimate, total, threshold, 0)
            }
            _ if estimate.interval.is_none() => ApproximationStatus::InsufficientData,
            _ => ApproximationStatus::Stable,
        };

        let error_margin = estimate.relative_error().unwrap_or(f64::INFINITY);

        let suggestion = match status {
            ApproximationStatus::Drifting if request.strategy == Strategy::Adaptive => {
                let percent = request
                    .parameters
                    .sample_percent
                    .unwrap_or(self.config.adaptive.initial_sample_percent);
                AdaptiveValidator::new(self.config.adaptive.clone(), self.config.sampling.clone())
                    .next_sample_percent(percent)
            }
            _ => None,
        };

        EstimationResult::new(estimate.value, request.strategy, method_name)
            .with_interval(estimate.interval, request.parameters.confidence_level)
            .with_error_margin(error_margin)
            .with_error_threshold(error_threshold.map(|t| t / 100.0))
            .with_samples(SamplesUsed::new(estimate.samples, total))
            .with_status(status)
            .with_suggestion(suggestion)
    }
}
