/// Sampling executor: random and block sampling over a size-tiered access pattern
use super::{
    ApproximationStatus, Estimate, EstimationResult, Estimator, ExecutionRequest, SamplesUsed,
    Strategy,
};
use crate::config::{check_confidence, check_percent, SamplingConfig};
use crate::error::{AqeError, AqeResult};
use crate::query::AggregateFunction;
use crate::storage::{acquire, Dataset, Sample, StorageEngine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Storage access pattern, chosen from the dataset size only
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTier {
    MemoryStride,
    DirectAccess,
    Sequential,
}

impl AccessTier {
    pub fn for_size(total_records: usize, config: &SamplingConfig) -> Self {
        if total_records > config.large_dataset_threshold {
            Self::MemoryStride
        } else if total_records > config.medium_dataset_threshold {
            Self::DirectAccess
        } else {
            Self::Sequential
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MemoryStride => "memory stride",
            Self::DirectAccess => "direct access",
            Self::Sequential => "sequential",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Draw a sample with the tier matching the dataset size. The stride tier
/// starts at a random offset so every record has the same inclusion chance.
pub fn tiered_sample<D: Dataset + ?Sized>(
    dataset: &D,
    percent: f64,
    config: &SamplingConfig,
) -> (Sample, AccessTier) {
    let total = dataset.total_records();
    let tier = AccessTier::for_size(total, config);
    let sample = match tier {
        AccessTier::MemoryStride => {
            let offset = rand::thread_rng().gen_range(0..total.max(1));
            dataset.memory_stride_sample(percent, offset)
        }
        AccessTier::DirectAccess => dataset.direct_access_sample(percent),
        AccessTier::Sequential => dataset.sequential_sample(percent),
    };

    tracing::debug!(
        "Sampled {} of {} records at {}% via {}",
        sample.len(),
        total,
        percent,
        tier
    );
    (sample, tier)
}

/// Build the result of a sampled estimate. COUNT is exact; estimates without
/// an interval (fewer than two values) are reported as INSUFFICIENT_DATA.
pub(crate) fn sampled_result(
    estimate: &Estimate,
    request: &ExecutionRequest,
    method_name: String,
    total_records: usize,
) -> EstimationResult {
    let samples = SamplesUsed::new(estimate.samples, total_records);
    let result = EstimationResult::new(estimate.value, request.strategy, method_name)
        .with_samples(samples);

    if request.query.function == AggregateFunction::Count {
        return result;
    }

    match (estimate.interval, estimate.relative_error()) {
        (Some(ci), Some(error)) => result
            .with_interval(Some(ci), request.parameters.confidence_level)
            .with_error_margin(error),
        _ => result
            .with_interval(None, request.parameters.confidence_level)
            .with_error_margin(f64::INFINITY)
            .with_status(ApproximationStatus::InsufficientData),
    }
}

#[derive(Clone, Debug, Default)]
pub struct SamplingExecutor {
    config: SamplingConfig,
}

impl SamplingExecutor {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Acquire the dataset, estimate, release
    pub fn execute<S: StorageEngine + ?Sized>(
        &self,
        storage: &S,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        let start = Instant::now();
        let dataset = acquire(storage, &request.db_path)?;
        let result = self.execute_on(&*dataset, request)?;
        drop(dataset);
        Ok(result.with_execution_time(start.elapsed()))
    }

    pub fn execute_on<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        check_confidence("confidence_level", request.parameters.confidence_level)?;
        let total = dataset.total_records();
        let (sample, detail) = self.draw(dataset, request)?;

        let estimator = Estimator::new(
            request.query.function,
            total,
            request.parameters.confidence_level,
        );
        let values = sample.values(request.query.value_column());
        let estimate = estimator.estimate(&values);

        let method_name = format!("{} ({})", request.method_label(), detail);
        Ok(sampled_result(&estimate, request, method_name, total))
    }

    /// Draw the sample a random or block request asks for. Fails with
    /// `EmptySample` rather than estimating from nothing.
    pub fn draw<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<(Sample, String)> {
        let percent = request
            .parameters
            .sample_percent
            .unwrap_or(self.config.default_sample_percent);
        check_percent("sample_percent", percent)?;

        let (sample, access) = match request.strategy {
            Strategy::Block => {
                let block_size = request
                    .parameters
                    .block_size
                    .filter(|size| *size > 0)
                    .unwrap_or(self.config.default_block_size);
                (
                    dataset.block_sample(percent, block_size),
                    format!("blocks of {}", block_size),
                )
            }
            _ => {
                let (sample, tier) = tiered_sample(dataset, percent, &self.config);
                (sample, tier.name().to_string())
            }
        };

        if sample.is_empty() {
            return Err(AqeError::empty_sample(format!("{} sampling", access), percent));
        }
        Ok((sample, format!("{}% via {}", percent, access)))
    }
}
