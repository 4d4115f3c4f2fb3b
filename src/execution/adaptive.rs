/// Adaptive validator
///
/// Each call runs one collect-and-classify pass: draw a sample at the
/// requested size, estimate with a confidence interval and classify it.
///
/// - STABLE: interval half-width relative to the value is within the target
/// - DRIFTING: it is not; the result carries a larger sample percent to retry
///   with unless the ceiling is already reached
/// - INSUFFICIENT_DATA: fewer than two values, or a population too small to
///   sample; the provisional value is still returned
/// - ERROR: the storage produced no data; no value
///
/// Escalation is opt-in (`AdaptiveConfig::escalate`) and re-invokes the pass
/// with the suggested sample until it settles or `max_rounds` is spent.
use super::{
    tiered_sample, ApproximationStatus, Estimate, EstimationResult, Estimator, ExecutionRequest,
    SamplesUsed,
};
use crate::config::{check_confidence, check_percent, check_threshold, AdaptiveConfig, SamplingConfig};
use crate::error::AqeResult;
use crate::query::AggregateFunction;
use crate::storage::{acquire, Dataset, StorageEngine};
use std::time::Instant;

/// Classify an estimate against a target relative error (percent).
/// The error is that of the underlying mean, so SUM and AVG over the same
/// sample always classify alike.
pub fn classify_estimate(
    estimate: &Estimate,
    population: usize,
    error_threshold: f64,
    min_population: usize,
) -> ApproximationStatus {
    if estimate.samples < 2 || population < min_population {
        return ApproximationStatus::InsufficientData;
    }
    match estimate.relative_error() {
        Some(error) if error * 100.0 <= error_threshold => ApproximationStatus::Stable,
        Some(_) => ApproximationStatus::Drifting,
        None => ApproximationStatus::InsufficientData,
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdaptiveValidator {
    config: AdaptiveConfig,
    sampling: SamplingConfig,
}

impl AdaptiveValidator {
    pub fn new(config: AdaptiveConfig, sampling: SamplingConfig) -> Self {
        Self { config, sampling }
    }

    /// Next sample percent to try, `None` once the ceiling is reached
    pub fn next_sample_percent(&self, percent: f64) -> Option<f64> {
        if percent >= self.config.max_sample_percent {
            None
        } else {
            Some((percent * self.config.growth_factor).min(self.config.max_sample_percent))
        }
    }

    /// One pass, or several when escalation is enabled
    pub fn run<S: StorageEngine + ?Sized>(
        &self,
        storage: &S,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        let start = Instant::now();
        let mut request = request.clone();
        let mut round = 1;

        loop {
            let result = self.validate(storage, &request)?;
            let retry_with = match result.suggested_sample_percent {
                Some(next)
                    if self.config.escalate
                        && result.status() == ApproximationStatus::Drifting
                        && round < self.config.max_rounds =>
                {
                    next
                }
                _ => return Ok(result.with_execution_time(start.elapsed())),
            };

            tracing::debug!(
                "Adaptive round {} drifting, retrying at {}%",
                round,
                retry_with
            );
            request.parameters.sample_percent = Some(retry_with);
            round += 1;
        }
    }

    /// A single collect-and-classify pass
    pub fn validate<S: StorageEngine + ?Sized>(
        &self,
        storage: &S,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        let start = Instant::now();
        let dataset = acquire(storage, &request.db_path)?;
        let result = self.validate_on(&*dataset, request)?;
        drop(dataset);
        Ok(result.with_execution_time(start.elapsed()))
    }

    pub fn validate_on<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        let percent = request
            .parameters
            .sample_percent
            .unwrap_or(self.config.initial_sample_percent);
        let error_threshold = request
            .parameters
            .error_threshold
            .unwrap_or(self.config.error_threshold);
        let confidence = request.parameters.confidence_level;
        check_percent("sample_percent", percent)?;
        check_threshold("error_threshold", error_threshold)?;
        check_confidence("confidence_level", confidence)?;

        let total = dataset.total_records();
        let (sample, tier) = tiered_sample(dataset, percent, &self.sampling);
        let method_name = format!(
            "{} ({}% via {}, target {}% error)",
            request.method_label(),
            percent,
            tier,
            error_threshold
        );

        if sample.is_empty() {
            tracing::warn!(
                "Adaptive sampling got no records from {} at {}%",
                request.db_path.display(),
                percent
            );
            return Ok(EstimationResult::failed(request.strategy, method_name)
                .with_samples(SamplesUsed::new(0, total)));
        }

        let estimator = Estimator::new(request.query.function, total, confidence);
        let estimate = estimator.estimate(&sample.values(request.query.value_column()));

        let (status, error_margin) = if request.query.function == AggregateFunction::Count {
            (ApproximationStatus::Stable, 0.0)
        } else {
            let status = classify_estimate(
                &estimate,
                total,
                error_threshold,
                self.config.min_population,
            );
            let margin = estimate.relative_error().unwrap_or(f64::INFINITY);
            (status, margin)
        };

        let suggestion = match status {
            ApproximationStatus::Drifting => self.next_sample_percent(percent),
            _ => None,
        };
        tracing::debug!(
            "Adaptive pass: {} samples, relative error {:.4}, status {}",
            sample.len(),
            error_margin,
            status
        );

        let (ci, confidence_level) = match request.query.function {
            AggregateFunction::Count => (None, 1.0),
            _ => (estimate.interval, confidence),
        };
        Ok(EstimationResult::new(estimate.value, request.strategy, method_name)
            .with_interval(ci, confidence_level)
            .with_error_margin(error_margin)
            .with_error_threshold(Some(error_threshold / 100.0))
            .with_samples(SamplesUsed::new(sample.len(), total))
            .with_status(status)
            .with_suggestion(suggestion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionParameters, Strategy};
    use crate::query::parse_query;
    use crate::storage::{MemoryStorage, Record, RecordStore};

    fn store(n: i64, spread: i64) -> RecordStore {
        let records = (0..n)
            .map(|i| Record::new(i, 1000.0 + (i % spread) as f64, 0, 1, i))
            .collect();
        RecordStore::from_records("sales", records)
    }

    fn request(sql: &str, percent: f64, threshold: f64) -> ExecutionRequest {
        ExecutionRequest::new(parse_query(sql).unwrap(), "sales.db", Strategy::Adaptive)
            .with_parameters(ExecutionParameters {
                sample_percent: Some(percent),
                error_threshold: Some(threshold),
                ..ExecutionParameters::default()
            })
    }

    #[test]
    fn test_tight_spread_is_stable() {
        let dataset = store(10_000, 10);
        let result = AdaptiveValidator::default()
            .validate_on(&dataset, &request("SELECT AVG(amount) FROM sales", 10.0, 1.0))
            .unwrap();
        assert_eq!(result.status(), ApproximationStatus::Stable);
        assert!(result.error_margin <= 0.01);
        assert!(result.suggested_sample_percent.is_none());
    }

    #[test]
    fn test_wide_target_miss_is_drifting_with_suggestion() {
        let dataset = store(10_000, 2000);
        let result = AdaptiveValidator::default()
            .validate_on(&dataset, &request("SELECT SUM(amount) FROM sales", 10.0, 0.01))
            .unwrap();
        assert_eq!(result.status(), ApproximationStatus::Drifting);
        assert!(result.value().is_some());
        assert_eq!(result.suggested_sample_percent, Some(20.0));

        let at_ceiling = AdaptiveValidator::default()
            .validate_on(&dataset, &request("SELECT SUM(amount) FROM sales", 50.0, 0.01))
            .unwrap();
        assert_eq!(at_ceiling.status(), ApproximationStatus::Drifting);
        assert!(at_ceiling.suggested_sample_percent.is_none());
    }

    #[test]
    fn test_sum_and_avg_classify_alike_on_the_same_sample() {
        // 1000 of 10,000 records spread over 1000..2000: about 1.2% relative error
        let values: Vec<f64> = (0..1000).map(|i| 1000.0 + i as f64).collect();
        let sum = Estimator::new(AggregateFunction::Sum, 10_000, 0.95).estimate(&values);
        let avg = Estimator::new(AggregateFunction::Avg, 10_000, 0.95).estimate(&values);

        for (threshold, expected) in [
            (1.0, ApproximationStatus::Drifting),
            (2.0, ApproximationStatus::Stable),
        ] {
            assert_eq!(classify_estimate(&avg, 10_000, threshold, 100), expected);
            assert_eq!(classify_estimate(&sum, 10_000, threshold, 100), expected);
        }
    }

    #[test]
    fn test_sum_reports_the_same_relative_error_as_avg() {
        let dataset = store(10_000, 10);
        let validator = AdaptiveValidator::default();
        let sum = validator
            .validate_on(&dataset, &request("SELECT SUM(amount) FROM sales", 100.0, 1.0))
            .unwrap();
        let avg = validator
            .validate_on(&dataset, &request("SELECT AVG(amount) FROM sales", 100.0, 1.0))
            .unwrap();

        assert_eq!(sum.status(), avg.status());
        assert!((sum.error_margin - avg.error_margin).abs() < 1e-12);
        assert_eq!(sum.error_threshold, Some(0.01));
    }

    #[test]
    fn test_small_population_is_insufficient() {
        let dataset = store(20, 5);
        let result = AdaptiveValidator::default()
            .validate_on(&dataset, &request("SELECT AVG(amount) FROM sales", 50.0, 5.0))
            .unwrap();
        assert_eq!(result.status(), ApproximationStatus::InsufficientData);
        assert!(result.value().is_some());
    }

    #[test]
    fn test_no_data_is_error_status() {
        let dataset = store(5, 5);
        let result = AdaptiveValidator::default()
            .validate_on(&dataset, &request("SELECT AVG(amount) FROM sales", 10.0, 5.0))
            .unwrap();
        assert_eq!(result.status(), ApproximationStatus::Error);
        assert!(result.value().is_none());
    }

    #[test]
    fn test_count_is_always_stable() {
        let dataset = store(1_000, 500);
        let result = AdaptiveValidator::default()
            .validate_on(&dataset, &request("SELECT COUNT(*) FROM sales", 10.0, 0.001))
            .unwrap();
        assert_eq!(result.status(), ApproximationStatus::Stable);
        assert_eq!(result.value(), Some(1_000.0));
    }

    #[test]
    fn test_escalation_grows_sample_and_releases_every_handle() {
        let storage = MemoryStorage::with_store("sales.db", store(10_000, 2000));
        let validator = AdaptiveValidator::new(
            AdaptiveConfig {
                escalate: true,
                ..AdaptiveConfig::default()
            },
            SamplingConfig::default(),
        );

        let result = validator
            .run(&storage, &request("SELECT AVG(amount) FROM sales", 10.0, 0.01))
            .unwrap();
        // 10% -> 20% -> 40% -> 50%, still drifting at the ceiling
        assert_eq!(result.samples_used.count, 5_000);
        assert_eq!(result.status(), ApproximationStatus::Drifting);
        assert_eq!(storage.open_count(), 4);
        assert_eq!(storage.outstanding(), 0);
    }

    #[test]
    fn test_next_sample_percent() {
        let validator = AdaptiveValidator::default();
        assert_eq!(validator.next_sample_percent(10.0), Some(20.0));
        assert_eq!(validator.next_sample_percent(30.0), Some(50.0));
        assert_eq!(validator.next_sample_percent(50.0), None);
    }
}
