/// CLT approximation path
/// Maps an error threshold to a sample percent, samples with the storage
/// engine's dual-pointer scan and attaches a Gaussian confidence interval.
use super::{
    classify_estimate, sample_percent_for_error_threshold, ApproximationStatus, EstimationResult,
    Estimator, ExecutionRequest, SamplesUsed,
};
use crate::config::{check_confidence, check_threshold, CltConfig};
use crate::error::{AqeError, AqeResult};
use crate::query::AggregateFunction;
use crate::storage::{acquire, Dataset, DualPointerParams, Sample, StorageEngine};
use std::time::Instant;

#[derive(Clone, Debug, Default)]
pub struct CltExecutor {
    config: CltConfig,
}

impl CltExecutor {
    pub fn new(config: CltConfig) -> Self {
        Self { config }
    }

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

    /// Error threshold of a request, falling back to the embedded default
    pub fn error_threshold(&self, request: &ExecutionRequest) -> f64 {
        request
            .parameters
            .error_threshold
            .unwrap_or(self.config.embedded_error_threshold)
    }

    /// Dual-pointer sample for a request; returns the sample and the percent asked for
    pub fn draw<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<(Sample, f64)> {
        let error_threshold = self.error_threshold(request);
        check_threshold("error_threshold", error_threshold)?;
        check_confidence("confidence_level", request.parameters.confidence_level)?;

        let sample_percent = sample_percent_for_error_threshold(error_threshold);
        let params = DualPointerParams {
            sample_percent,
            column: request.query.value_column(),
            confidence_level: request.parameters.confidence_level,
            check_interval: self.config.check_interval,
            thread_count: request.parameters.thread_count.max(1),
            max_error_percent: error_threshold,
        };
        tracing::debug!(
            "CLT: {}% error threshold -> {}% dual-pointer sample",
            error_threshold,
            sample_percent
        );

        let sample = dataset.clt_validated_dual_pointer_sample(&params);
        if sample.is_empty() {
            return Err(AqeError::empty_sample("dual-pointer scan", sample_percent));
        }
        Ok((sample, sample_percent))
    }

    pub fn execute_on<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        request: &ExecutionRequest,
    ) -> AqeResult<EstimationResult> {
        let total = dataset.total_records();
        let (sample, sample_percent) = self.draw(dataset, request)?;
        let error_threshold = self.error_threshold(request);

        let estimator = Estimator::new(
            request.query.function,
            total,
            request.parameters.confidence_level,
        );
        let values = sample.values(request.query.value_column());
        let estimate = estimator.estimate_with_interval(&values)?;

        let status = if self.config.classify_status
            && request.query.function != AggregateFunction::Count
        {
            classify_estimate(&estimate, total, error_threshold, 0)
        } else {
            ApproximationStatus::Stable
        };

        let method_name = format!(
            "{} ({}% error -> {}% sample)",
            request.method_label(),
            error_threshold,
            sample_percent
        );
        let (interval, error_margin) = match request.query.function {
            AggregateFunction::Count => (None, 0.0),
            _ => (
                estimate.interval,
                estimate.relative_error().unwrap_or(f64::INFINITY),
            ),
        };

        Ok(EstimationResult::new(estimate.value, request.strategy, method_name)
            .with_interval(interval, request.parameters.confidence_level)
            .with_error_margin(error_margin)
            .with_error_threshold(Some(error_threshold / 100.0))
            .with_samples(SamplesUsed::new(sample.len(), total))
            .with_status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CltConfig;
    use crate::execution::{ExecutionParameters, Strategy};
    use crate::query::parse_query;
    use crate::storage::{Record, RecordStore};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn store(n: i64) -> RecordStore {
        let mut rng = StdRng::seed_from_u64(7);
        let records = (0..n)
            .map(|i| Record::new(i, rng.gen_range(100.0..140.0), rng.gen_range(0..3), 1, i))
            .collect();
        RecordStore::from_records("sales", records)
    }

    fn request(sql: &str, threshold: f64) -> ExecutionRequest {
        ExecutionRequest::new(parse_query(sql).unwrap(), "sales.db", Strategy::Clt).with_parameters(
            ExecutionParameters {
                error_threshold: Some(threshold),
                ..ExecutionParameters::default()
            },
        )
    }

    #[test]
    fn test_sum_estimate_reports_computed_margin_and_target() {
        let dataset = store(40_000);
        let result = CltExecutor::default()
            .execute_on(&dataset, &request("SELECT SUM(amount) FROM sales", 2.0))
            .unwrap();

        let exact = dataset.sum_amount();
        let value = result.value().unwrap();
        assert!((value - exact).abs() / exact < 0.02, "{value} vs {exact}");
        assert_eq!(result.error_threshold, Some(0.02));
        assert!(result.error_margin > 0.0 && result.error_margin <= 0.02);
        let ci = result.ci.unwrap();
        let total_relative = ci.width() / 2.0 / value;
        // the reported interval is on the total, the margin on the mean
        assert!(total_relative < result.error_margin);
        assert_eq!(result.confidence_level, 0.95);
        assert_eq!(result.status(), ApproximationStatus::Stable);
        assert!(result.ci.unwrap().contains(value));
        assert!(result.samples_used.count <= 6_000);
    }

    #[test]
    fn test_count_has_no_interval() {
        let dataset = store(5_000);
        let result = CltExecutor::default()
            .execute_on(&dataset, &request("SELECT COUNT(*) FROM sales", 5.0))
            .unwrap();
        assert_eq!(result.value(), Some(5_000.0));
        assert!(result.ci.is_none());
        assert_eq!(result.error_margin, 0.0);
    }

    #[test]
    fn test_tiny_dataset_is_insufficient() {
        // 20% of 9 records is a single record
        let dataset = store(9);
        let err = CltExecutor::default()
            .execute_on(&dataset, &request("SELECT AVG(amount) FROM sales", 0.5))
            .unwrap_err();
        assert!(matches!(err, AqeError::InsufficientSample { samples: 1 }));
    }

    #[test]
    fn test_empty_scan_is_an_error() {
        let dataset = store(4);
        let err = CltExecutor::default()
            .execute_on(&dataset, &request("SELECT SUM(amount) FROM sales", 10.0))
            .unwrap_err();
        assert!(matches!(err, AqeError::EmptySample { .. }));
    }

    #[test]
    fn test_status_classification_is_opt_in() {
        let dataset = store(2_000);
        let config = CltConfig {
            classify_status: true,
            ..CltConfig::default()
        };
        // A 0.01% error target cannot be met by a 20% sample of this spread
        let result = CltExecutor::new(config)
            .execute_on(&dataset, &request("SELECT AVG(amount) FROM sales", 0.01))
            .unwrap();
        assert_eq!(result.status(), ApproximationStatus::Drifting);
        assert!(result.value().is_some());
    }

    #[test]
    fn test_sum_classifies_like_avg() {
        let dataset = store(2_000);
        let executor = CltExecutor::new(CltConfig {
            classify_status: true,
            ..CltConfig::default()
        });

        let sum = executor
            .execute_on(&dataset, &request("SELECT SUM(amount) FROM sales", 0.01))
            .unwrap();
        assert_eq!(sum.status(), ApproximationStatus::Drifting);
        assert!(sum.error_margin > 0.0001);

        let loose = executor
            .execute_on(&dataset, &request("SELECT SUM(amount) FROM sales", 10.0))
            .unwrap();
        assert_eq!(loose.status(), ApproximationStatus::Stable);
    }

    #[test]
    fn test_invalid_threshold() {
        let dataset = store(1_000);
        let err = CltExecutor::default()
            .execute_on(&dataset, &request("SELECT SUM(amount) FROM sales", -1.0))
            .unwrap_err();
        assert!(matches!(err, AqeError::InvalidParameter { .. }));
    }
}
