/// Statistical estimator: point estimates, CLT margins and intervals.
///
/// Values are per-record values of the aggregated column. SUM is estimated by
/// scaling the sample mean to the population, AVG by the sample mean and COUNT
/// is always the population size. Margins use `m = z * s / sqrt(n)` with the
/// unbiased sample standard deviation; SUM margins are scaled like the value.
use super::ConfidenceInterval;
use crate::error::{AqeError, AqeResult};
use crate::query::AggregateFunction;
use serde::{Deserialize, Serialize};

/// Standard normal quantile (Acklam's rational approximation, |error| < 1.2e-9)
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549671010229583e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p.is_nan() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Two-sided z critical value for a confidence level
pub fn z_score(confidence: f64) -> f64 {
    normal_quantile((1.0 + confidence) / 2.0)
}

/// Sample percent needed for an error threshold (percent). Smaller tolerated
/// error needs a larger sample.
pub fn sample_percent_for_error_threshold(error_threshold: f64) -> f64 {
    if error_threshold <= 1.0 {
        20.0
    } else if error_threshold <= 2.0 {
        15.0
    } else if error_threshold <= 5.0 {
        10.0
    } else {
        5.0
    }
}

/// Margin relative to the magnitude of the value
pub fn relative_error(margin: f64, value: f64) -> f64 {
    if margin == 0.0 {
        0.0
    } else if value == 0.0 {
        f64::INFINITY
    } else {
        margin / value.abs()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStatistics {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    /// Unbiased (n - 1) variance; 0 below two values
    pub variance: f64,
    pub std_dev: f64,
}

impl SampleStatistics {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::default();
        }

        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let variance = if count < 2 {
            0.0
        } else {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64
        };

        Self {
            count,
            sum,
            mean,
            variance,
            std_dev: variance.sqrt(),
        }
    }

    /// Standard error of the mean; `None` below two values
    pub fn standard_error(&self) -> Option<f64> {
        (self.count >= 2).then(|| self.std_dev / (self.count as f64).sqrt())
    }

    /// Margin of error of the mean at critical value `z`
    pub fn margin(&self, z: f64) -> Option<f64> {
        self.standard_error().map(|se| z * se)
    }
}

/// Point estimate with its margin and interval (absent when not computable or exact)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub margin: Option<f64>,
    pub interval: Option<ConfidenceInterval>,
    /// Margin of the sample mean over the sample mean, before any
    /// population scaling. Identical for SUM and AVG over the same values.
    pub relative_margin: Option<f64>,
    pub samples: usize,
}

impl Estimate {
    fn point(value: f64, samples: usize) -> Self {
        Self {
            value,
            margin: None,
            interval: None,
            relative_margin: None,
            samples,
        }
    }

    fn with_margin(value: f64, margin: f64, relative_margin: f64, samples: usize) -> Self {
        Self {
            value,
            margin: Some(margin),
            interval: Some(ConfidenceInterval::around(value, margin)),
            relative_margin: Some(relative_margin),
            samples,
        }
    }

    /// Relative error of the underlying mean; `None` without an interval
    pub fn relative_error(&self) -> Option<f64> {
        self.relative_margin
    }
}

/// Turns sample values into population estimates for one aggregate
#[derive(Clone, Copy, Debug)]
pub struct Estimator {
    function: AggregateFunction,
    population: usize,
    confidence_level: f64,
}

impl Estimator {
    pub fn new(function: AggregateFunction, population: usize, confidence_level: f64) -> Self {
        Self {
            function,
            population,
            confidence_level,
        }
    }

    pub fn z(&self) -> f64 {
        z_score(self.confidence_level)
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Margin of a population total from the margin of the per-record mean
    /// over `n` sampled records, scaled by `total_records / n` like the total.
    pub fn total_margin(&self, mean_margin: f64, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        mean_margin * (self.population as f64 / n as f64)
    }

    /// Point estimate without an interval
    pub fn point(&self, values: &[f64]) -> f64 {
        let n = values.len();
        match self.function {
            AggregateFunction::Count => self.population as f64,
            _ if n == 0 => 0.0,
            AggregateFunction::Sum => {
                values.iter().sum::<f64>() * (self.population as f64 / n as f64)
            }
            AggregateFunction::Avg => values.iter().sum::<f64>() / n as f64,
        }
    }

    /// Estimate with an interval when two or more values are available.
    /// COUNT is exact and never carries an interval.
    pub fn estimate(&self, values: &[f64]) -> Estimate {
        let n = values.len();
        if self.function == AggregateFunction::Count {
            return Estimate::point(self.population as f64, n);
        }

        let stats = SampleStatistics::from_values(values);
        let value = self.point(values);
        match stats.margin(self.z()) {
            Some(margin) => {
                let relative = relative_error(margin, stats.mean);
                let margin = match self.function {
                    AggregateFunction::Sum => self.total_margin(margin, n),
                    _ => margin,
                };
                Estimate::with_margin(value, margin, relative, n)
            }
            None => Estimate::point(value, n),
        }
    }

    /// Like `estimate`, but fails with `InsufficientSample` when an interval
    /// is required and fewer than two values are available
    pub fn estimate_with_interval(&self, values: &[f64]) -> AqeResult<Estimate> {
        if self.function != AggregateFunction::Count && values.len() < 2 {
            return Err(AqeError::InsufficientSample {
                samples: values.len(),
            });
        }
        Ok(self.estimate(values))
    }

    /// Domain estimate for one group of a GROUP BY, from the group's values
    /// out of a sample of `sample_size` records.
    ///
    /// SUM and COUNT use the domain total `N * mean(y)` with `y = x * 1[g]`
    /// (or `1[g]`) over the whole sample, with the margin scaled exactly as
    /// an ungrouped SUM. AVG uses the group's own mean and needs two group
    /// values for an interval.
    pub fn domain_estimate(&self, group_values: &[f64], sample_size: usize) -> Estimate {
        let n_g = group_values.len();
        if self.function == AggregateFunction::Avg {
            let stats = SampleStatistics::from_values(group_values);
            return match stats.margin(self.z()) {
                Some(margin) => {
                    Estimate::with_margin(stats.mean, margin, relative_error(margin, stats.mean), n_g)
                }
                None => Estimate::point(stats.mean, n_g),
            };
        }
        if sample_size == 0 {
            return Estimate::point(0.0, 0);
        }

        let n = sample_size as f64;
        let population = self.population as f64;
        // Contribution of each sampled record to the group total
        let (mean_y, variance_y) = match self.function {
            AggregateFunction::Count => {
                let p = n_g as f64 / n;
                let variance = if sample_size < 2 {
                    0.0
                } else {
                    n * p * (1.0 - p) / (n - 1.0)
                };
                (p, variance)
            }
            _ => {
                let mean = group_values.iter().sum::<f64>() / n;
                let inside: f64 = group_values.iter().map(|x| (x - mean).powi(2)).sum();
                let outside = (sample_size - n_g) as f64 * mean * mean;
                let variance = if sample_size < 2 {
                    0.0
                } else {
                    (inside + outside) / (n - 1.0)
                };
                (mean, variance)
            }
        };

        let value = population * mean_y;
        if sample_size < 2 {
            return Estimate::point(value, n_g);
        }
        let mean_margin = self.z() * (variance_y / n).sqrt();
        let margin = self.total_margin(mean_margin, sample_size);
        Estimate::with_margin(value, margin, relative_error(mean_margin, mean_y), n_g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tens() -> Vec<f64> {
        (1..=10).map(|i| i as f64 * 10.0).collect()
    }

    #[test]
    fn test_avg_over_full_population() {
        let estimator = Estimator::new(AggregateFunction::Avg, 10, 0.95);
        let estimate = estimator.estimate_with_interval(&tens()).unwrap();

        assert_eq!(estimate.value, 55.0);
        let margin = estimate.margin.unwrap();
        assert!((margin - 18.766).abs() < 0.02, "margin {margin}");
        let ci = estimate.interval.unwrap();
        assert!((ci.lower - 36.2).abs() < 0.1);
        assert!((ci.upper - 73.8).abs() < 0.1);

        let stats = SampleStatistics::from_values(&tens());
        assert!((stats.std_dev - 30.2765).abs() < 1e-3);
    }

    #[test]
    fn test_sum_scales_value_and_margin() {
        let values = tens();
        let estimator = Estimator::new(AggregateFunction::Sum, 1000, 0.95);
        let estimate = estimator.estimate(&values);
        assert_eq!(estimate.value, 55_000.0);

        let avg = Estimator::new(AggregateFunction::Avg, 1000, 0.95).estimate(&values);
        let scale = 1000.0 / values.len() as f64;
        assert!((estimate.margin.unwrap() - avg.margin.unwrap() * scale).abs() < 1e-9);
    }

    #[test]
    fn test_sum_and_avg_share_relative_margin() {
        let values = tens();
        let sum = Estimator::new(AggregateFunction::Sum, 1000, 0.95).estimate(&values);
        let avg = Estimator::new(AggregateFunction::Avg, 1000, 0.95).estimate(&values);

        let (sum_rel, avg_rel) = (sum.relative_error().unwrap(), avg.relative_error().unwrap());
        assert!((sum_rel - avg_rel).abs() < 1e-12);
        assert!((avg_rel - avg.margin.unwrap() / 55.0).abs() < 1e-12);
        // the reported SUM interval stays on the scaled margin
        assert!(sum.margin.unwrap() / sum.value < sum_rel);
    }

    #[test]
    fn test_sum_estimate_is_deterministic() {
        let values = tens();
        let estimator = Estimator::new(AggregateFunction::Sum, 5000, 0.95);
        let first = estimator.estimate(&values);
        let second = estimator.estimate(&values);
        assert_eq!(first.value, second.value);
        assert_eq!(first.margin, second.margin);
    }

    #[test]
    fn test_count_is_population_without_interval() {
        let estimator = Estimator::new(AggregateFunction::Count, 12_345, 0.95);
        let estimate = estimator.estimate_with_interval(&[1.0]).unwrap();
        assert_eq!(estimate.value, 12_345.0);
        assert!(estimate.interval.is_none());
        assert_eq!(estimator.point(&[]), 12_345.0);
    }

    #[test]
    fn test_interval_needs_two_values() {
        let estimator = Estimator::new(AggregateFunction::Avg, 100, 0.95);
        assert!(matches!(
            estimator.estimate_with_interval(&[5.0]),
            Err(AqeError::InsufficientSample { samples: 1 })
        ));
        assert!(estimator.estimate(&[5.0]).interval.is_none());
    }

    #[test]
    fn test_margin_shrinks_with_sample_size() {
        // Same spread at every size: values alternate 0 and 100
        let values = |n: usize| -> Vec<f64> { (0..n).map(|i| (i % 2) as f64 * 100.0).collect() };
        let estimator = Estimator::new(AggregateFunction::Avg, 1_000_000, 0.95);

        let margins: Vec<f64> = [10, 100, 1000, 10_000]
            .iter()
            .map(|&n| estimator.estimate(&values(n)).margin.unwrap())
            .collect();
        assert!(margins.windows(2).all(|w| w[0] > w[1]), "{margins:?}");
    }

    #[test]
    fn test_threshold_table() {
        let percents: Vec<f64> = [0.1, 1.0, 2.0, 5.0, 10.0]
            .iter()
            .map(|&t| sample_percent_for_error_threshold(t))
            .collect();
        assert_eq!(percents, vec![20.0, 20.0, 15.0, 10.0, 5.0]);
        assert!(percents.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_z_scores() {
        let cases = [
            (0.5, 0.6745),
            (0.85, 1.4395),
            (0.90, 1.6449),
            (0.95, 1.9600),
            (0.98, 2.3263),
            (0.99, 2.5758),
            (0.999, 3.2905),
        ];
        for (confidence, expected) in cases {
            let z = z_score(confidence);
            assert!((z - expected).abs() < 1e-3, "z({confidence}) = {z}, expected {expected}");
        }
        assert_eq!(normal_quantile(0.5), 0.0);
        assert!((normal_quantile(0.01) + normal_quantile(0.99)).abs() < 1e-9);
    }

    #[test]
    fn test_higher_confidence_widens_the_interval() {
        let values = tens();
        let margin = |confidence| {
            Estimator::new(AggregateFunction::Avg, 10, confidence)
                .estimate(&values)
                .margin
                .unwrap()
        };
        let (m90, m95, m98) = (margin(0.90), margin(0.95), margin(0.98));
        assert!(m90 < m95 && m95 < m98, "{m90} {m95} {m98}");
        // z(0.98) / z(0.95)
        assert!((m98 / m95 - 2.3263 / 1.9600).abs() < 1e-3);
    }

    #[test]
    fn test_domain_estimates_sum_to_population_totals() {
        // Group 0 holds values 10 and 30, group 1 holds 20 and 40; sample is the whole population
        let estimator = Estimator::new(AggregateFunction::Sum, 4, 0.95);
        let g0 = estimator.domain_estimate(&[10.0, 30.0], 4);
        let g1 = estimator.domain_estimate(&[20.0, 40.0], 4);
        assert_eq!(g0.value, 40.0);
        assert_eq!(g1.value, 60.0);

        let counts = Estimator::new(AggregateFunction::Count, 1000, 0.95);
        let c = counts.domain_estimate(&[1.0; 25], 100);
        assert_eq!(c.value, 250.0);
        assert!(c.margin.unwrap() > 0.0);

        let avg = Estimator::new(AggregateFunction::Avg, 1000, 0.95).domain_estimate(&[7.0], 100);
        assert_eq!(avg.value, 7.0);
        assert!(avg.interval.is_none());
    }

    #[test]
    fn test_single_group_domain_sum_matches_ungrouped_sum() {
        // One group covering the whole sample is the ungrouped case
        let values = tens();
        let estimator = Estimator::new(AggregateFunction::Sum, 1000, 0.95);
        let grouped = estimator.domain_estimate(&values, values.len());
        let ungrouped = estimator.estimate(&values);

        assert!((grouped.value - ungrouped.value).abs() < 1e-9);
        assert!((grouped.margin.unwrap() - ungrouped.margin.unwrap()).abs() < 1e-9);
        assert!((grouped.relative_error().unwrap() - ungrouped.relative_error().unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_relative_error_edges() {
        assert_eq!(relative_error(0.0, 0.0), 0.0);
        assert_eq!(relative_error(1.0, 0.0), f64::INFINITY);
        assert_eq!(relative_error(5.0, -50.0), 0.1);
    }
}
