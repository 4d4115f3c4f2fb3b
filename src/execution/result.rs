/// Result model shared by every execution path
use super::Strategy;
use crate::query::Column;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Quality of an approximation. `Error` carries no value; every other
/// status carries one, possibly provisional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApproximationStatus {
    Stable,
    Drifting,
    InsufficientData,
    Error,
}

impl ApproximationStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Drifting => "DRIFTING",
            Self::InsufficientData => "INSUFFICIENT_DATA",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ApproximationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Interval of half-width `margin` around `center`
    pub fn around(center: f64, margin: f64) -> Self {
        Self {
            lower: center - margin,
            upper: center + margin,
        }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplesUsed {
    pub count: usize,
    pub percent: f64,
}

impl SamplesUsed {
    pub fn new(count: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        };
        Self { count, percent }
    }
}

/// Non-finite floats as JSON `null`; `null` reads back as infinity
mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// Outcome of one request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    value: Option<f64>,
    pub ci: Option<ConfidenceInterval>,
    pub confidence_level: f64,
    /// Relative error of the estimated mean as a fraction (0 for exact
    /// answers, infinite when no interval could be formed)
    #[serde(with = "unbounded")]
    pub error_margin: f64,
    /// Target relative error the run was held to, as a fraction
    pub error_threshold: Option<f64>,
    pub samples_used: SamplesUsed,
    status: ApproximationStatus,
    pub execution_time: Duration,
    pub method_name: String,
    pub strategy: Strategy,
    /// Larger sample the caller may retry with when the estimate is drifting
    pub suggested_sample_percent: Option<f64>,
}

impl EstimationResult {
    /// A STABLE result with no interval and full confidence
    pub fn new(value: f64, strategy: Strategy, method_name: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            ci: None,
            confidence_level: 1.0,
            error_margin: 0.0,
            error_threshold: None,
            samples_used: SamplesUsed::default(),
            status: ApproximationStatus::Stable,
            execution_time: Duration::ZERO,
            method_name: method_name.into(),
            strategy,
            suggested_sample_percent: None,
        }
    }

    /// An ERROR result; carries no value
    pub fn failed(strategy: Strategy, method_name: impl Into<String>) -> Self {
        Self {
            value: None,
            ci: None,
            confidence_level: 0.0,
            error_margin: 0.0,
            error_threshold: None,
            samples_used: SamplesUsed::default(),
            status: ApproximationStatus::Error,
            execution_time: Duration::ZERO,
            method_name: method_name.into(),
            strategy,
            suggested_sample_percent: None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn status(&self) -> ApproximationStatus {
        self.status
    }

    /// Change the status; moving to `Error` drops the value and interval
    pub fn with_status(mut self, status: ApproximationStatus) -> Self {
        if status == ApproximationStatus::Error {
            self.value = None;
            self.ci = None;
        }
        self.status = status;
        self
    }

    pub fn with_interval(mut self, ci: Option<ConfidenceInterval>, confidence_level: f64) -> Self {
        self.ci = ci;
        self.confidence_level = confidence_level;
        self
    }

    pub fn with_error_margin(mut self, error_margin: f64) -> Self {
        self.error_margin = error_margin;
        self
    }

    pub fn with_error_threshold(mut self, error_threshold: Option<f64>) -> Self {
        self.error_threshold = error_threshold;
        self
    }

    pub fn with_samples(mut self, samples_used: SamplesUsed) -> Self {
        self.samples_used = samples_used;
        self
    }

    pub fn with_execution_time(mut self, execution_time: Duration) -> Self {
        self.execution_time = execution_time;
        self
    }

    pub fn with_suggestion(mut self, percent: Option<f64>) -> Self {
        self.suggested_sample_percent = percent;
        self
    }

    pub fn is_exact(&self) -> bool {
        self.strategy == Strategy::Exact
    }
}

/// Per-group results of a GROUP BY query, keyed by group value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupedEstimationResult {
    pub group_by: Column,
    pub groups: BTreeMap<i64, EstimationResult>,
    pub samples_used: SamplesUsed,
    pub execution_time: Duration,
    pub method_name: String,
    pub strategy: Strategy,
}

impl GroupedEstimationResult {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn value(&self, key: i64) -> Option<f64> {
        self.groups.get(&key).and_then(|r| r.value())
    }

    /// Worst status across groups, `Stable` when there are none
    pub fn overall_status(&self) -> ApproximationStatus {
        let rank = |status: ApproximationStatus| match status {
            ApproximationStatus::Stable => 0,
            ApproximationStatus::Drifting => 1,
            ApproximationStatus::InsufficientData => 2,
            ApproximationStatus::Error => 3,
        };
        self.groups
            .values()
            .map(|r| r.status())
            .max_by_key(|s| rank(*s))
            .unwrap_or(ApproximationStatus::Stable)
    }
}
