/// Configuration management
/// All knobs of the execution core live here; the CLI can load an override
/// file in JSON form.
use crate::error::{AqeError, AqeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling executor configuration
    pub sampling: SamplingConfig,

    /// CLT path configuration
    pub clt: CltConfig,

    /// Adaptive validator configuration
    pub adaptive: AdaptiveConfig,

    /// Method selector configuration
    pub selector: SelectorConfig,

    /// Grouped execution configuration
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Above this many records the memory-stride tier is used
    pub large_dataset_threshold: usize,

    /// Above this many records (and up to the large threshold) direct access is used
    pub medium_dataset_threshold: usize,

    /// Sample percent used when a strategy is chosen without an explicit percent
    pub default_sample_percent: f64,

    /// Block size for block sampling
    pub default_block_size: usize,

    /// Confidence level for intervals reported by random and block sampling
    pub confidence_level: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CltConfig {
    /// Target confidence of the dual-pointer scan
    pub confidence_level: f64,

    /// Samples between convergence checks inside the dual-pointer scan
    pub check_interval: usize,

    /// Worker threads of the dual-pointer scan
    pub thread_count: usize,

    /// Error threshold (percent) used when APPROX(...) resolves to the CLT method
    pub embedded_error_threshold: f64,

    /// Classify CLT results as STABLE/DRIFTING instead of always reporting STABLE
    pub classify_status: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Sample percent of the first collect pass
    pub initial_sample_percent: f64,

    /// Sample-size ceiling (percent)
    pub max_sample_percent: f64,

    /// Multiplier applied to the sample percent when suggesting a larger sample
    pub growth_factor: f64,

    /// Populations below this size are too small to sample meaningfully
    pub min_population: usize,

    /// Target relative error (percent) when the caller supplies none
    pub error_threshold: f64,

    /// Re-invoke the validator with the suggested sample while DRIFTING
    pub escalate: bool,

    /// Upper bound on validator passes when escalating
    pub max_rounds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// SUM/COUNT over more records than this get the size-aware method
    pub size_aware_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of threads for parallel (grouped) execution
    pub thread_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            clt: CltConfig::default(),
            adaptive: AdaptiveConfig::default(),
            selector: SelectorConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            large_dataset_threshold: 50_000,
            medium_dataset_threshold: 10_000,
            default_sample_percent: 10.0,
            default_block_size: 1000,
            confidence_level: 0.95,
        }
    }
}

impl Default for CltConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            check_interval: 10,
            thread_count: 4,
            embedded_error_threshold: 2.0,
            classify_status: false,
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_sample_percent: 10.0,
            max_sample_percent: 50.0,
            growth_factor: 2.0,
            min_population: 30,
            error_threshold: 5.0,
            escalate: false,
            max_rounds: 4,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            size_aware_threshold: 100_000,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            thread_count: num_cpus::get(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the executors cannot work with
    pub fn validate(&self) -> AqeResult<()> {
        let s = &self.sampling;
        if s.medium_dataset_threshold > s.large_dataset_threshold {
            return Err(AqeError::invalid(format!(
                "medium_dataset_threshold ({}) exceeds large_dataset_threshold ({})",
                s.medium_dataset_threshold, s.large_dataset_threshold
            )));
        }
        check_percent("sampling.default_sample_percent", s.default_sample_percent)?;
        check_confidence("sampling.confidence_level", s.confidence_level)?;
        if s.default_block_size == 0 {
            return Err(AqeError::invalid("sampling.default_block_size must be positive"));
        }

        check_confidence("clt.confidence_level", self.clt.confidence_level)?;
        check_threshold("clt.embedded_error_threshold", self.clt.embedded_error_threshold)?;
        if self.clt.thread_count == 0 || self.clt.check_interval == 0 {
            return Err(AqeError::invalid(
                "clt.thread_count and clt.check_interval must be positive",
            ));
        }

        let a = &self.adaptive;
        check_percent("adaptive.initial_sample_percent", a.initial_sample_percent)?;
        check_percent("adaptive.max_sample_percent", a.max_sample_percent)?;
        check_threshold("adaptive.error_threshold", a.error_threshold)?;
        if a.initial_sample_percent > a.max_sample_percent {
            return Err(AqeError::invalid(
                "adaptive.initial_sample_percent exceeds adaptive.max_sample_percent",
            ));
        }
        if a.growth_factor <= 1.0 {
            return Err(AqeError::invalid("adaptive.growth_factor must be greater than 1"));
        }

        if self.execution.thread_count == 0 {
            return Err(AqeError::invalid("execution.thread_count must be positive"));
        }
        Ok(())
    }
}

/// Sample percents live in (0, 100]
pub fn check_percent(name: &str, percent: f64) -> AqeResult<()> {
    if percent.is_finite() && percent > 0.0 && percent <= 100.0 {
        Ok(())
    } else {
        Err(AqeError::invalid(format!("{name} must be in (0, 100], got {percent}")))
    }
}

/// Confidence levels live in (0, 1)
pub fn check_confidence(name: &str, confidence: f64) -> AqeResult<()> {
    if confidence.is_finite() && confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(AqeError::invalid(format!("{name} must be in (0, 1), got {confidence}")))
    }
}

/// Error thresholds are positive percentages
pub fn check_threshold(name: &str, threshold: f64) -> AqeResult<()> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(AqeError::invalid(format!("{name} must be positive, got {threshold}")))
    }
}
