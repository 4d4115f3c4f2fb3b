/// Sampling method recommendation
/// Advisory only: the engine surfaces the recommendation when it differs from
/// the method actually used, and falls back to it for APPROX(...) queries.
use super::{AggregateFunction, Query};
use crate::config::SelectorConfig;
use crate::error::AqeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplingMethod {
    Random,
    Clt,
    Block,
    Adaptive,
    Parallel,
    /// Size-aware: delegates to the fastest access tier for the dataset size
    Revolutionary,
}

/// Catalogue entry describing a method, used by `--explain`
#[derive(Clone, Copy, Debug)]
pub struct MethodInfo {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub best_for: &'static str,
    pub accuracy: &'static str,
    pub speed: &'static str,
}

impl SamplingMethod {
    pub const ALL: [SamplingMethod; 6] = [
        SamplingMethod::Random,
        SamplingMethod::Clt,
        SamplingMethod::Block,
        SamplingMethod::Adaptive,
        SamplingMethod::Parallel,
        SamplingMethod::Revolutionary,
    ];

    pub fn key(&self) -> &'static str {
        self.info().key
    }

    pub fn info(&self) -> MethodInfo {
        match self {
            Self::Random => MethodInfo {
                key: "random",
                name: "Random Sampling",
                description: "Randomly samples specified percentage of data",
                best_for: "Quick estimates, large datasets",
                accuracy: "Good",
                speed: "Very Fast",
            },
            Self::Clt => MethodInfo {
                key: "clt",
                name: "Central Limit Theorem",
                description: "Uses CLT for statistical confidence in results",
                best_for: "High accuracy, SUM/COUNT queries",
                accuracy: "Excellent",
                speed: "Fast",
            },
            Self::Block => MethodInfo {
                key: "block",
                name: "Block Sampling",
                description: "Samples contiguous blocks of data",
                best_for: "Temporal data, cache-friendly access",
                accuracy: "Good",
                speed: "Fast",
            },
            Self::Adaptive => MethodInfo {
                key: "adaptive",
                name: "Adaptive Sampling",
                description: "Validates the estimate against an error target",
                best_for: "General purpose, automatic optimization",
                accuracy: "Very Good",
                speed: "Variable",
            },
            Self::Parallel => MethodInfo {
                key: "parallel",
                name: "Parallel Sampling",
                description: "Multi-threaded sampling for faster processing",
                best_for: "Large datasets, multi-core systems",
                accuracy: "Good",
                speed: "Very Fast",
            },
            Self::Revolutionary => MethodInfo {
                key: "revolutionary",
                name: "Revolutionary Sampling",
                description: "Picks the access tier from the dataset size",
                best_for: "Maximum performance, adaptive to dataset size",
                accuracy: "Very Good",
                speed: "Extremely Fast",
            },
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SamplingMethod {
    type Err = AqeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|method| method.key() == key)
            .ok_or_else(|| AqeError::invalid(format!("Unknown sampling method '{}'", s)))
    }
}

/// Recommends a sampling method from the query shape and dataset size
#[derive(Clone, Debug, Default)]
pub struct MethodSelector {
    config: SelectorConfig,
}

impl MethodSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// First match wins:
    /// 1. SUM/COUNT over a large dataset -> size-aware
    /// 2. SUM/COUNT otherwise (including unknown size) -> CLT
    /// 3. AVG -> random
    ///
    /// The GROUP BY -> parallel and adaptive fallbacks only apply to queries
    /// without a recognised aggregate, which the parser already rejects; grouped
    /// queries run on the parallel grouped executor whatever the recommendation.
    pub fn recommend(&self, query: &Query, dataset_size: Option<usize>) -> SamplingMethod {
        let method = match query.function {
            AggregateFunction::Sum | AggregateFunction::Count => match dataset_size {
                Some(size) if size > self.config.size_aware_threshold => {
                    SamplingMethod::Revolutionary
                }
                _ => SamplingMethod::Clt,
            },
            AggregateFunction::Avg => SamplingMethod::Random,
        };

        tracing::debug!(
            "Recommended {} for {} (dataset size: {:?})",
            method,
            query,
            dataset_size
        );
        method
    }
}
