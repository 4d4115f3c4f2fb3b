/// Execution core: exact, sampled, CLT and adaptive paths over an injected
/// storage engine, plus grouped execution and the shared result model.
pub mod result;
pub mod estimator;
pub mod sampling;
pub mod clt;
pub mod exact;
pub mod adaptive;
pub mod grouped;

pub use result::*;
pub use estimator::*;
pub use sampling::*;
pub use clt::*;
pub use exact::*;
pub use adaptive::*;
pub use grouped::*;

use crate::query::{Query, SamplingMethod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a request is answered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Exact,
    Random,
    Clt,
    Block,
    Adaptive,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Random => "random",
            Self::Clt => "clt",
            Self::Block => "block",
            Self::Adaptive => "adaptive",
        }
    }

    /// Strategy that runs a sampling method. Parallel and size-aware sampling
    /// both go through the size-tiered random path.
    pub fn for_method(method: SamplingMethod) -> Self {
        match method {
            SamplingMethod::Random | SamplingMethod::Parallel | SamplingMethod::Revolutionary => {
                Self::Random
            }
            SamplingMethod::Clt => Self::Clt,
            SamplingMethod::Block => Self::Block,
            SamplingMethod::Adaptive => Self::Adaptive,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParameters {
    /// Percent of records to sample; executors fall back to their configured default
    pub sample_percent: Option<f64>,
    /// Target relative error in percent (CLT and adaptive paths)
    pub error_threshold: Option<f64>,
    pub confidence_level: f64,
    pub thread_count: usize,
    pub block_size: Option<usize>,
}

impl Default for ExecutionParameters {
    fn default() -> Self {
        Self {
            sample_percent: None,
            error_threshold: None,
            confidence_level: 0.95,
            thread_count: 4,
            block_size: None,
        }
    }
}

/// One invocation of the core. Built per request, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub query: Query,
    pub db_path: PathBuf,
    pub strategy: Strategy,
    pub parameters: ExecutionParameters,
    /// Sampling method the caller asked for, used to label results
    pub method: Option<SamplingMethod>,
}

impl ExecutionRequest {
    pub fn new(query: Query, db_path: impl Into<PathBuf>, strategy: Strategy) -> Self {
        Self {
            query,
            db_path: db_path.into(),
            strategy,
            parameters: ExecutionParameters::default(),
            method: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ExecutionParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_method(mut self, method: SamplingMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Display name of the method behind this request
    pub fn method_label(&self) -> &'static str {
        match (self.method, self.strategy) {
            (Some(method), _) => method.info().name,
            (None, Strategy::Exact) => "Exact",
            (None, Strategy::Random) => SamplingMethod::Random.info().name,
            (None, Strategy::Clt) => SamplingMethod::Clt.info().name,
            (None, Strategy::Block) => SamplingMethod::Block.info().name,
            (None, Strategy::Adaptive) => SamplingMethod::Adaptive.info().name,
        }
    }
}
