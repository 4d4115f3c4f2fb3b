/// Approximate query engine
/// Classifies a query, picks the execution path, runs it against the injected
/// storage engine and optionally compares the answer with the exact one.
use crate::config::EngineConfig;
use crate::error::AqeResult;
use crate::execution::{
    AdaptiveValidator, CltExecutor, EstimationResult, ExactExecutor, ExecutionParameters,
    ExecutionRequest, GroupedEstimationResult, GroupedExecutor, SamplingExecutor, Strategy,
};
use crate::query::{classify, Classification, ClassifierOptions, MethodSelector, QueryType, SamplingMethod};
use crate::storage::{acquire, Dataset, StorageEngine};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Caller options for one query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub sample_percent: Option<f64>,
    pub error_threshold: Option<f64>,
    pub block_size: Option<usize>,
    /// Explicit sampling method; overrides the classified path
    pub method: Option<SamplingMethod>,
    pub confidence_level: Option<f64>,
    pub thread_count: Option<usize>,
    /// Also run the exact query and report the actual error
    pub compare: bool,
}

impl QueryOptions {
    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            sample_percent: self.sample_percent,
            error_threshold: self.error_threshold,
            block_size: self.block_size,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    Scalar(EstimationResult),
    Grouped(GroupedEstimationResult),
}

impl Answer {
    pub fn execution_time(&self) -> Duration {
        match self {
            Self::Scalar(result) => result.execution_time,
            Self::Grouped(result) => result.execution_time,
        }
    }

    pub fn method_name(&self) -> &str {
        match self {
            Self::Scalar(result) => &result.method_name,
            Self::Grouped(result) => &result.method_name,
        }
    }

    pub fn as_scalar(&self) -> Option<&EstimationResult> {
        match self {
            Self::Scalar(result) => Some(result),
            Self::Grouped(_) => None,
        }
    }

    pub fn as_grouped(&self) -> Option<&GroupedEstimationResult> {
        match self {
            Self::Grouped(result) => Some(result),
            Self::Scalar(_) => None,
        }
    }
}

/// Approximate vs exact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub exact: Answer,
    /// Relative error in percent; the mean over shared groups for grouped answers
    pub actual_error_percent: Option<f64>,
    /// Exact time over approximate time
    pub speedup: Option<f64>,
}

impl Comparison {
    pub fn new(approximate: &Answer, exact: Answer) -> Self {
        let actual_error_percent = match (approximate, &exact) {
            (Answer::Scalar(a), Answer::Scalar(e)) => match (a.value(), e.value()) {
                (Some(a), Some(e)) => error_percent(a, e),
                _ => None,
            },
            (Answer::Grouped(a), Answer::Grouped(e)) => {
                let errors: Vec<f64> = a
                    .groups
                    .iter()
                    .filter_map(|(key, group)| error_percent(group.value()?, e.value(*key)?))
                    .collect();
                (!errors.is_empty()).then(|| errors.iter().sum::<f64>() / errors.len() as f64)
            }
            _ => None,
        };

        let approx_time = approximate.execution_time().as_secs_f64();
        let speedup =
            (approx_time > 0.0).then(|| exact.execution_time().as_secs_f64() / approx_time);

        Self {
            exact,
            actual_error_percent,
            speedup,
        }
    }
}

fn error_percent(approximate: f64, exact: f64) -> Option<f64> {
    if exact != 0.0 {
        Some((approximate - exact).abs() / exact.abs() * 100.0)
    } else if approximate == 0.0 {
        Some(0.0)
    } else {
        None
    }
}

/// Everything one query produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query_text: String,
    pub classification: Classification,
    pub db_path: PathBuf,
    pub dataset_size: usize,
    pub strategy: Strategy,
    /// Method that ran, `None` for exact queries
    pub method: Option<SamplingMethod>,
    pub recommendation: SamplingMethod,
    pub answer: Answer,
    pub comparison: Option<Comparison>,
}

impl QueryOutcome {
    /// The recommended method differs from the one that ran
    pub fn recommendation_differs(&self) -> bool {
        self.method != Some(self.recommendation)
    }
}

/// Entry point of the execution core. The storage engine is injected here and
/// every request acquires and releases its own dataset.
pub struct ApproxQueryEngine<S: StorageEngine> {
    storage: S,
    config: EngineConfig,
    selector: MethodSelector,
}

impl<S: StorageEngine> ApproxQueryEngine<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        let selector = MethodSelector::new(config.selector.clone());
        Self {
            storage,
            config,
            selector,
        }
    }

    pub fn with_default_config(storage: S) -> Self {
        Self::new(storage, EngineConfig::default())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current record count. Read per call, never cached.
    pub fn dataset_size(&self, db_path: &Path) -> AqeResult<usize> {
        let dataset = acquire(&self.storage, db_path)?;
        Ok(dataset.total_records())
    }

    /// Classify, run and optionally compare one query
    pub fn execute(
        &self,
        text: &str,
        db_path: impl AsRef<Path>,
        options: &QueryOptions,
    ) -> AqeResult<QueryOutcome> {
        let db_path = db_path.as_ref();
        let classification = classify(text, &options.classifier_options())
            .map_err(|e| e.with_query(text))?;
        let dataset_size = self.dataset_size(db_path)?;
        let recommendation = self.selector.recommend(&classification.query, Some(dataset_size));

        let (strategy, method) = self.resolve(&classification, options, recommendation);
        let mut request = ExecutionRequest::new(classification.query.clone(), db_path, strategy)
            .with_parameters(self.parameters(strategy, &classification, options));
        request.method = method;

        tracing::debug!(
            "Running {} as {} (method: {:?}, recommended: {})",
            classification.cleaned_text,
            strategy,
            method,
            recommendation
        );
        let answer = self.run(&request)?;

        let comparison = if options.compare && strategy != Strategy::Exact {
            let exact_request = ExecutionRequest {
                strategy: Strategy::Exact,
                method: None,
                ..request.clone()
            };
            let exact = self.run(&exact_request)?;
            Some(Comparison::new(&answer, exact))
        } else {
            None
        };

        Ok(QueryOutcome {
            query_text: text.to_string(),
            classification,
            db_path: db_path.to_path_buf(),
            dataset_size,
            strategy,
            method,
            recommendation,
            answer,
            comparison,
        })
    }

    /// Dispatch a prepared request to its executor
    pub fn run(&self, request: &ExecutionRequest) -> AqeResult<Answer> {
        if request.query.is_grouped() {
            let grouped = GroupedExecutor::new(self.config.clone()).execute(&self.storage, request)?;
            return Ok(Answer::Grouped(grouped));
        }

        let result = match request.strategy {
            Strategy::Exact => ExactExecutor::new().execute(&self.storage, request)?,
            Strategy::Random | Strategy::Block => {
                SamplingExecutor::new(self.config.sampling.clone()).execute(&self.storage, request)?
            }
            Strategy::Clt => {
                CltExecutor::new(self.config.clt.clone()).execute(&self.storage, request)?
            }
            Strategy::Adaptive => AdaptiveValidator::new(
                self.config.adaptive.clone(),
                self.config.sampling.clone(),
            )
            .run(&self.storage, request)?,
        };
        Ok(Answer::Scalar(result))
    }

    /// Strategy and method for a classified query. APPROX(...) takes the
    /// explicit method or the recommendation; an explicit method otherwise
    /// overrides the classified path.
    fn resolve(
        &self,
        classification: &Classification,
        options: &QueryOptions,
        recommendation: SamplingMethod,
    ) -> (Strategy, Option<SamplingMethod>) {
        let method = match (classification.query_type, options.method) {
            (QueryType::EmbeddedApprox, method) => Some(method.unwrap_or(recommendation)),
            (_, Some(method)) => Some(method),
            (QueryType::RandomSample, None) => Some(SamplingMethod::Random),
            (QueryType::CltApproximation, None) => Some(SamplingMethod::Clt),
            (QueryType::BlockSample, None) => Some(SamplingMethod::Block),
            (QueryType::Exact, None) => None,
        };
        let strategy = method.map(Strategy::for_method).unwrap_or(Strategy::Exact);
        (strategy, method)
    }

    fn parameters(
        &self,
        strategy: Strategy,
        classification: &Classification,
        options: &QueryOptions,
    ) -> ExecutionParameters {
        let default_confidence = match strategy {
            Strategy::Clt => self.config.clt.confidence_level,
            _ => self.config.sampling.confidence_level,
        };
        let default_threads = match strategy {
            Strategy::Clt if !classification.query.is_grouped() => self.config.clt.thread_count,
            _ => self.config.execution.thread_count,
        };

        ExecutionParameters {
            sample_percent: options.sample_percent,
            error_threshold: options.error_threshold,
            confidence_level: options.confidence_level.unwrap_or(default_confidence),
            thread_count: options.thread_count.unwrap_or(default_threads),
            block_size: options.block_size,
        }
    }
}
