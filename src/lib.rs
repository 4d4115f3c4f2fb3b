//! # Approximate Query Engine
//!
//! Answers SUM, COUNT and AVG queries (optionally grouped) over a record
//! store, either exactly or from a sample with a confidence interval.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use approx_query_engine::{ApproxQueryEngine, FileStorageEngine, QueryOptions};
//!
//! let engine = ApproxQueryEngine::with_default_config(FileStorageEngine::new());
//!
//! // CLT approximation within 2% error
//! let options = QueryOptions {
//!     error_threshold: Some(2.0),
//!     ..QueryOptions::default()
//! };
//! let outcome = engine
//!     .execute("SELECT SUM(amount) FROM sales", "sales.db", &options)
//!     .unwrap();
//!
//! if let Some(result) = outcome.answer.as_scalar() {
//!     println!("{:?} ({})", result.value(), result.status());
//! }
//! ```
//!
//! ## Execution paths
//!
//! - **Exact**: full scan, ground truth for comparisons
//! - **Random / Block**: size-tiered sampling with scaled estimates
//! - **CLT**: error threshold mapped to a sample percent, dual-pointer scan
//! - **Adaptive**: one collect-and-classify pass reporting STABLE / DRIFTING / INSUFFICIENT_DATA
//! - **Embedded**: `APPROX(...)` in the query text picks the recommended method

pub mod error;
pub mod config;
pub mod query;
pub mod storage;
pub mod execution;
pub mod engine;
pub mod result_format;

// Public API - Main types users need
pub use config::EngineConfig;
pub use engine::{Answer, ApproxQueryEngine, Comparison, QueryOptions, QueryOutcome};
pub use error::{AqeError, AqeResult, StorageError};
pub use execution::{
    ApproximationStatus, EstimationResult, ExecutionRequest, GroupedEstimationResult, Strategy,
};
pub use query::{AggregateFunction, Column, Query, QueryType, SamplingMethod};
pub use storage::{Dataset, FileStorageEngine, MemoryStorage, Record, RecordStore, StorageEngine};
