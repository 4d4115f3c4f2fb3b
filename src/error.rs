/// Unified error types for the approximate query engine
/// Every variant aborts the request it was raised in; quality problems that
/// should not abort (drift, too little data) are reported through
/// `ApproximationStatus` instead.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AqeError {
    /// Neither opening the native store nor importing the file succeeded
    #[error("Dataset unavailable: {path} (open: {open_error}; load: {load_error})")]
    DatasetUnavailable {
        path: PathBuf,
        open_error: String,
        load_error: String,
    },

    /// The query text could not be reduced to a supported aggregate
    #[error("Unsupported query: {message}")]
    UnsupportedQuery {
        message: String,
        query: Option<String>,
    },

    /// A sampling primitive returned no records for a non-zero request
    #[error("Empty sample: {method} returned no records for a {percent}% request")]
    EmptySample {
        method: String,
        percent: f64,
    },

    /// Variance and confidence intervals need at least two values
    #[error("Insufficient sample: {samples} value(s), at least 2 are required for a confidence interval")]
    InsufficientSample {
        samples: usize,
    },

    /// Caller-supplied parameter outside its valid range
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        message: String,
    },

    /// Storage failure after the dataset was opened
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AqeError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedQuery {
            message: message.into(),
            query: None,
        }
    }

    pub fn unsupported_query(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::UnsupportedQuery {
            message: message.into(),
            query: Some(query.into()),
        }
    }

    pub fn empty_sample(method: impl Into<String>, percent: f64) -> Self {
        Self::EmptySample {
            method: method.into(),
            percent,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Attach the offending query text to an `UnsupportedQuery` error
    pub fn with_query(mut self, text: impl Into<String>) -> Self {
        if let Self::UnsupportedQuery { query, .. } = &mut self {
            if query.is_none() {
                *query = Some(text.into());
            }
        }
        self
    }
}

/// Errors raised by storage engines
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Dataset not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Corrupt dataset {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl StorageError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for engine operations
pub type AqeResult<T> = Result<T, AqeError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
