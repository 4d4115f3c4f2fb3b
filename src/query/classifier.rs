/// Query classification: decides which execution path a request takes.
/// Pure function of the query text and the caller's options.
use super::{parse_query, Query};
use crate::error::AqeResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Execution path chosen for a query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    Exact,
    RandomSample,
    CltApproximation,
    EmbeddedApprox,
    BlockSample,
}

impl QueryType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::RandomSample => "random_sample",
            Self::CltApproximation => "clt_approximation",
            Self::EmbeddedApprox => "embedded_approx",
            Self::BlockSample => "block_sample",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-supplied options that influence classification
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOptions {
    pub sample_percent: Option<f64>,
    pub error_threshold: Option<f64>,
    pub block_size: Option<usize>,
}

/// Outcome of classifying one query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub query_type: QueryType,
    /// Query text with every `APPROX(...)` marker replaced by its argument
    pub cleaned_text: String,
    pub query: Query,
}

fn approx_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)\bAPPROX\s*\(").expect("static regex is valid"))
}

/// Replace each `APPROX(f)` with `f`. Returns the cleaned text and whether
/// any marker was present. Parentheses are matched so nested calls survive.
pub fn strip_approx_marker(text: &str) -> (String, bool) {
    let mut cleaned = text.to_string();
    let mut found = false;

    while let Some(m) = approx_marker().find(&cleaned) {
        let open = m.end() - 1;
        let Some(close) = matching_paren(&cleaned, open) else {
            break;
        };
        let inner = cleaned[open + 1..close].trim().to_string();
        cleaned.replace_range(m.start()..=close, &inner);
        found = true;
    }

    (cleaned, found)
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Classify a query. Priority: embedded marker > sample percent > error
/// threshold > block size > exact. Fails with `UnsupportedQuery` when the
/// cleaned text does not parse to a supported aggregate.
pub fn classify(text: &str, options: &ClassifierOptions) -> AqeResult<Classification> {
    let (cleaned_text, embedded) = strip_approx_marker(text);

    let mut query = parse_query(&cleaned_text)?;
    query.embedded_approx = embedded;

    let query_type = if embedded {
        QueryType::EmbeddedApprox
    } else if options.sample_percent.is_some() {
        QueryType::RandomSample
    } else if options.error_threshold.is_some() {
        QueryType::CltApproximation
    } else if options.block_size.map_or(false, |size| size > 0) {
        QueryType::BlockSample
    } else {
        QueryType::Exact
    };

    tracing::debug!("Classified '{}' as {}", text, query_type);

    Ok(Classification {
        query_type,
        cleaned_text,
        query,
    })
}
