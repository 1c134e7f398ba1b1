use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors that stop a run before it starts, or reject a single input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Malformed origin URL '{input}': {reason}")]
    MalformedOrigin { input: String, reason: String },

    #[error("Malformed URL '{input}': {reason}")]
    MalformedUrl { input: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}' in '{input}'")]
    UnsupportedScheme { input: String, scheme: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid recognizer binding '{binding}': {reason}")]
    InvalidRecognizer { binding: String, reason: String },
}

/// Failure of a single Fetch Gateway call. Always recoverable at run level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Content at {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Blocked fetching {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    #[error("Redirect limit of {limit} exceeded fetching {url}")]
    RedirectLimitExceeded { url: String, limit: usize },
}

/// Failure of one recognizer on one page. Other recognizers on the page still run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    #[error("bad expression '{expression}': {reason}")]
    BadExpression { expression: String, reason: String },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Which run budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    WallClock,
    TotalFetches,
    TotalBytes,
}

impl std::fmt::Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Budget::WallClock => write!(f, "wall-clock"),
            Budget::TotalFetches => write!(f, "total-fetch"),
            Budget::TotalBytes => write!(f, "total-bytes"),
        }
    }
}

/// Recoverable problems collected in `BacklinkResult::errors`, in the order they occurred.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Recognizer '{recognizer}' failed on {url}: {source}")]
    Recognizer {
        url: String,
        recognizer: String,
        #[source]
        source: RecognizerError,
    },

    #[error("{0} budget exhausted; returning partial evidence")]
    BudgetExhausted(Budget),

    #[error("Origin {https} unreachable over HTTPS, retried as {http}")]
    OriginFallback { https: String, http: String },
}

impl RunError {
    pub fn is_budget(&self) -> bool {
        matches!(self, RunError::BudgetExhausted(_))
    }
}

impl Serialize for RunError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
