//! Error types for factor-pipeline

use crate::domain::Domain;
use thiserror::Error;

/// Main error type for factor-pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// More than one concrete domain was found while inferring a pipeline's
    /// domain. Carries the conflicting domains sorted by country code.
    #[error("ambiguous pipeline domain, conflicting domains: {0:?}")]
    AmbiguousDomain(Vec<Domain>),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("cycle detected in term graph at {0}")]
    Cycle(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("adjustment error: {0}")]
    Adjustment(String),

    #[error("loader error: {0}")]
    Loader(String),

    #[error("calendar error: {0}")]
    Calendar(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for factor-pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
