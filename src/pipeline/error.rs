//! Pipeline error types.

use thiserror::Error;

use crate::config::duration::DurationError;
use crate::pipeline::context::CancelReason;
use crate::routing::RuleError;

/// Failure of a request travelling through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("filter {filter} failed: {message}")]
    Filter { filter: String, message: String },
}

/// A filter rejected its spec.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid spec: {0}")]
    Spec(#[from] toml::de::Error),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("invalid {field} {literal:?}: {source}")]
    Duration {
        field: String,
        literal: String,
        #[source]
        source: DurationError,
    },

    #[error("{field} must be positive, got {literal:?}")]
    NonPositiveDuration { field: String, literal: String },

    #[error("{0}")]
    Invalid(String),
}

/// Building a pipeline from configuration failed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unknown filter kind {kind:?} for filter {name:?}")]
    UnknownKind { name: String, kind: String },

    #[error("duplicate filter name {0:?}")]
    DuplicateName(String),

    #[error("filter {name:?} ({kind}): {source}")]
    Init {
        name: String,
        kind: String,
        #[source]
        source: FilterError,
    },
}
