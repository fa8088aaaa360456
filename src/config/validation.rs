//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses parse and the log level is a valid filter directive
//! - Check filter names are unique and kinds are registered
//! - Dry-run every filter's `init` against its spec
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Dry-run instances are closed right away and never serve traffic
//! - With `strict_validation` the dry run rejects invalid durations;
//!   without it those fall back to defaults at init and pass here

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::{FilterConfig, ServerConfig};
use crate::pipeline::{FilterError, FilterRegistry, FilterSpec};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("observability.log_level: {0:?} is not a valid filter directive")]
    InvalidLogLevel(String),

    #[error("pipeline.name must not be empty")]
    EmptyPipelineName,

    #[error("pipeline.filters[{0}].name must not be empty")]
    EmptyFilterName(usize),

    #[error("duplicate filter name {0:?}")]
    DuplicateFilterName(String),

    #[error("filter {name:?}: unknown kind {kind:?}")]
    UnknownKind { name: String, kind: String },

    #[error("filter {name:?} ({kind}): {source}")]
    InvalidFilter {
        name: String,
        kind: String,
        #[source]
        source: FilterError,
    },
}

/// Validate a parsed configuration against the filter kinds in `registry`.
pub fn validate_config(
    config: &ServerConfig,
    registry: &FilterRegistry,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }
    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    let pipeline = &config.pipeline;
    if pipeline.name.trim().is_empty() {
        errors.push(ValidationError::EmptyPipelineName);
    }

    let mut names = HashSet::new();
    for (index, filter) in pipeline.filters.iter().enumerate() {
        if filter.name.trim().is_empty() {
            errors.push(ValidationError::EmptyFilterName(index));
        } else if !names.insert(filter.name.as_str()) {
            errors.push(ValidationError::DuplicateFilterName(filter.name.clone()));
        }

        if let Err(e) = dry_run(&pipeline.name, pipeline.strict_validation, filter, registry) {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn dry_run(
    pipeline: &str,
    strict: bool,
    config: &FilterConfig,
    registry: &FilterRegistry,
) -> Result<(), ValidationError> {
    let filter = registry
        .create(&config.kind)
        .ok_or_else(|| ValidationError::UnknownKind {
            name: config.name.clone(),
            kind: config.kind.clone(),
        })?;

    let result = filter.init(&FilterSpec::new(pipeline, strict, config));
    filter.close();
    result.map_err(|source| ValidationError::InvalidFilter {
        name: config.name.clone(),
        kind: config.kind.clone(),
        source,
    })
}
