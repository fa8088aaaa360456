//! The filter contract and the continuation handed to each filter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::schema::FilterConfig;
use crate::observability::metrics;
use crate::pipeline::context::HttpContext;
use crate::pipeline::error::{FilterError, PipelineError};

/// Lifecycle and request contract every filter kind implements.
///
/// An instance is created by the [`FilterRegistry`](crate::pipeline::FilterRegistry),
/// configured with [`init`](Filter::init) (or [`inherit`](Filter::inherit) on
/// reload), shared across concurrent requests, and [`close`](Filter::close)d
/// when its pipeline generation is retired.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Stable kind name used in configuration.
    fn kind(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Labels this filter may return besides the ones its continuation returns.
    fn results(&self) -> &'static [&'static str];

    /// Spec scaffolding for this kind.
    fn default_spec(&self) -> toml::Table;

    fn init(&self, spec: &FilterSpec) -> Result<(), FilterError>;

    /// Configure from a spec, replacing a previous generation of the same
    /// filter. Filters that carry no state across generations just re-init.
    fn inherit(&self, spec: &FilterSpec, _previous: Arc<dyn Filter>) -> Result<(), FilterError> {
        self.init(spec)
    }

    /// Handle one request. Call `next.run(ctx)` to run the rest of the pipeline.
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<String, PipelineError>;

    /// Diagnostic snapshot.
    fn status(&self) -> Option<serde_json::Value> {
        None
    }

    fn close(&self) {}
}

/// The configuration of one filter instance, as handed to [`Filter::init`].
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pipeline: String,
    name: String,
    kind: String,
    strict: bool,
    raw: toml::Table,
}

impl FilterSpec {
    pub fn new(pipeline: &str, strict: bool, config: &FilterConfig) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            name: config.name.clone(),
            kind: config.kind.clone(),
            strict,
            raw: config.spec.clone(),
        }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether invalid values must be rejected rather than defaulted.
    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn raw(&self) -> &toml::Table {
        &self.raw
    }

    /// Decode the kind-specific part of the spec.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FilterError> {
        Ok(toml::Value::Table(self.raw.clone()).try_into()?)
    }
}

/// A named filter in a pipeline.
#[derive(Clone)]
pub struct FilterInstance {
    name: String,
    filter: Arc<dyn Filter>,
}

impl FilterInstance {
    pub fn new(name: impl Into<String>, filter: Arc<dyn Filter>) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &Arc<dyn Filter> {
        &self.filter
    }
}

impl std::fmt::Debug for FilterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterInstance")
            .field("name", &self.name)
            .field("kind", &self.filter.kind())
            .finish()
    }
}

/// The rest of the pipeline after the current filter.
#[derive(Debug, Clone, Copy)]
pub struct Next<'a> {
    pipeline: &'a str,
    filters: &'a [FilterInstance],
}

impl<'a> Next<'a> {
    pub fn new(pipeline: &'a str, filters: &'a [FilterInstance]) -> Self {
        Self { pipeline, filters }
    }

    /// A continuation with nothing left to run.
    pub fn end() -> Next<'static> {
        Next {
            pipeline: "",
            filters: &[],
        }
    }

    /// Run the remaining filters. An exhausted chain returns the empty label.
    pub async fn run(self, ctx: &mut HttpContext) -> Result<String, PipelineError> {
        let Some((head, rest)) = self.filters.split_first() else {
            return Ok(String::new());
        };

        let next = Next {
            pipeline: self.pipeline,
            filters: rest,
        };
        let result = head.filter.handle(ctx, next).await;

        match &result {
            Ok(label) => {
                metrics::record_filter_result(self.pipeline, &head.name, head.filter.kind(), label);
            }
            Err(e) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    filter = %head.name,
                    error = %e,
                    "Filter returned an error"
                );
            }
        }
        result
    }
}
