//! TimeLimiter: per-URL request deadlines.
//!
//! # Data Flow
//! ```text
//! Request
//!     → rules.rs (first matching rule, or none)
//!         none  → next.run(ctx), label passed through untouched
//!         rule  → race.rs (timer vs. next.run(ctx))
//!               → finalize.rs (408 + marker header + tag on timeout)
//!     → label
//! ```
//!
//! # Design Decisions
//! - The rule set is swapped atomically on (re)configuration; a request
//!   uses the generation it loaded for its whole lifetime
//! - Nothing carries over between generations, so `inherit` is `init`
//! - The filter owns no resources; `close` does nothing

pub mod finalize;
pub mod race;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;

use crate::pipeline::{Filter, FilterError, FilterSpec, HttpContext, Next, PipelineError};

pub use finalize::{ResultFinalizer, RESULT_TIMEOUT, TIMED_OUT, TIME_LIMITER_HEADER};
pub use race::{DeadlineRace, RaceOutcome};
pub use rules::{RuleSet, TimeLimiterSpec, TimeoutRule, UrlTimeoutSpec, DEFAULT_TIMEOUT};

pub const KIND: &str = "TimeLimiter";

const RESULTS: &[&str] = &[RESULT_TIMEOUT];

#[derive(Debug, Default)]
struct Generation {
    name: String,
    rules: RuleSet,
}

/// Enforces per-URL deadlines on the rest of the pipeline.
#[derive(Debug)]
pub struct TimeLimiter {
    current: ArcSwap<Generation>,
}

impl TimeLimiter {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Generation::default()),
        }
    }

    /// The timeout that would govern this request, if any rule matches.
    pub fn timeout_for(&self, req: &Request<Body>) -> Option<Duration> {
        self.current.load().rules.select(req).map(TimeoutRule::timeout)
    }

    /// Number of rules in the active generation.
    pub fn rule_count(&self) -> usize {
        self.current.load().rules.len()
    }
}

impl Default for TimeLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for TimeLimiter {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "TimeLimiter implements a time limiter for http request."
    }

    fn results(&self) -> &'static [&'static str] {
        RESULTS
    }

    fn default_spec(&self) -> toml::Table {
        let spec = TimeLimiterSpec {
            default_timeout_duration: Some(format!("{}ms", DEFAULT_TIMEOUT.as_millis())),
            urls: Vec::new(),
        };
        match toml::Value::try_from(spec) {
            Ok(toml::Value::Table(table)) => table,
            _ => toml::Table::new(),
        }
    }

    fn init(&self, spec: &FilterSpec) -> Result<(), FilterError> {
        let limiter_spec: TimeLimiterSpec = spec.decode()?;
        let rules = RuleSet::build(&limiter_spec, spec.strict())?;

        tracing::debug!(
            pipeline = %spec.pipeline(),
            filter = %spec.name(),
            rules = rules.len(),
            default_timeout = ?rules.default_timeout(),
            "Time limiter configured"
        );

        self.current.store(Arc::new(Generation {
            name: spec.name().to_string(),
            rules,
        }));
        Ok(())
    }

    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<String, PipelineError> {
        let generation = self.current.load_full();

        let Some(rule) = generation.rules.select(ctx.request()) else {
            return next.run(ctx).await;
        };

        let cancel = ctx.cancel_handle().clone();
        let outcome = DeadlineRace::new(rule.timeout())
            .run(&cancel, next.run(ctx))
            .await;

        ResultFinalizer::new(&generation.name, rule.id()).finalize(outcome, ctx)
    }
}
