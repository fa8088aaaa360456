//! Turning a race outcome into response side effects and a label.

use axum::http::{HeaderName, HeaderValue, StatusCode};

use crate::filters::time_limiter::race::RaceOutcome;
use crate::observability::metrics;
use crate::pipeline::{HttpContext, PipelineError};

/// Label returned when the deadline won.
pub const RESULT_TIMEOUT: &str = "timeout";

/// Marker header set on timed-out responses.
pub const TIME_LIMITER_HEADER: &str = "x-time-limiter";

/// Value of the marker header.
pub const TIMED_OUT: &str = "timed-out";

/// Diagnostic tag attached to timed-out requests.
pub const TIMEOUT_TAG: &str = "time-limiter: timed out";

/// Applies the outcome of one race to the request it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ResultFinalizer<'a> {
    filter: &'a str,
    rule: &'a str,
}

impl<'a> ResultFinalizer<'a> {
    pub fn new(filter: &'a str, rule: &'a str) -> Self {
        Self { filter, rule }
    }

    /// `Completed` passes the continuation's result through untouched.
    /// `TimedOut` marks the outer response and returns [`RESULT_TIMEOUT`],
    /// discarding whatever the continuation produced, errors included.
    pub fn finalize(
        self,
        outcome: RaceOutcome<Result<String, PipelineError>>,
        ctx: &mut HttpContext,
    ) -> Result<String, PipelineError> {
        let late = match outcome {
            RaceOutcome::Completed(result) => return result,
            RaceOutcome::TimedOut(late) => late,
        };

        if let Err(e) = &late {
            tracing::debug!(
                request_id = %ctx.request_id(),
                filter = %self.filter,
                error = %e,
                "Continuation error superseded by timeout"
            );
        }

        ctx.add_tag(TIMEOUT_TAG);
        tracing::info!(
            request_id = %ctx.request_id(),
            filter = %self.filter,
            url = %self.rule,
            "Time limiter timed out"
        );
        ctx.set_status(StatusCode::REQUEST_TIMEOUT);
        ctx.set_header(
            HeaderName::from_static(TIME_LIMITER_HEADER),
            HeaderValue::from_static(TIMED_OUT),
        );
        metrics::record_timeout(self.filter, self.rule);

        Ok(RESULT_TIMEOUT.to_string())
    }
}
