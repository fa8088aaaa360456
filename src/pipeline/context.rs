//! Per-request context shared by all filters of a pipeline.
//!
//! # Responsibilities
//! - Own the inbound request and the outer response for one request
//! - Carry the request ID and diagnostic tags
//! - Carry the cancellation signal downstream filters observe
//!
//! # Design Decisions
//! - Cancellation is cooperative: triggering the signal never unwinds a
//!   filter, it only wakes whoever awaits [`CancelHandle::cancelled`]
//! - The signal is set at most once; the first reason sticks

use std::fmt;
use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::http::request::X_REQUEST_ID;

/// Why a request was told to abort.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelReason {
    /// A time limiter deadline passed.
    #[default]
    Timeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Timeout => f.write_str("timeout"),
        }
    }
}

/// Cloneable handle on a request's cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal. Returns true if this call set it.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason the signal was triggered with, if it was.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    /// Wait until the signal is triggered.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason().unwrap_or_default()
    }

    /// A child token for lower layers that only understand tokens.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// State of one request as it travels through the pipeline.
#[derive(Debug)]
pub struct HttpContext {
    request: Request<Body>,
    response: Response<Body>,
    request_id: String,
    tags: Vec<String>,
    cancel: CancelHandle,
}

impl HttpContext {
    pub fn new(request: Request<Body>) -> Self {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            request,
            response: Response::new(Body::empty()),
            request_id,
            tags: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    /// Take the request body, leaving an empty one behind.
    pub fn take_request_body(&mut self) -> Body {
        std::mem::take(self.request.body_mut())
    }

    pub fn response(&self) -> &Response<Body> {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response<Body> {
        &mut self.response
    }

    pub fn set_status(&mut self, status: StatusCode) {
        *self.response.status_mut() = status;
    }

    /// Set a response header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response.headers_mut().insert(name, value);
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn into_response(self) -> Response<Body> {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_sticks() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        assert_eq!(handle.reason(), None);

        assert!(handle.cancel(CancelReason::Timeout));
        assert!(!handle.cancel(CancelReason::Timeout));
        assert!(handle.is_cancelled());
        assert_eq!(handle.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test]
    async fn test_clones_share_the_signal() {
        let handle = CancelHandle::new();
        let observer = handle.clone();
        let child = handle.child_token();

        let waiter = tokio::spawn(async move { observer.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel(CancelReason::Timeout);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, CancelReason::Timeout);
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_context_reads_request_id_and_sets_headers() {
        let request = Request::builder()
            .uri("/a")
            .header(X_REQUEST_ID, "req-1")
            .body(Body::from("payload"))
            .unwrap();
        let mut ctx = HttpContext::new(request);
        assert_eq!(ctx.request_id(), "req-1");
        assert_eq!(ctx.response().status(), StatusCode::OK);

        let name = HeaderName::from_static("x-test");
        ctx.set_header(name.clone(), HeaderValue::from_static("one"));
        ctx.set_header(name.clone(), HeaderValue::from_static("two"));
        assert_eq!(ctx.response().headers().get_all(&name).iter().count(), 1);

        ctx.set_status(StatusCode::ACCEPTED);
        ctx.add_tag("seen");
        assert_eq!(ctx.tags(), ["seen".to_string()]);
        assert_eq!(ctx.into_response().status(), StatusCode::ACCEPTED);
    }
}
