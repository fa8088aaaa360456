//! Proxy filter: forwards the request to a single upstream server.
//!
//! # Responsibilities
//! - Rewrite the request URI to the upstream authority
//! - Forward via the pooled hyper-util client
//! - Stop waiting for the upstream as soon as the request is cancelled
//!
//! # Design Decisions
//! - Terminal filter: never calls `next`
//! - The response body is streamed back, not buffered
//! - Connection failures are pipeline errors; 5xx answers are results

use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, Request, Response, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};

use crate::pipeline::{Filter, FilterError, FilterSpec, HttpContext, Next, PipelineError};

pub const KIND: &str = "Proxy";

pub const RESULT_SERVER_ERROR: &str = "serverError";

/// Proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// Upstream address, `host:port` or `http://host:port`.
    pub server: String,
}

impl Default for ProxySpec {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:3000".to_string(),
        }
    }
}

fn parse_authority(server: &str) -> Result<Authority, FilterError> {
    let trimmed = server.strip_prefix("http://").unwrap_or(server).trim_end_matches('/');
    Authority::from_str(trimmed)
        .map_err(|e| FilterError::Invalid(format!("invalid server {:?}: {}", server, e)))
}

/// Forwards requests to one upstream.
pub struct Proxy {
    upstream: ArcSwapOption<Authority>,
    client: Client<HttpConnector, Body>,
}

impl Proxy {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            upstream: ArcSwapOption::empty(),
            client,
        }
    }

    fn upstream_request(
        &self,
        ctx: &mut HttpContext,
        authority: &Authority,
    ) -> Result<Request<Body>, PipelineError> {
        let internal = |message: String| PipelineError::Filter {
            filter: KIND.to_string(),
            message,
        };

        let path_and_query = ctx
            .request()
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| internal(format!("bad upstream uri: {}", e)))?;

        let mut builder = Request::builder()
            .method(ctx.request().method().clone())
            .uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in ctx.request().headers() {
                if name != header::HOST {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        builder
            .body(ctx.take_request_body())
            .map_err(|e| internal(format!("bad upstream request: {}", e)))
    }
}

impl Default for Proxy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("upstream", &self.upstream.load())
            .finish()
    }
}

#[async_trait]
impl Filter for Proxy {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "Proxy forwards requests to an upstream server."
    }

    fn results(&self) -> &'static [&'static str] {
        &[RESULT_SERVER_ERROR]
    }

    fn default_spec(&self) -> toml::Table {
        match toml::Value::try_from(ProxySpec::default()) {
            Ok(toml::Value::Table(table)) => table,
            _ => toml::Table::new(),
        }
    }

    fn init(&self, spec: &FilterSpec) -> Result<(), FilterError> {
        let proxy_spec: ProxySpec = spec.decode()?;
        let authority = parse_authority(&proxy_spec.server)?;
        tracing::debug!(filter = %spec.name(), upstream = %authority, "Proxy configured");
        self.upstream.store(Some(Arc::new(authority)));
        Ok(())
    }

    async fn handle(&self, ctx: &mut HttpContext, _next: Next<'_>) -> Result<String, PipelineError> {
        let Some(authority) = self.upstream.load_full() else {
            return Err(PipelineError::Filter {
                filter: KIND.to_string(),
                message: "no upstream configured".to_string(),
            });
        };

        let request = self.upstream_request(ctx, &authority)?;
        let cancel = ctx.cancel_handle().clone();

        let response = tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                tracing::debug!(request_id = %ctx.request_id(), upstream = %authority, %reason, "Upstream call abandoned");
                return Err(PipelineError::Cancelled(reason));
            }
            response = self.client.request(request) => response,
        };

        match response {
            Ok(response) => {
                let status = response.status();
                let (parts, body) = response.into_parts();
                *ctx.response_mut() = Response::from_parts(parts, Body::new(body));
                if status.is_server_error() {
                    Ok(RESULT_SERVER_ERROR.to_string())
                } else {
                    Ok(String::new())
                }
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id(), upstream = %authority, error = %e, "Upstream error");
                Err(PipelineError::Upstream(e.to_string()))
            }
        }
    }
}
