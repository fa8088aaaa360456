//! Request time limiting for an HTTP filter pipeline.
//!
//! A `TimeLimiter` filter races the rest of the pipeline against a per-URL
//! deadline. When the deadline wins, the request's cancel signal fires, the
//! response becomes `408 Request Timeout` with `x-time-limiter: timed-out`,
//! and the filter returns the `"timeout"` label.
//!
//! # Layout
//! ```text
//! config        → TOML schema, duration literals, validation, hot reload
//! routing       → request matchers and compiled URL rules
//! pipeline      → filter contract, context, registry, chain
//! filters       → TimeLimiter, Mock, Proxy
//! http          → axum host running the pipeline
//! observability → tracing subscriber, Prometheus metrics
//! lifecycle     → shutdown coordination, OS signals
//! ```

pub mod config;
pub mod filters;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;

pub use config::schema::ServerConfig;
pub use filters::TimeLimiter;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{FilterRegistry, HttpContext, Pipeline, SharedPipeline};
