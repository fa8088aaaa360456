//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline, filters and HTTP host produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and histograms, Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing, pretty for development
//! - Request ID is a field on every per-request event
//! - Metric helpers are free functions; without an installed recorder they
//!   are no-ops, so tests never need to set one up

pub mod logging;
pub mod metrics;
