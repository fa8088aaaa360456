//! Filter pipeline host.
//!
//! # Data Flow
//! ```text
//! PipelineConfig
//!     → registry.rs (kind name → factory)
//!     → filter.rs (init / inherit each instance)
//!     → chain.rs (immutable Pipeline, swapped atomically on reload)
//!
//! Per request:
//!     HttpContext (request, outer response, cancel signal)
//!     → filter[0].handle(ctx, next) → next.run(ctx) → filter[1] ...
//!     → result label returned back up the chain
//! ```
//!
//! # Design Decisions
//! - Filters are shared across concurrent requests; per-request state lives
//!   in the context only
//! - Labels are plain strings; an exhausted chain yields `""`
//! - The registry is passed in, never global

pub mod chain;
pub mod context;
pub mod error;
pub mod filter;
pub mod registry;

pub use chain::{Pipeline, SharedPipeline};
pub use context::{CancelHandle, CancelReason, HttpContext};
pub use error::{BuildError, FilterError, PipelineError};
pub use filter::{Filter, FilterInstance, FilterSpec, Next};
pub use registry::{FilterKindInfo, FilterRegistry};
