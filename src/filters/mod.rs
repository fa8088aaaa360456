//! Built-in filter kinds.
//!
//! - `time_limiter`: races the rest of the chain against a per-URL deadline
//! - `mock`: canned responses, optionally delayed
//! - `proxy`: forwards to a single upstream

pub mod mock;
pub mod proxy;
pub mod time_limiter;

pub use mock::Mock;
pub use proxy::Proxy;
pub use time_limiter::TimeLimiter;
