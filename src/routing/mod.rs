//! Routing subsystem: deciding whether a request falls under a rule.
//!
//! # Data Flow
//! ```text
//! Rule compilation (at configure time):
//!     UrlRuleSpec (methods, host, path, pathPrefix, pathRegexp)
//!     → url_rule.rs (compile conditions)
//!     → matcher.rs (one Matcher per condition, AND-ed)
//!     → Freeze as immutable UrlRule
//!
//! Incoming Request (method, host, path)
//!     → UrlRule::matches
//!     → bool
//! ```
//!
//! # Design Decisions
//! - Rules compiled once, immutable at runtime
//! - Deterministic: same input always gives the same decision
//! - Ordering between rules is the caller's business (first match wins)

pub mod matcher;
pub mod url_rule;

pub use url_rule::{RuleError, UrlRule, UrlRuleSpec};
