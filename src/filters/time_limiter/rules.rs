//! Timeout rule selection.
//!
//! # Responsibilities
//! - Resolve configured duration literals into positive timeouts
//! - Pick the first rule matching a request
//!
//! # Design Decisions
//! - First match wins; later rules are never evaluated
//! - Absent, unparsable or non-positive durations fall back to the default
//!   (or are rejected when the pipeline runs with strict validation)
//! - A RuleSet is immutable; reconfiguration builds a new one

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use serde::{Deserialize, Serialize};

use crate::config::duration::parse_duration;
use crate::pipeline::FilterError;
use crate::routing::{UrlRule, UrlRuleSpec};

/// Effective default when `defaultTimeoutDuration` is unset or invalid.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// TimeLimiter configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeLimiterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_duration: Option<String>,

    pub urls: Vec<UrlTimeoutSpec>,
}

/// One configured rule: which requests, and how long they may take.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrlTimeoutSpec {
    pub match_rule: UrlRuleSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<String>,
}

/// A compiled rule.
#[derive(Debug)]
pub struct TimeoutRule {
    rule: UrlRule,
    timeout: Duration,
}

impl TimeoutRule {
    pub fn id(&self) -> &str {
        self.rule.id()
    }

    /// Always strictly positive.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.rule.matches(req)
    }
}

/// Ordered timeout rules plus the default they fall back to.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<TimeoutRule>,
    default_timeout: Duration,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RuleSet {
    /// Compile a spec. Fails on malformed match rules, and on bad durations
    /// only when `strict` is set.
    pub fn build(spec: &TimeLimiterSpec, strict: bool) -> Result<Self, FilterError> {
        let default_timeout = resolve_timeout(
            "defaultTimeoutDuration",
            spec.default_timeout_duration.as_deref(),
            DEFAULT_TIMEOUT,
            strict,
        )?;

        let rules = spec
            .urls
            .iter()
            .enumerate()
            .map(|(index, url)| {
                let field = format!("urls[{}].timeoutDuration", index);
                let timeout = resolve_timeout(
                    &field,
                    url.timeout_duration.as_deref(),
                    default_timeout,
                    strict,
                )?;
                Ok(TimeoutRule {
                    rule: UrlRule::compile(&url.match_rule)?,
                    timeout,
                })
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        Ok(Self {
            rules,
            default_timeout,
        })
    }

    /// The first rule matching the request, if any.
    pub fn select(&self, req: &Request<Body>) -> Option<&TimeoutRule> {
        self.rules.iter().find(|rule| rule.matches(req))
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn rules(&self) -> &[TimeoutRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Resolve an optional literal to a positive duration.
fn resolve_timeout(
    field: &str,
    literal: Option<&str>,
    fallback: Duration,
    strict: bool,
) -> Result<Duration, FilterError> {
    let Some(literal) = literal.filter(|l| !l.trim().is_empty()) else {
        return Ok(fallback);
    };

    let error = match parse_duration(literal) {
        Ok(timeout) if !timeout.is_zero() => return Ok(timeout),
        Ok(_) => FilterError::NonPositiveDuration {
            field: field.to_string(),
            literal: literal.to_string(),
        },
        Err(source) => FilterError::Duration {
            field: field.to_string(),
            literal: literal.to_string(),
            source,
        },
    };

    if strict {
        return Err(error);
    }
    tracing::warn!(
        field,
        literal,
        fallback = ?fallback,
        error = %error,
        "Invalid timeout duration, using fallback"
    );
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(prefix: &str, timeout: Option<&str>) -> UrlTimeoutSpec {
        UrlTimeoutSpec {
            match_rule: UrlRuleSpec {
                path_prefix: Some(prefix.into()),
                ..Default::default()
            },
            timeout_duration: timeout.map(String::from),
        }
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let spec = TimeLimiterSpec {
            default_timeout_duration: None,
            urls: vec![url("/api", Some("10ms")), url("/api", Some("20ms"))],
        };
        let rules = RuleSet::build(&spec, false).unwrap();

        let rule = rules.select(&request("/api/x")).unwrap();
        assert_eq!(rule.timeout(), Duration::from_millis(10));
        assert!(rules.select(&request("/other")).is_none());
    }

    #[test]
    fn test_default_fallback_is_500ms() {
        let spec = TimeLimiterSpec {
            default_timeout_duration: None,
            urls: vec![url("/", None)],
        };
        let rules = RuleSet::build(&spec, false).unwrap();
        assert_eq!(rules.default_timeout(), Duration::from_millis(500));
        assert_eq!(rules.rules()[0].timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_rules_inherit_configured_default() {
        let spec = TimeLimiterSpec {
            default_timeout_duration: Some("2s".into()),
            urls: vec![url("/a", None), url("/b", Some(""))],
        };
        let rules = RuleSet::build(&spec, false).unwrap();
        assert_eq!(rules.rules()[0].timeout(), Duration::from_secs(2));
        assert_eq!(rules.rules()[1].timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_durations_fall_back() {
        let spec = TimeLimiterSpec {
            default_timeout_duration: Some("soon".into()),
            urls: vec![url("/a", Some("fast")), url("/b", Some("0s")), url("/c", Some("-5ms"))],
        };
        let rules = RuleSet::build(&spec, false).unwrap();
        assert_eq!(rules.default_timeout(), DEFAULT_TIMEOUT);
        for rule in rules.rules() {
            assert_eq!(rule.timeout(), DEFAULT_TIMEOUT);
        }
    }

    #[test]
    fn test_strict_rejects_invalid_durations() {
        let bad_default = TimeLimiterSpec {
            default_timeout_duration: Some("soon".into()),
            urls: vec![],
        };
        assert!(matches!(
            RuleSet::build(&bad_default, true),
            Err(FilterError::Duration { .. })
        ));

        let zero = TimeLimiterSpec {
            default_timeout_duration: None,
            urls: vec![url("/a", Some("0s"))],
        };
        assert!(matches!(
            RuleSet::build(&zero, true),
            Err(FilterError::NonPositiveDuration { field, .. }) if field == "urls[0].timeoutDuration"
        ));
    }

    #[test]
    fn test_bad_match_rule_is_an_error() {
        let spec = TimeLimiterSpec {
            default_timeout_duration: None,
            urls: vec![UrlTimeoutSpec {
                match_rule: UrlRuleSpec {
                    path_regexp: Some("[".into()),
                    ..Default::default()
                },
                timeout_duration: None,
            }],
        };
        assert!(matches!(RuleSet::build(&spec, false), Err(FilterError::Rule(_))));
    }
}
