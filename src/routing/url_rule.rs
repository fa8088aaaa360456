//! URL rules: the match half of a filter rule.
//!
//! A [`UrlRuleSpec`] is the configuration shape; [`UrlRule::compile`] turns it
//! into an immutable matcher. All conditions present in the spec must hold.

use axum::body::Body;
use axum::http::{Method, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::matcher::{
    AndMatcher, HostMatcher, Matcher, MethodMatcher, PathExactMatcher, PathPrefixMatcher,
    PathRegexMatcher,
};

/// Error compiling a URL rule.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid method {0:?}")]
    Method(String),

    #[error("invalid path regexp {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// URL rule configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UrlRuleSpec {
    /// Rule identifier for logging/metrics. Derived from the conditions if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Allowed methods; empty means any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,

    /// Host header to match (exact, case-insensitive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Exact path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Path prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,

    /// Path regular expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_regexp: Option<String>,
}

/// A compiled, immutable URL rule.
#[derive(Debug)]
pub struct UrlRule {
    id: String,
    matcher: AndMatcher,
}

impl UrlRule {
    pub fn compile(spec: &UrlRuleSpec) -> Result<Self, RuleError> {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();

        if !spec.methods.is_empty() {
            let methods = spec
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_uppercase().as_bytes())
                        .map_err(|_| RuleError::Method(m.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            matchers.push(Box::new(MethodMatcher::new(methods)));
        }
        if let Some(host) = &spec.host {
            matchers.push(Box::new(HostMatcher::new(host.as_str())));
        }
        if let Some(path) = &spec.path {
            matchers.push(Box::new(PathExactMatcher::new(path.as_str())));
        }
        if let Some(prefix) = &spec.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.as_str())));
        }
        if let Some(pattern) = &spec.path_regexp {
            let matcher = PathRegexMatcher::new(pattern).map_err(|source| RuleError::Regex {
                pattern: pattern.clone(),
                source,
            })?;
            matchers.push(Box::new(matcher));
        }

        Ok(Self {
            id: spec.id.clone().unwrap_or_else(|| describe(spec)),
            matcher: AndMatcher::new(matchers),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

fn describe(spec: &UrlRuleSpec) -> String {
    let mut parts = Vec::new();
    if !spec.methods.is_empty() {
        parts.push(spec.methods.join(",").to_uppercase());
    }
    if let Some(host) = &spec.host {
        parts.push(format!("host={}", host));
    }
    if let Some(path) = &spec.path {
        parts.push(path.clone());
    }
    if let Some(prefix) = &spec.path_prefix {
        parts.push(format!("{}*", prefix));
    }
    if let Some(pattern) = &spec.path_regexp {
        parts.push(format!("~{}", pattern));
    }
    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(" ")
    }
}
