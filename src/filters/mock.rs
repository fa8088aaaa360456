//! Mock filter: canned responses with an optional delay.
//!
//! Useful as a stand-in for a slow backend. The delay honours the request's
//! cancel signal, so a time limiter in front of it cuts the wait short.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::duration::parse_duration;
use crate::pipeline::{Filter, FilterError, FilterSpec, HttpContext, Next, PipelineError};
use crate::routing::{UrlRule, UrlRuleSpec};

pub const KIND: &str = "Mock";

pub const RESULT_MOCKED: &str = "mocked";

/// Mock configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockSpec {
    pub rules: Vec<MockRuleSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRuleSpec {
    #[serde(default)]
    pub match_rule: UrlRuleSpec,

    #[serde(default = "default_code")]
    pub code: u16,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
}

fn default_code() -> u16 {
    200
}

#[derive(Debug)]
struct MockRule {
    rule: UrlRule,
    status: StatusCode,
    headers: HeaderMap,
    body: String,
    delay: Duration,
}

impl MockRule {
    fn compile(index: usize, spec: &MockRuleSpec) -> Result<Self, FilterError> {
        let status = StatusCode::from_u16(spec.code)
            .map_err(|_| FilterError::Invalid(format!("rules[{}].code {} is not a status", index, spec.code)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &spec.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FilterError::Invalid(format!("rules[{}]: bad header name {:?}", index, name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FilterError::Invalid(format!("rules[{}]: bad header value {:?}", index, value)))?;
            headers.insert(name, value);
        }

        let delay = match spec.delay.as_deref() {
            None => Duration::ZERO,
            Some(literal) => parse_duration(literal).map_err(|source| FilterError::Duration {
                field: format!("rules[{}].delay", index),
                literal: literal.to_string(),
                source,
            })?,
        };

        Ok(Self {
            rule: UrlRule::compile(&spec.match_rule)?,
            status,
            headers,
            body: spec.body.clone(),
            delay,
        })
    }
}

/// Answers matching requests itself; passes the rest down the chain.
#[derive(Debug)]
pub struct Mock {
    rules: ArcSwap<Vec<MockRule>>,
}

impl Mock {
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for Mock {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "Mock answers matching requests with a canned response."
    }

    fn results(&self) -> &'static [&'static str] {
        &[RESULT_MOCKED]
    }

    fn default_spec(&self) -> toml::Table {
        let spec = MockSpec {
            rules: vec![MockRuleSpec {
                match_rule: UrlRuleSpec::default(),
                code: default_code(),
                body: "mocked".to_string(),
                headers: BTreeMap::new(),
                delay: None,
            }],
        };
        match toml::Value::try_from(spec) {
            Ok(toml::Value::Table(table)) => table,
            _ => toml::Table::new(),
        }
    }

    fn init(&self, spec: &FilterSpec) -> Result<(), FilterError> {
        let mock_spec: MockSpec = spec.decode()?;
        let rules = mock_spec
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| MockRule::compile(index, rule))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(filter = %spec.name(), rules = rules.len(), "Mock configured");
        self.rules.store(Arc::new(rules));
        Ok(())
    }

    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<String, PipelineError> {
        let rules = self.rules.load_full();
        let Some(rule) = rules.iter().find(|r| r.rule.matches(ctx.request())) else {
            return next.run(ctx).await;
        };

        if !rule.delay.is_zero() {
            let cancel = ctx.cancel_handle().clone();
            tokio::select! {
                _ = tokio::time::sleep(rule.delay) => {}
                reason = cancel.cancelled() => {
                    tracing::debug!(request_id = %ctx.request_id(), %reason, "Mock delay cancelled");
                    return Err(PipelineError::Cancelled(reason));
                }
            }
        }

        ctx.set_status(rule.status);
        for (name, value) in &rule.headers {
            ctx.set_header(name.clone(), value.clone());
        }
        *ctx.response_mut().body_mut() = Body::from(rule.body.clone());
        Ok(RESULT_MOCKED.to_string())
    }
}
