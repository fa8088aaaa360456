//! Configuration schema definitions.
//!
//! Host-level settings use snake_case keys. Each filter entry carries its
//! kind-specific spec inline; those keys belong to the filter and are decoded
//! by it (see [`crate::pipeline::FilterSpec`]).

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The filter pipeline every request runs through.
    pub pipeline: PipelineConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Pipeline configuration: an ordered list of filters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name for logging/metrics.
    pub name: String,

    /// Reject filter specs with unparsable or non-positive durations instead
    /// of falling back to defaults.
    pub strict_validation: bool,

    /// Filters in execution order.
    pub filters: Vec<FilterConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            strict_validation: false,
            filters: Vec::new(),
        }
    }
}

/// A single filter instance in the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterConfig {
    /// Instance name, unique within the pipeline.
    pub name: String,

    /// Registered filter kind (e.g., "TimeLimiter").
    pub kind: String,

    /// Kind-specific settings.
    #[serde(flatten)]
    pub spec: toml::Table,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.pipeline.filters.is_empty());
        assert!(!config.pipeline.strict_validation);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_filter_spec_is_kept_inline() {
        let config: ServerConfig = toml::from_str(
            r#"
            [pipeline]
            name = "api"

            [[pipeline.filters]]
            name = "limiter"
            kind = "TimeLimiter"
            defaultTimeoutDuration = "200ms"

            [[pipeline.filters.urls]]
            timeoutDuration = "50ms"
            matchRule = { pathPrefix = "/slow" }
            "#,
        )
        .unwrap();

        let filter = &config.pipeline.filters[0];
        assert_eq!(filter.name, "limiter");
        assert_eq!(filter.kind, "TimeLimiter");
        assert!(!filter.spec.contains_key("name"));
        assert_eq!(
            filter.spec.get("defaultTimeoutDuration").and_then(|v| v.as_str()),
            Some("200ms")
        );
        assert_eq!(filter.spec["urls"].as_array().map(Vec::len), Some(1));
    }
}
