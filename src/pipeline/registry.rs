//! Filter kind registration.
//!
//! The registry is an explicit table owned by whoever builds pipelines (the
//! server, the CLI, tests). There is no process-wide registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::filters::{Mock, Proxy, TimeLimiter};
use crate::pipeline::filter::Filter;

type FilterFactory = Arc<dyn Fn() -> Arc<dyn Filter> + Send + Sync>;

/// Identity a filter kind advertises up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterKindInfo {
    pub kind: &'static str,
    pub description: &'static str,
    pub results: &'static [&'static str],
}

/// Maps kind names to filter factories.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    factories: BTreeMap<&'static str, FilterFactory>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every filter kind this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(|| Arc::new(TimeLimiter::new()))
            .register(|| Arc::new(Mock::new()))
            .register(|| Arc::new(Proxy::new()));
        registry
    }

    /// Register a factory under the kind its filters report.
    /// A later registration of the same kind replaces the earlier one.
    pub fn register<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Filter> + Send + Sync + 'static,
    {
        let kind = factory().kind();
        if self.factories.insert(kind, Arc::new(factory)).is_some() {
            tracing::warn!(kind, "Filter kind registered twice, keeping the latest");
        }
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Create a fresh, unconfigured filter of the given kind.
    pub fn create(&self, kind: &str) -> Option<Arc<dyn Filter>> {
        self.factories.get(kind).map(|factory| factory())
    }

    /// Identity of every registered kind, sorted by kind name.
    pub fn kinds(&self) -> Vec<FilterKindInfo> {
        self.factories
            .values()
            .map(|factory| {
                let filter = factory();
                FilterKindInfo {
                    kind: filter.kind(),
                    description: filter.description(),
                    results: filter.results(),
                }
            })
            .collect()
    }

    pub fn default_spec(&self, kind: &str) -> Option<toml::Table> {
        self.create(kind).map(|filter| filter.default_spec())
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let registry = FilterRegistry::with_builtin();
        let kinds: Vec<_> = registry.kinds().into_iter().map(|k| k.kind).collect();
        assert_eq!(kinds, vec!["Mock", "Proxy", "TimeLimiter"]);

        let limiter = registry
            .kinds()
            .into_iter()
            .find(|k| k.kind == "TimeLimiter")
            .unwrap();
        assert_eq!(limiter.results, &["timeout"]);
        assert!(!limiter.description.is_empty());
    }

    #[test]
    fn test_create_returns_fresh_instances() {
        let registry = FilterRegistry::with_builtin();
        let a = registry.create("TimeLimiter").unwrap();
        let b = registry.create("TimeLimiter").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(registry.create("Nope").is_none());
        assert!(!registry.contains("Nope"));
    }

    #[test]
    fn test_default_spec_scaffolding() {
        let registry = FilterRegistry::with_builtin();
        let spec = registry.default_spec("TimeLimiter").unwrap();
        assert_eq!(
            spec.get("defaultTimeoutDuration").and_then(|v| v.as_str()),
            Some("500ms")
        );
        assert!(registry.default_spec("Missing").is_none());
    }
}
