//! Pipeline construction, execution and generational reload.
//!
//! # Design Decisions
//! - A pipeline is immutable once built; reload builds a new generation
//! - Filters whose (name, kind) survive a reload are built with `inherit`
//! - Generations are swapped with a single atomic store; in-flight requests
//!   keep the generation they started with

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::PipelineConfig;
use crate::pipeline::context::HttpContext;
use crate::pipeline::error::{BuildError, PipelineError};
use crate::pipeline::filter::{Filter, FilterInstance, FilterSpec, Next};
use crate::pipeline::registry::FilterRegistry;

/// An ordered, configured chain of filters.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    filters: Vec<FilterInstance>,
}

impl Pipeline {
    /// Build a pipeline, inheriting matching filters from `previous`.
    pub fn build(
        config: &PipelineConfig,
        registry: &FilterRegistry,
        previous: Option<&Pipeline>,
    ) -> Result<Self, BuildError> {
        let mut names = HashSet::new();
        let mut filters: Vec<FilterInstance> = Vec::with_capacity(config.filters.len());

        for filter_config in &config.filters {
            let result = Self::build_filter(config, registry, previous, filter_config, &mut names);
            match result {
                Ok(instance) => filters.push(instance),
                Err(e) => {
                    for built in &filters {
                        built.filter().close();
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(pipeline = %config.name, filters = filters.len(), "Pipeline built");
        Ok(Self {
            name: config.name.clone(),
            filters,
        })
    }

    fn build_filter<'a>(
        config: &PipelineConfig,
        registry: &FilterRegistry,
        previous: Option<&Pipeline>,
        filter_config: &'a crate::config::schema::FilterConfig,
        names: &mut HashSet<&'a str>,
    ) -> Result<FilterInstance, BuildError> {
        if !names.insert(filter_config.name.as_str()) {
            return Err(BuildError::DuplicateName(filter_config.name.clone()));
        }

        let filter = registry
            .create(&filter_config.kind)
            .ok_or_else(|| BuildError::UnknownKind {
                name: filter_config.name.clone(),
                kind: filter_config.kind.clone(),
            })?;

        let spec = FilterSpec::new(&config.name, config.strict_validation, filter_config);
        let inherited = previous.and_then(|p| p.find(&filter_config.name, &filter_config.kind));
        let result = match inherited {
            Some(prev) => filter.inherit(&spec, prev),
            None => filter.init(&spec),
        };
        result.map_err(|source| BuildError::Init {
            name: filter_config.name.clone(),
            kind: filter_config.kind.clone(),
            source,
        })?;

        Ok(FilterInstance::new(filter_config.name.clone(), filter))
    }

    fn find(&self, name: &str, kind: &str) -> Option<Arc<dyn Filter>> {
        self.filters
            .iter()
            .find(|f| f.name() == name && f.filter().kind() == kind)
            .map(|f| Arc::clone(f.filter()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &[FilterInstance] {
        &self.filters
    }

    /// Run a request through every filter.
    pub async fn handle(&self, ctx: &mut HttpContext) -> Result<String, PipelineError> {
        Next::new(&self.name, &self.filters).run(ctx).await
    }

    /// Status snapshots of filters that report one, keyed by filter name.
    pub fn status(&self) -> serde_json::Value {
        let statuses = self
            .filters
            .iter()
            .filter_map(|f| f.filter().status().map(|s| (f.name().to_string(), s)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(statuses)
    }

    pub fn close(&self) {
        for instance in &self.filters {
            instance.filter().close();
        }
    }
}

/// The live pipeline, replaced wholesale on reload.
#[derive(Clone)]
pub struct SharedPipeline {
    current: Arc<ArcSwap<Pipeline>>,
    registry: Arc<FilterRegistry>,
}

impl SharedPipeline {
    pub fn new(config: &PipelineConfig, registry: Arc<FilterRegistry>) -> Result<Self, BuildError> {
        let pipeline = Pipeline::build(config, &registry, None)?;
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(pipeline)),
            registry,
        })
    }

    /// The current generation.
    pub fn load(&self) -> Arc<Pipeline> {
        self.current.load_full()
    }

    /// Build a new generation and swap it in. On error the running
    /// generation is left untouched.
    pub fn reload(&self, config: &PipelineConfig) -> Result<(), BuildError> {
        let current = self.current.load_full();
        let next = Pipeline::build(config, &self.registry, Some(&current))?;
        let retired = self.current.swap(Arc::new(next));
        retired.close();
        tracing::info!(pipeline = %config.name, filters = config.filters.len(), "Pipeline reloaded");
        Ok(())
    }

    pub fn close(&self) {
        self.current.load().close();
    }
}

impl std::fmt::Debug for SharedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPipeline")
            .field("current", &self.current.load())
            .finish()
    }
}
