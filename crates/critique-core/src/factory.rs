//! Pipeline construction and the per-configuration cache.
//!
//! [`PipelineFactory::get_or_build`] resolves a request, derives its
//! [`CanonicalKey`] and returns the cached pipeline for that key, building it
//! on first use. Concurrent requests for the same key share one build: each
//! key owns a `OnceCell` that only the first caller initialises.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use crate::domain::{CanonicalKey, ExperimentConfig, RoleName};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::{CallOptions, Pipeline, PipelineRoles, RuntimeMetadata};
use crate::registry::{Builder, ModuleRegistry};
use crate::resolver::{ConfigResolver, ExperimentRequest};
use crate::roles::ModuleContext;

/// Cache size past which each new entry logs a warning.
pub const DEFAULT_CACHE_SOFT_LIMIT: usize = 64;

type Slot = Arc<OnceCell<Arc<Pipeline>>>;

/// What `describe` reports for a request.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDescription {
    pub config_key: String,
    pub config: ExperimentConfig,
    pub modules: RuntimeMetadata,
    pub warnings: Vec<String>,
}

pub struct PipelineFactory {
    registry: ModuleRegistry,
    resolver: ConfigResolver,
    ctx: ModuleContext,
    call_defaults: CallOptions,
    cache: Mutex<HashMap<CanonicalKey, Slot>>,
    soft_limit: usize,
}

impl std::fmt::Debug for PipelineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineFactory")
            .field("registry", &self.registry.len())
            .field("soft_limit", &self.soft_limit)
            .finish()
    }
}

impl PipelineFactory {
    pub fn new(registry: ModuleRegistry, resolver: ConfigResolver, ctx: ModuleContext) -> Self {
        Self {
            registry,
            resolver,
            ctx,
            call_defaults: CallOptions::default(),
            cache: Mutex::new(HashMap::new()),
            soft_limit: DEFAULT_CACHE_SOFT_LIMIT,
        }
    }

    /// Options every built pipeline uses for `Pipeline::call`.
    pub fn with_call_defaults(mut self, defaults: CallOptions) -> Self {
        self.call_defaults = defaults;
        self
    }

    pub fn with_cache_soft_limit(mut self, limit: usize) -> Self {
        self.soft_limit = limit;
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Resolve `request` and return the pipeline for it.
    ///
    /// Requests that resolve to the same configuration get the same `Arc`.
    /// Fails only when the resolved configuration names a version that is not
    /// registered; nothing is cached in that case.
    pub async fn get_or_build(&self, request: &ExperimentRequest) -> Result<Arc<Pipeline>> {
        let resolution = self.resolver.resolve(request);
        self.get_or_build_config(resolution.config).await
    }

    pub async fn get_or_build_config(&self, config: ExperimentConfig) -> Result<Arc<Pipeline>> {
        let key = config.canonical_key();
        let slot = {
            let mut cache = self.cache.lock().await;
            if !cache.contains_key(&key) && cache.len() >= self.soft_limit {
                obs::emit_cache_large(cache.len() + 1, self.soft_limit);
            }
            cache.entry(key.clone()).or_default().clone()
        };

        if let Some(pipeline) = slot.get() {
            METRICS.inc_cache_hits();
            obs::emit_cache_hit(key.short());
            return Ok(pipeline.clone());
        }

        let outcome = slot
            .get_or_try_init(|| async move { self.build(config).map(Arc::new) })
            .await;

        match outcome {
            Ok(pipeline) => Ok(pipeline.clone()),
            Err(e) => {
                let mut cache = self.cache.lock().await;
                if cache.get(&key).is_some_and(|s| !s.initialized()) {
                    cache.remove(&key);
                }
                Err(e)
            }
        }
    }

    /// Resolved configuration and built module names for `request`.
    pub async fn describe(&self, request: &ExperimentRequest) -> Result<PipelineDescription> {
        let resolution = self.resolver.resolve(request);
        let pipeline = self.get_or_build_config(resolution.config).await?;
        Ok(PipelineDescription {
            config_key: pipeline.key().digest().to_string(),
            config: pipeline.config().clone(),
            modules: pipeline.metadata().clone(),
            warnings: resolution.warnings.iter().map(|w| w.to_string()).collect(),
        })
    }

    /// Number of pipelines currently cached.
    pub async fn cached_pipelines(&self) -> usize {
        let cache = self.cache.lock().await;
        cache.values().filter(|slot| slot.initialized()).count()
    }

    fn build(&self, config: ExperimentConfig) -> Result<Pipeline> {
        // Every lookup happens before any builder runs.
        let builders = RoleName::ALL
            .iter()
            .map(|role| {
                let spec = config.get(*role);
                self.registry
                    .lookup(*role, &spec.version)
                    .map(|b| (*b, spec.model.clone()))
            })
            .collect::<Result<Vec<(Builder, String)>>>()?;

        let instances = builders
            .into_iter()
            .map(|(builder, model)| builder.build(&model, &self.ctx));
        let roles = PipelineRoles::from_instances(instances)?;

        let pipeline =
            Pipeline::new(config, roles).with_call_defaults(self.call_defaults.clone());
        METRICS.inc_pipelines_built();
        obs::emit_pipeline_built(pipeline.key().short(), pipeline.config());
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critique_clients::fakes::{ScriptedGenerator, StaticSearch};
    use critique_clients::CapabilityClients;
    use serde_json::json;

    fn factory() -> PipelineFactory {
        let clients = CapabilityClients::new(
            Arc::new(ScriptedGenerator::new().with_default("ok")),
            Arc::new(StaticSearch::empty()),
        );
        PipelineFactory::new(
            ModuleRegistry::builtin().unwrap(),
            ConfigResolver::new(),
            ModuleContext::new(clients),
        )
    }

    #[tokio::test]
    async fn same_request_hits_cache() {
        let f = factory();
        let a = f.get_or_build(&"budget".into()).await.unwrap();
        let b = f.get_or_build(&"budget".into()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(f.cached_pipelines().await, 1);
    }

    #[tokio::test]
    async fn unknown_version_is_not_cached() {
        let f = factory();
        let req = ExperimentRequest::from_value(json!({"judge": {"version": "v7"}}));
        let err = f.get_or_build(&req).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported judge version 'v7'"));
        assert_eq!(f.cached_pipelines().await, 0);
        assert!(f.cache.lock().await.is_empty());
    }

    #[tokio::test]
    async fn describe_reports_runtime_modules() {
        let f = factory();
        let d = f.describe(&"budget".into()).await.unwrap();
        let judge = d.modules.get(RoleName::Judge).unwrap();
        assert_eq!(judge.implementation, "NoJudge");
        assert_eq!(d.config.get(RoleName::Rebuttal).version, "v1");
        assert!(d.warnings.is_empty());
        assert_eq!(d.config_key.len(), 64);
    }
}
