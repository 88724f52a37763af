//! Process-scoped service context.
//!
//! The context is the single owner of every long-lived object: the
//! configuration, the detector registry, the pipeline factory, and the
//! orchestrator built over them. Embedders construct one `ServiceContext` at
//! startup and share it across request handlers; nothing in this crate lives
//! in module-level globals.

use std::path::Path;
use std::sync::Arc;

use crate::backend::BackendProvider;
use crate::config::GenerationConfig;
use crate::detector::DetectorRegistry;
use crate::error::RestyleResult;
use crate::factory::PipelineFactory;
use crate::orchestrator::GenerationOrchestrator;

/// Owner of the process-wide generation state.
pub struct ServiceContext {
    config: Arc<GenerationConfig>,
    registry: Arc<DetectorRegistry>,
    factory: Arc<PipelineFactory>,
    orchestrator: GenerationOrchestrator,
}

impl ServiceContext {
    /// Build a context from an in-memory configuration and a backend
    /// provider, with the built-in detector set.
    pub fn new(config: GenerationConfig, provider: Arc<dyn BackendProvider>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(DetectorRegistry::with_defaults(&config));
        Self::with_registry(config, provider, registry)
    }

    /// Build a context with a caller-supplied detector registry.
    pub fn with_registry(
        config: Arc<GenerationConfig>,
        provider: Arc<dyn BackendProvider>,
        registry: Arc<DetectorRegistry>,
    ) -> Self {
        let factory = Arc::new(PipelineFactory::new(Arc::clone(&config), provider));
        let orchestrator = GenerationOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&factory),
            Arc::clone(&registry),
        );
        Self {
            config,
            registry,
            factory,
            orchestrator,
        }
    }

    /// Build a context from a configuration file.
    ///
    /// A malformed document is a startup error and propagates.
    pub fn from_config_file(
        path: impl AsRef<Path>,
        provider: Arc<dyn BackendProvider>,
    ) -> RestyleResult<Self> {
        let config = GenerationConfig::load(path)?;
        Ok(Self::new(config, provider))
    }

    /// The loaded configuration.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// The detector registry.
    pub fn registry(&self) -> &Arc<DetectorRegistry> {
        &self.registry
    }

    /// The pipeline factory.
    pub fn pipeline_factory(&self) -> &Arc<PipelineFactory> {
        &self.factory
    }

    /// The generation orchestrator.
    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    /// Eagerly trigger the pipeline build instead of paying for it on the
    /// first request. The outcome is cached either way.
    pub fn warm_up(&self) {
        let _ = self.factory.get_or_build();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::GenerationOptions;
    use crate::testing::{sample_image, MockBehavior, MockProvider};

    #[test]
    fn test_context_end_to_end() {
        let provider = Arc::new(MockProvider::new(MockBehavior::default()));
        let context = ServiceContext::new(GenerationConfig::default(), provider);
        context.warm_up();

        let result = context
            .orchestrator()
            .generate(&sample_image(16, 16), &GenerationOptions::default());
        assert!(!result.used_fallback);
    }

    #[test]
    fn test_from_config_file_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_config.json");
        std::fs::write(&path, "{{{{").unwrap();

        let provider = Arc::new(MockProvider::new(MockBehavior::default()));
        assert!(ServiceContext::from_config_file(&path, provider).is_err());
    }

    #[test]
    fn test_from_config_file_loads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_config.json");
        std::fs::write(&path, r#"{"width": 512, "height": 512}"#).unwrap();

        let provider = Arc::new(MockProvider::new(MockBehavior::default()));
        let context = ServiceContext::from_config_file(&path, provider).unwrap();
        assert_eq!(context.config().width, 512);
    }
}
