//! Pipeline construction and the process-wide singleton.
//!
//! [`PipelineFactory::get_or_build`] runs the build sequence at most once per
//! process; concurrent first callers block on the same initialization and
//! every caller afterwards observes the identical outcome. Both terminal
//! outcomes are cached: a READY pipeline is reused for the process lifetime,
//! and a FAILED build (base model did not load) stays failed — retrying
//! requires a fresh process, e.g. after fixing credentials.
//!
//! Every build step other than the base-model load degrades gracefully:
//! authentication, individual control adapters, capability steps and
//! placement each log a warning and continue on failure.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use image::RgbImage;
use log::{debug, error, info, warn};

use crate::backend::{BackendProvider, ControlAdapter, GenerationBackend, GenerationRequest};
use crate::capability::{CapabilityFlags, CapabilityLoader};
use crate::config::GenerationConfig;
use crate::detector::ConditionKind;
use crate::error::BackendResult;

/// The built generation pipeline.
///
/// Owned by the factory, borrowed by the orchestrator. The backend sits
/// behind a mutex because adapter-scale configuration mutates shared state:
/// the scale update and the generation call it belongs to must form one
/// critical section, or concurrent requests would bleed scales into each
/// other.
pub struct Pipeline {
    backend: Mutex<Box<dyn GenerationBackend>>,
    capabilities: CapabilityFlags,
    control_kinds: Vec<ConditionKind>,
}

impl Pipeline {
    /// Capabilities that survived construction.
    pub fn capabilities(&self) -> &CapabilityFlags {
        &self.capabilities
    }

    /// Condition types whose control adapters loaded, in configured order.
    pub fn control_kinds(&self) -> &[ConditionKind] {
        &self.control_kinds
    }

    /// Whether any control adapter is attached.
    pub fn has_control(&self) -> bool {
        !self.control_kinds.is_empty()
    }

    /// Run one generation call, optionally applying adapter scales first.
    ///
    /// Holds the backend lock across both operations so the scales in effect
    /// during generation are exactly the ones this request set.
    pub fn generate(
        &self,
        adapter_scales: Option<&[f32]>,
        request: &GenerationRequest,
    ) -> BackendResult<RgbImage> {
        let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(scales) = adapter_scales {
            backend.set_adapter_scales(scales)?;
            debug!("Set adapter scales: {:?}", scales);
        }
        backend.generate(request)
    }
}

/// Builds and owns the pipeline singleton.
pub struct PipelineFactory {
    config: Arc<GenerationConfig>,
    provider: Arc<dyn BackendProvider>,
    slot: OnceLock<Option<Arc<Pipeline>>>,
}

impl PipelineFactory {
    /// Create a factory; nothing is loaded until the first
    /// [`get_or_build`](Self::get_or_build) call.
    pub fn new(config: Arc<GenerationConfig>, provider: Arc<dyn BackendProvider>) -> Self {
        Self {
            config,
            provider,
            slot: OnceLock::new(),
        }
    }

    /// Return the pipeline, building it on first call.
    ///
    /// `None` means the base model failed to load; that outcome is terminal
    /// for this process and callers should take the fallback path.
    pub fn get_or_build(&self) -> Option<Arc<Pipeline>> {
        self.slot.get_or_init(|| self.build()).clone()
    }

    /// Peek at the cached outcome without triggering a build.
    pub fn get(&self) -> Option<Arc<Pipeline>> {
        self.slot.get().cloned().flatten()
    }

    fn build(&self) -> Option<Arc<Pipeline>> {
        self.login();

        let adapters = self.load_control_adapters();
        let control_kinds: Vec<ConditionKind> = adapters.iter().map(|a| a.kind()).collect();

        if !adapters.is_empty() {
            info!(
                "Loading multi-condition base pipeline with {} control adapter(s).",
                adapters.len()
            );
        } else {
            info!("Loading plain base pipeline.");
        }

        let mut backend = match self.provider.load_base(&self.config.model_id, adapters) {
            Ok(backend) => backend,
            Err(err) => {
                // The one fatal step. Logged once here; requests fall back
                // silently from now on.
                error!(
                    "Base model load failed for {}; every request will use the fallback path: {}",
                    self.config.model_id, err
                );
                return None;
            }
        };

        let capabilities = CapabilityLoader::apply(backend.as_mut(), &self.config);
        self.finalize_placement(backend.as_mut());

        info!(
            "Pipeline ready: model={} capabilities={:?} control={:?}",
            self.config.model_id, capabilities, control_kinds
        );

        Some(Arc::new(Pipeline {
            backend: Mutex::new(backend),
            capabilities,
            control_kinds,
        }))
    }

    /// Authenticate with the model host when a token is available; failure
    /// leaves the build running unauthenticated.
    fn login(&self) {
        let Some(token) = self.config.resolve_hub_token() else {
            debug!("No model host token configured.");
            return;
        };
        match self.provider.authenticate(&token) {
            Ok(()) => info!("Authenticated with the model host."),
            Err(err) => warn!("Model host authentication failed: {}", err),
        }
    }

    /// Load the configured control adapters, skipping individual failures.
    fn load_control_adapters(&self) -> Vec<Box<dyn ControlAdapter>> {
        if !self.config.control.enabled {
            debug!("Control conditioning is not enabled in configuration.");
            return Vec::new();
        }
        let kinds = self.config.condition_kinds();
        if kinds.is_empty() {
            debug!("No condition types specified.");
            return Vec::new();
        }

        let mut adapters = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let model_id = self.config.control.adapter_model_id(kind);
            match self.provider.load_control_adapter(kind, &model_id) {
                Ok(adapter) => {
                    info!("Control adapter '{}' loaded from {}.", kind, model_id);
                    adapters.push(adapter);
                }
                Err(err) => {
                    warn!("Control adapter '{}' load failed: {}", kind, err);
                }
            }
        }
        adapters
    }

    /// Apply the configured placement mode; failure is degradable.
    fn finalize_placement(&self, backend: &mut dyn GenerationBackend) {
        match backend.set_placement(self.config.placement) {
            Ok(()) => debug!("Placement finalized: {:?}", self.config.placement),
            Err(err) => warn!("Placement failed, continuing with defaults: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBehavior, MockProvider};

    #[test]
    fn test_build_runs_once() {
        let provider = Arc::new(MockProvider::new(MockBehavior::default()));
        let factory = PipelineFactory::new(
            Arc::new(GenerationConfig::default()),
            provider.clone(),
        );

        let first = factory.get_or_build();
        let second = factory.get_or_build();
        assert!(first.is_some());
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));
        assert_eq!(provider.base_loads(), 1);
    }

    #[test]
    fn test_failed_build_is_terminal() {
        let provider = Arc::new(MockProvider::new(MockBehavior {
            fail_base: true,
            ..MockBehavior::default()
        }));
        let factory = PipelineFactory::new(
            Arc::new(GenerationConfig::default()),
            provider.clone(),
        );

        assert!(factory.get_or_build().is_none());
        assert!(factory.get_or_build().is_none());
        // No retry happened.
        assert_eq!(provider.base_loads(), 1);
    }

    #[test]
    fn test_adapter_failure_degrades_to_plain_pipeline() {
        let mut config = GenerationConfig::default();
        config.control.enabled = true;
        config.control.types = vec!["canny".into(), "depth".into()];

        let provider = Arc::new(MockProvider::new(MockBehavior {
            failing_adapters: vec![ConditionKind::Canny, ConditionKind::Depth],
            ..MockBehavior::default()
        }));
        let factory = PipelineFactory::new(Arc::new(config), provider);

        let pipeline = factory.get_or_build().unwrap();
        assert!(!pipeline.has_control());
    }

    #[test]
    fn test_partial_adapter_failure_keeps_the_rest() {
        let mut config = GenerationConfig::default();
        config.control.enabled = true;
        config.control.types = vec!["canny".into(), "depth".into()];

        let provider = Arc::new(MockProvider::new(MockBehavior {
            failing_adapters: vec![ConditionKind::Depth],
            ..MockBehavior::default()
        }));
        let factory = PipelineFactory::new(Arc::new(config), provider);

        let pipeline = factory.get_or_build().unwrap();
        assert_eq!(pipeline.control_kinds(), &[ConditionKind::Canny]);
    }

    #[test]
    fn test_get_does_not_build() {
        let provider = Arc::new(MockProvider::new(MockBehavior::default()));
        let factory = PipelineFactory::new(
            Arc::new(GenerationConfig::default()),
            provider.clone(),
        );
        assert!(factory.get().is_none());
        assert_eq!(provider.base_loads(), 0);
    }
}
