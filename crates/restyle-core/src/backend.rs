//! Generation backend seams.
//!
//! The heavyweight generative model lives behind these traits: the core only
//! depends on call signatures and success/failure, never on transport or
//! framework details. [`BackendProvider`] is the factory seam (model host
//! access, adapter loading, base construction); [`GenerationBackend`] is the
//! built pipeline object the orchestrator drives.
//!
//! Optional capabilities default to [`BackendError::Unsupported`], so a
//! provider only implements what its runtime actually offers; the capability
//! loader records what stuck in [`CapabilityFlags`](crate::capability::CapabilityFlags)
//! instead of probing the object at call time.

use image::RgbImage;

use crate::config::PlacementMode;
use crate::detector::ConditionKind;
use crate::error::BackendResult;

/// A single generation call, fully resolved: configuration defaults and
/// request overrides are already merged by the orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Positive prompt text.
    pub prompt: String,
    /// Negative prompt text.
    pub negative_prompt: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Denoising step count.
    pub num_inference_steps: u32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Adapter conditioning images (identity image first, then the optional
    /// style reference). Empty when adapter conditioning is disabled.
    pub adapter_images: Vec<RgbImage>,
    /// Control conditioning images, in condition order.
    pub control_images: Vec<RgbImage>,
    /// One conditioning strength per control image.
    pub control_scales: Vec<f32>,
}

/// A loaded control-condition adapter, handed back to the provider when the
/// base pipeline is constructed.
pub trait ControlAdapter: Send {
    /// Condition type this adapter serves.
    fn kind(&self) -> ConditionKind;

    /// Model identifier the adapter was loaded from.
    fn model_id(&self) -> &str;
}

/// The built generation pipeline object.
///
/// Mutating calls (`set_adapter_scales`, capability hooks) require `&mut`;
/// the owning [`Pipeline`](crate::factory::Pipeline) serializes access so a
/// scale update and the generation call it belongs to form one critical
/// section.
pub trait GenerationBackend: Send {
    /// Run one generation call.
    fn generate(&mut self, request: &GenerationRequest) -> BackendResult<RgbImage>;

    /// Apply per-request adapter conditioning weights.
    fn set_adapter_scales(&mut self, scales: &[f32]) -> BackendResult<()>;

    /// Enable the attention-efficiency optimization.
    fn enable_attention_slicing(&mut self) -> BackendResult<()> {
        Err(crate::error::BackendError::Unsupported("attention slicing"))
    }

    /// Load the style/identity adapter weights.
    fn load_style_adapter(
        &mut self,
        _repo: &str,
        _subfolder: &str,
        _weight_names: &[String],
    ) -> BackendResult<()> {
        Err(crate::error::BackendError::Unsupported("style adapter"))
    }

    /// Load one embedding customization source.
    fn load_embedding(&mut self, _source: &str) -> BackendResult<()> {
        Err(crate::error::BackendError::Unsupported(
            "embedding customization",
        ))
    }

    /// Install the low-step acceleration adapter, replacing the scheduling
    /// strategy on success.
    fn install_accelerator(&mut self, _module_id: &str) -> BackendResult<()> {
        Err(crate::error::BackendError::Unsupported(
            "acceleration adapter",
        ))
    }

    /// Finalize device/memory placement.
    fn set_placement(&mut self, _placement: PlacementMode) -> BackendResult<()> {
        Ok(())
    }
}

/// Factory seam for the generation backend.
///
/// Implementations talk to a concrete model runtime; the pipeline factory
/// only sequences the calls and absorbs their failures.
pub trait BackendProvider: Send + Sync {
    /// Authenticate with the model host. Failure leaves the provider
    /// unauthenticated but usable for public resources.
    fn authenticate(&self, token: &str) -> BackendResult<()>;

    /// Load one control-condition adapter by model identifier.
    fn load_control_adapter(
        &self,
        kind: ConditionKind,
        model_id: &str,
    ) -> BackendResult<Box<dyn ControlAdapter>>;

    /// Load the base model. `adapters` is empty for the plain variant and
    /// non-empty for the multi-condition-aware variant; which one is built
    /// follows from that.
    fn load_base(
        &self,
        model_id: &str,
        adapters: Vec<Box<dyn ControlAdapter>>,
    ) -> BackendResult<Box<dyn GenerationBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    struct MinimalBackend;

    impl GenerationBackend for MinimalBackend {
        fn generate(&mut self, request: &GenerationRequest) -> BackendResult<RgbImage> {
            Ok(RgbImage::new(request.width, request.height))
        }

        fn set_adapter_scales(&mut self, _scales: &[f32]) -> BackendResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_optional_capabilities_default_to_unsupported() {
        let mut backend = MinimalBackend;
        assert!(matches!(
            backend.enable_attention_slicing(),
            Err(BackendError::Unsupported(_))
        ));
        assert!(matches!(
            backend.load_embedding("acme/embedding"),
            Err(BackendError::Unsupported(_))
        ));
        assert!(matches!(
            backend.install_accelerator("acme/accelerator"),
            Err(BackendError::Unsupported(_))
        ));
        // Placement defaults to a no-op success.
        assert!(backend.set_placement(PlacementMode::Direct).is_ok());
    }
}
