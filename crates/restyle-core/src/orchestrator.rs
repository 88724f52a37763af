//! Top-level generation orchestration.
//!
//! [`GenerationOrchestrator::generate`] is the entry point the request layer
//! calls: it resolves configuration, obtains the cached pipeline, prepares
//! conditioning inputs, and issues the generation call. It never returns an
//! error — when the pipeline is unavailable or the generation call fails,
//! the response is the deterministic fallback transform with
//! `used_fallback = true`. Degraded mode is a designed outcome, not an error
//! path.

use std::sync::Arc;

use image::RgbImage;
use log::{debug, info, warn};

use crate::backend::GenerationRequest;
use crate::config::{AdapterScales, GenerationConfig};
use crate::control::{ControlImage, ControlImageProcessor};
use crate::detector::DetectorRegistry;
use crate::error::BackendResult;
use crate::factory::{Pipeline, PipelineFactory};
use crate::imaging;

/// Per-request overrides. Absent fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Prompt override.
    pub prompt: Option<String>,
    /// Negative prompt override.
    pub negative_prompt: Option<String>,
    /// Style reference override; otherwise the configured path is used.
    pub style_image: Option<RgbImage>,
    /// Adapter scale override.
    pub adapter_scales: Option<AdapterScales>,
}

/// Outcome of one generation request.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The stylized output image (or the fallback transform of the input).
    pub image: RgbImage,
    /// Whether the deterministic fallback path produced the image.
    pub used_fallback: bool,
    /// Control images derived for this request; empty on any fallback.
    pub control_images: Vec<ControlImage>,
}

/// Coordinates pipeline acquisition, conditioning, and the generation call.
pub struct GenerationOrchestrator {
    config: Arc<GenerationConfig>,
    factory: Arc<PipelineFactory>,
    processor: ControlImageProcessor,
}

impl GenerationOrchestrator {
    /// Create an orchestrator over the shared factory and detector registry.
    pub fn new(
        config: Arc<GenerationConfig>,
        factory: Arc<PipelineFactory>,
        registry: Arc<DetectorRegistry>,
    ) -> Self {
        Self {
            config,
            factory,
            processor: ControlImageProcessor::new(registry),
        }
    }

    /// Run one generation request. Always produces a result.
    pub fn generate(&self, input: &RgbImage, options: &GenerationOptions) -> GenerationResult {
        let Some(pipeline) = self.factory.get_or_build() else {
            info!("Using fallback image effect because the pipeline is unavailable.");
            return self.fallback(input);
        };

        match self.run_pipeline(&pipeline, input, options) {
            Ok(result) => result,
            Err(err) => {
                // Partially derived control images are discarded with the
                // failed attempt: a fallback response never carries controls.
                warn!("Generation failed; using fallback effect: {}", err);
                self.fallback(input)
            }
        }
    }

    fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        input: &RgbImage,
        options: &GenerationOptions,
    ) -> BackendResult<GenerationResult> {
        let config = &self.config;
        let prompt = options
            .prompt
            .clone()
            .unwrap_or_else(|| config.default_prompt.clone());
        let negative_prompt = options
            .negative_prompt
            .clone()
            .unwrap_or_else(|| config.default_negative_prompt.clone());
        debug!("Generating with prompt: {}", prompt);

        let conditioned = imaging::resize_to(input, config.width, config.height);

        let mut control_images: Vec<ControlImage> = Vec::new();
        let mut control_scales: Vec<f32> = Vec::new();
        if pipeline.has_control() {
            control_images = self
                .processor
                .process(&conditioned, pipeline.control_kinds());
            if !control_images.is_empty() {
                control_scales = config
                    .control_conditioning_scale
                    .resolve(control_images.len());
                debug!(
                    "Control conditioning: {} image(s), scales={:?}",
                    control_images.len(),
                    control_scales
                );
            }
        }

        let mut adapter_images: Vec<RgbImage> = Vec::new();
        let mut adapter_scales: Option<Vec<f32>> = None;
        if pipeline.capabilities().style_adapter {
            adapter_images.push(conditioned.clone());
            let style = options.style_image.clone().or_else(|| {
                config
                    .style_image_path
                    .as_deref()
                    .and_then(imaging::load_style_image)
            });
            if let Some(style) = style {
                adapter_images.push(style);
            }
            adapter_scales = Some(
                options
                    .adapter_scales
                    .unwrap_or(config.adapter_scales)
                    .as_vec(),
            );
        }

        let request = GenerationRequest {
            prompt,
            negative_prompt,
            width: config.width,
            height: config.height,
            num_inference_steps: config.num_inference_steps,
            guidance_scale: config.guidance_scale,
            adapter_images,
            control_images: control_images.iter().map(|c| c.image.clone()).collect(),
            control_scales,
        };

        let image = pipeline.generate(adapter_scales.as_deref(), &request)?;
        info!("Generation complete.");

        Ok(GenerationResult {
            image,
            used_fallback: false,
            control_images,
        })
    }

    fn fallback(&self, input: &RgbImage) -> GenerationResult {
        GenerationResult {
            image: imaging::fallback_effect(input),
            used_fallback: true,
            control_images: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StyleAdapterConfig;
    use crate::detector::ConditionKind;
    use crate::testing::{
        echo_detector_factory, failing_detector_factory, sample_image, MockBehavior, MockProvider,
    };

    fn orchestrator_with(
        config: GenerationConfig,
        behavior: MockBehavior,
        registry: DetectorRegistry,
    ) -> (GenerationOrchestrator, Arc<MockProvider>) {
        let config = Arc::new(config);
        let provider = Arc::new(MockProvider::new(behavior));
        let factory = Arc::new(PipelineFactory::new(
            Arc::clone(&config),
            provider.clone() as Arc<dyn crate::backend::BackendProvider>,
        ));
        let orchestrator =
            GenerationOrchestrator::new(config, factory, Arc::new(registry));
        (orchestrator, provider)
    }

    fn style_config() -> GenerationConfig {
        let mut config = GenerationConfig::default();
        config.width = 64;
        config.height = 64;
        config.style_adapter = Some(StyleAdapterConfig {
            repo: "acme/adapters".into(),
            subfolder: "models".into(),
            weight_names: vec!["identity.safetensors".into(), "style.safetensors".into()],
        });
        config
    }

    #[test]
    fn test_unavailable_pipeline_falls_back_deterministically() {
        let (orchestrator, _) = orchestrator_with(
            style_config(),
            MockBehavior {
                fail_base: true,
                ..MockBehavior::default()
            },
            DetectorRegistry::new(),
        );

        let input = sample_image(48, 32);
        let first = orchestrator.generate(&input, &GenerationOptions::default());
        let second = orchestrator.generate(&input, &GenerationOptions::default());

        assert!(first.used_fallback);
        assert!(first.control_images.is_empty());
        assert_eq!(first.image.as_raw(), second.image.as_raw());
        // Fallback preserves input dimensions, not configured ones.
        assert_eq!(first.image.dimensions(), (48, 32));
    }

    #[test]
    fn test_generation_failure_discards_control_images() {
        let mut config = style_config();
        config.control.enabled = true;
        config.control.types = vec!["canny".into()];

        let mut registry = DetectorRegistry::new();
        registry.register(ConditionKind::Canny, echo_detector_factory());

        let (orchestrator, _) = orchestrator_with(
            config,
            MockBehavior {
                fail_generate: true,
                ..MockBehavior::default()
            },
            registry,
        );

        let result = orchestrator.generate(&sample_image(32, 32), &GenerationOptions::default());
        assert!(result.used_fallback);
        assert!(result.control_images.is_empty());
    }

    #[test]
    fn test_successful_generation_carries_control_images() {
        let mut config = style_config();
        config.control.enabled = true;
        config.control.types = vec!["canny".into()];

        let mut registry = DetectorRegistry::new();
        registry.register(ConditionKind::Canny, echo_detector_factory());

        let (orchestrator, provider) =
            orchestrator_with(config, MockBehavior::default(), registry);

        let result = orchestrator.generate(&sample_image(32, 32), &GenerationOptions::default());
        assert!(!result.used_fallback);
        assert_eq!(result.control_images.len(), 1);
        assert_eq!(result.control_images[0].description, "Canny Edge Detection");
        assert_eq!(result.image.dimensions(), (64, 64));

        let records = provider.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].control_count, 1);
    }

    #[test]
    fn test_failed_extractor_is_absent_from_result() {
        let mut config = style_config();
        config.control.enabled = true;
        config.control.types = vec!["canny".into(), "pose".into()];

        let mut registry = DetectorRegistry::new();
        registry.register(ConditionKind::Canny, echo_detector_factory());
        registry.register(ConditionKind::Pose, failing_detector_factory());

        let (orchestrator, _) = orchestrator_with(config, MockBehavior::default(), registry);

        let result = orchestrator.generate(&sample_image(32, 32), &GenerationOptions::default());
        assert!(!result.used_fallback);
        assert_eq!(result.control_images.len(), 1);
        assert_eq!(result.control_images[0].description, "Canny Edge Detection");
    }

    #[test]
    fn test_prompt_and_scale_overrides_reach_the_backend() {
        let (orchestrator, provider) = orchestrator_with(
            style_config(),
            MockBehavior::default(),
            DetectorRegistry::new(),
        );

        let options = GenerationOptions {
            prompt: Some("a watercolor portrait".into()),
            adapter_scales: Some(AdapterScales {
                face_scale: 0.9,
                style_scale: 0.1,
            }),
            ..GenerationOptions::default()
        };
        let result = orchestrator.generate(&sample_image(16, 16), &options);
        assert!(!result.used_fallback);

        let records = provider.records();
        assert_eq!(records[0].prompt, "a watercolor portrait");
        assert_eq!(records[0].adapter_scales.as_deref(), Some(&[0.9f32, 0.1][..]));
    }

    #[test]
    fn test_no_adapter_scales_without_style_capability() {
        // Configuration without a style adapter section: the capability is
        // off and no scales are applied before generation.
        let mut config = GenerationConfig::default();
        config.width = 32;
        config.height = 32;

        let (orchestrator, provider) = orchestrator_with(
            config,
            MockBehavior::default(),
            DetectorRegistry::new(),
        );

        let result = orchestrator.generate(&sample_image(16, 16), &GenerationOptions::default());
        assert!(!result.used_fallback);
        assert_eq!(provider.records()[0].adapter_scales, None);
    }
}
