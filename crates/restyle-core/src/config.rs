//! Generation configuration document.
//!
//! The configuration is a JSON document loaded once per process and immutable
//! afterwards. Every key is optional; missing keys fall back to the defaults
//! documented on each field. A malformed document is a deployment error and
//! propagates loudly instead of being absorbed into the degraded path.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::detector::ConditionKind;
use crate::error::RestyleResult;

/// Environment variable consulted when no `hub_token` is configured.
pub const HUB_TOKEN_ENV: &str = "RESTYLE_HUB_TOKEN";

/// Top-level generation configuration.
///
/// Read-only after load; the process-scoped context owns the single instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base model identifier on the model host.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Output/conditioning image width in pixels.
    #[serde(default = "default_dimension")]
    pub width: u32,

    /// Output/conditioning image height in pixels.
    #[serde(default = "default_dimension")]
    pub height: u32,

    /// Number of denoising steps per generation call.
    #[serde(default = "default_steps")]
    pub num_inference_steps: u32,

    /// Classifier-free guidance scale.
    #[serde(default = "default_guidance")]
    pub guidance_scale: f32,

    /// Prompt used when the request carries no override.
    #[serde(default)]
    pub default_prompt: String,

    /// Negative prompt used when the request carries no override.
    #[serde(default)]
    pub default_negative_prompt: String,

    /// Path to the style reference image handed to the style adapter.
    #[serde(default)]
    pub style_image_path: Option<PathBuf>,

    /// Per-adapter conditioning weights (identity vs. style reference).
    #[serde(default)]
    pub adapter_scales: AdapterScales,

    /// Conditioning strength for control images: a scalar broadcast to every
    /// control, or an explicit per-control list.
    #[serde(default)]
    pub control_conditioning_scale: ConditioningScale,

    /// Attempt the attention-efficiency optimization during pipeline build.
    #[serde(default = "default_true")]
    pub enable_attention_slicing: bool,

    /// Style/identity adapter-image conditioning. Absent section means the
    /// capability step is a no-op.
    #[serde(default)]
    pub style_adapter: Option<StyleAdapterConfig>,

    /// Embedding customization sources, loaded independently of one another.
    #[serde(default)]
    pub embedding_sources: Vec<String>,

    /// Low-step acceleration adapter settings.
    #[serde(default)]
    pub accelerator: AcceleratorConfig,

    /// Device/memory placement applied after the capability steps.
    #[serde(default)]
    pub placement: PlacementMode,

    /// Control-map extraction and adapter settings.
    #[serde(default)]
    pub control: ControlConfig,

    /// Directory holding the detector model files (depth/pose). Absent means
    /// the model-backed detectors fail per call and are skipped.
    #[serde(default)]
    pub detector_model_dir: Option<PathBuf>,

    /// Model host auth token. Supports the `$ENV_VAR` indirection syntax;
    /// when absent, [`HUB_TOKEN_ENV`] is consulted.
    #[serde(default)]
    pub hub_token: Option<String>,
}

fn default_model_id() -> String {
    "runwayml/stable-diffusion-v1-5".to_string()
}

fn default_dimension() -> u32 {
    768
}

fn default_steps() -> u32 {
    50
}

fn default_guidance() -> f32 {
    7.5
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            width: default_dimension(),
            height: default_dimension(),
            num_inference_steps: default_steps(),
            guidance_scale: default_guidance(),
            default_prompt: String::new(),
            default_negative_prompt: String::new(),
            style_image_path: None,
            adapter_scales: AdapterScales::default(),
            control_conditioning_scale: ConditioningScale::default(),
            enable_attention_slicing: true,
            style_adapter: None,
            embedding_sources: Vec::new(),
            accelerator: AcceleratorConfig::default(),
            placement: PlacementMode::default(),
            control: ControlConfig::default(),
            detector_model_dir: None,
            hub_token: None,
        }
    }
}

impl GenerationConfig {
    /// Load the configuration from a JSON file.
    ///
    /// Missing keys fall back to defaults; an unreadable or malformed
    /// document is returned as an error.
    pub fn load(path: impl AsRef<Path>) -> RestyleResult<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: GenerationConfig = serde_json::from_str(&raw)?;
        log::info!("Loaded generation configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve the model host auth token.
    ///
    /// A configured value starting with `$` is read from the named
    /// environment variable; otherwise the value is used directly. Without a
    /// configured value, [`HUB_TOKEN_ENV`] is consulted.
    pub fn resolve_hub_token(&self) -> Option<String> {
        if let Some(token) = &self.hub_token {
            if let Some(env_var) = token.strip_prefix('$') {
                return std::env::var(env_var).ok();
            }
            return Some(token.clone());
        }
        std::env::var(HUB_TOKEN_ENV).ok()
    }

    /// Condition types requested by the configuration, in configured order.
    ///
    /// Unknown type names are skipped with a warning; they are a soft
    /// configuration mistake, not a fatal one.
    pub fn condition_kinds(&self) -> Vec<ConditionKind> {
        self.control.condition_kinds()
    }
}

/// Identity/style adapter conditioning weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdapterScales {
    /// Weight of the identity (input image) adapter.
    #[serde(default = "default_face_scale")]
    pub face_scale: f32,

    /// Weight of the style reference adapter.
    #[serde(default = "default_style_scale")]
    pub style_scale: f32,
}

fn default_face_scale() -> f32 {
    0.6
}

fn default_style_scale() -> f32 {
    0.4
}

impl Default for AdapterScales {
    fn default() -> Self {
        Self {
            face_scale: default_face_scale(),
            style_scale: default_style_scale(),
        }
    }
}

impl AdapterScales {
    /// Ordered scale vector as the backend expects it: identity, then style.
    pub fn as_vec(&self) -> Vec<f32> {
        vec![self.face_scale, self.style_scale]
    }
}

/// Conditioning strength for control images.
///
/// Both document shapes are accepted: a bare number broadcast to every
/// control, or an explicit per-control array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditioningScale {
    /// One value applied to every control image.
    Uniform(f32),
    /// One value per control image, in control order.
    PerControl(Vec<f32>),
}

impl Default for ConditioningScale {
    fn default() -> Self {
        ConditioningScale::Uniform(0.8)
    }
}

impl ConditioningScale {
    /// Resolve to one strength value per control image.
    pub fn resolve(&self, count: usize) -> Vec<f32> {
        match self {
            ConditioningScale::Uniform(scale) => vec![*scale; count],
            ConditioningScale::PerControl(scales) => scales.clone(),
        }
    }
}

/// Style/identity adapter-image conditioning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleAdapterConfig {
    /// Adapter repository identifier on the model host.
    #[serde(default = "default_style_adapter_repo")]
    pub repo: String,

    /// Subfolder within the repository.
    #[serde(default = "default_style_adapter_subfolder")]
    pub subfolder: String,

    /// Adapter weight files, one per conditioning slot. An empty list makes
    /// the capability step a no-op.
    #[serde(default)]
    pub weight_names: Vec<String>,
}

fn default_style_adapter_repo() -> String {
    "h94/IP-Adapter".to_string()
}

fn default_style_adapter_subfolder() -> String {
    "models".to_string()
}

/// Low-step acceleration adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    /// Only applied when explicitly enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Acceleration module identifier on the model host.
    #[serde(default = "default_accelerator_module")]
    pub module_id: String,
}

fn default_accelerator_module() -> String {
    "latent-consistency/lcm-lora-sdv1-5".to_string()
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            module_id: default_accelerator_module(),
        }
    }
}

/// Device/memory placement for the built pipeline. The two modes are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMode {
    /// Place the pipeline directly on the selected device.
    #[default]
    Direct,
    /// Memory-conserving offload placement.
    MemoryOffload,
}

/// Control-map extraction and adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Master toggle for control conditioning.
    #[serde(default)]
    pub enabled: bool,

    /// Requested condition type names, in conditioning order.
    #[serde(default)]
    pub types: Vec<String>,

    /// Per-type adapter model identifier overrides, merged over the
    /// built-in defaults.
    #[serde(default)]
    pub adapter_models: HashMap<String, String>,

    /// Lower hysteresis threshold for the Canny detector.
    #[serde(default = "default_canny_low")]
    pub canny_low_threshold: f32,

    /// Upper hysteresis threshold for the Canny detector.
    #[serde(default = "default_canny_high")]
    pub canny_high_threshold: f32,
}

fn default_canny_low() -> f32 {
    100.0
}

fn default_canny_high() -> f32 {
    200.0
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            types: Vec::new(),
            adapter_models: HashMap::new(),
            canny_low_threshold: default_canny_low(),
            canny_high_threshold: default_canny_high(),
        }
    }
}

impl ControlConfig {
    /// Parse the configured type names, skipping unknown ones with a warning.
    pub fn condition_kinds(&self) -> Vec<ConditionKind> {
        self.types
            .iter()
            .filter_map(|name| match name.parse::<ConditionKind>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    warn!("Unknown condition type in configuration: {}", name);
                    None
                }
            })
            .collect()
    }

    /// Adapter model identifier for a condition type: the configured
    /// override, or the built-in default.
    pub fn adapter_model_id(&self, kind: ConditionKind) -> String {
        self.adapter_models
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| kind.default_adapter_id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.width, 768);
        assert_eq!(config.height, 768);
        assert_eq!(config.num_inference_steps, 50);
        assert!((config.guidance_scale - 7.5).abs() < f32::EPSILON);
        assert_eq!(config.placement, PlacementMode::Direct);
        assert!(!config.control.enabled);
        assert!(!config.accelerator.enabled);
    }

    #[test]
    fn test_empty_document_matches_defaults() {
        let config: GenerationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GenerationConfig::default());
    }

    #[test]
    fn test_conditioning_scale_shapes() {
        let uniform: ConditioningScale = serde_json::from_str("0.8").unwrap();
        assert_eq!(uniform.resolve(3), vec![0.8, 0.8, 0.8]);

        let per_control: ConditioningScale = serde_json::from_str("[0.5, 0.9]").unwrap();
        assert_eq!(per_control.resolve(2), vec![0.5, 0.9]);
    }

    #[test]
    fn test_condition_kinds_skip_unknown() {
        let control = ControlConfig {
            enabled: true,
            types: vec!["canny".into(), "watercolor".into(), "depth".into()],
            ..ControlConfig::default()
        };
        assert_eq!(
            control.condition_kinds(),
            vec![ConditionKind::Canny, ConditionKind::Depth]
        );
    }

    #[test]
    fn test_adapter_model_override() {
        let mut control = ControlConfig::default();
        control
            .adapter_models
            .insert("canny".into(), "acme/canny-adapter".into());
        assert_eq!(
            control.adapter_model_id(ConditionKind::Canny),
            "acme/canny-adapter"
        );
        assert_eq!(
            control.adapter_model_id(ConditionKind::Depth),
            ConditionKind::Depth.default_adapter_id()
        );
    }

    #[test]
    fn test_hub_token_env_indirection() {
        std::env::set_var("RESTYLE_TEST_TOKEN", "tok-123");
        let config = GenerationConfig {
            hub_token: Some("$RESTYLE_TEST_TOKEN".to_string()),
            ..GenerationConfig::default()
        };
        assert_eq!(config.resolve_hub_token().as_deref(), Some("tok-123"));
        std::env::remove_var("RESTYLE_TEST_TOKEN");
    }

    #[test]
    fn test_load_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(GenerationConfig::load(&path).is_err());
    }
}
