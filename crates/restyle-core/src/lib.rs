//! restyle-core - The generation pipeline orchestrator for the restyle
//! image-to-image style transfer service.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restyle_core::{GenerationOptions, ServiceContext};
//!
//! let context = ServiceContext::from_config_file("model_config.json", provider)?;
//! let result = context.orchestrator().generate(&input_image, &GenerationOptions::default());
//! // result.image is always present; result.used_fallback says whether the
//! // model path or the deterministic fallback produced it.
//! ```
//!
//! ## Module Organization
//!
//! ### Orchestration
//! - [`orchestrator`] - top-level request flow; never fails a request
//! - [`factory`] - one-shot pipeline construction and the process singleton
//! - [`capability`] - optional capability steps and the flags they produce
//! - [`context`] - process-scoped owner of the long-lived state
//!
//! ### Conditioning
//! - [`detector`] - condition types and the feature-extraction detectors
//! - [`control`] - control-image extraction over the registry
//! - [`imaging`] - resize, style-image loading, the fallback transform
//!
//! ### Seams & Support
//! - [`backend`] - provider/backend traits the model runtime implements
//! - [`config`] - the generation configuration document
//! - [`error`] - canonical error hierarchy
//!
//! ## Degradation Contract
//!
//! Every optional piece of the pipeline fails independently: a missing
//! control adapter, a broken detector, an unsupported capability, or an
//! unavailable base model each degrade the response rather than erroring it.
//! The only loud failures are configuration mistakes at startup.

pub mod error;
pub use error::{BackendError, DetectorError, RestyleError, RestyleResult};

/// Generation configuration document.
pub mod config;
pub use config::{AdapterScales, ConditioningScale, GenerationConfig, PlacementMode};

/// Process-scoped context owning the long-lived state.
pub mod context;
pub use context::ServiceContext;

/// Generation backend seams.
pub mod backend;
pub use backend::{BackendProvider, GenerationBackend, GenerationRequest};

/// Optional capability loading.
pub mod capability;
pub use capability::CapabilityFlags;

/// Pipeline construction and the process singleton.
pub mod factory;
pub use factory::{Pipeline, PipelineFactory};

/// Condition types and feature-extraction detectors.
pub mod detector;
pub use detector::{ConditionKind, DetectorRegistry};

/// Control-image extraction.
pub mod control;
pub use control::{ControlImage, ControlImageProcessor};

/// Top-level request orchestration.
pub mod orchestrator;
pub use orchestrator::{GenerationOptions, GenerationOrchestrator, GenerationResult};

/// Image helpers (resize, fallback transform).
pub mod imaging;

/// Mocks and fixtures for exercising the orchestration layers without model
/// files.
#[doc(hidden)]
pub mod testing;
