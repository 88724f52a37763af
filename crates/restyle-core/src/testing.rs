//! Mock implementations and fixtures for testing.
//!
//! Provides scriptable versions of the backend provider, backend, and
//! detectors so the orchestration layers can be exercised without model
//! files. Failure injection is driven by [`MockBehavior`]; generation calls
//! are recorded for assertions about scales, prompts, and call counts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::backend::{BackendProvider, ControlAdapter, GenerationBackend, GenerationRequest};
use crate::detector::{ConditionKind, Detector, DetectorFactory};
use crate::error::{BackendError, BackendResult, DetectorError, DetectorResult};

/// Failure-injection switches for [`MockProvider`] and the backends it
/// creates.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Base model load fails (the fatal build step).
    pub fail_base: bool,
    /// Authentication fails.
    pub fail_auth: bool,
    /// Control adapters that fail to load.
    pub failing_adapters: Vec<ConditionKind>,
    /// The generation call itself fails.
    pub fail_generate: bool,
    /// Attention-efficiency optimization is unsupported.
    pub fail_attention: bool,
    /// Style adapter load fails.
    pub fail_style_adapter: bool,
    /// Embedding sources that fail to load.
    pub failing_embeddings: Vec<String>,
    /// Acceleration adapter install fails.
    pub fail_accelerator: bool,
    /// Sleep inside `generate` while holding the pipeline lock; used to
    /// force interleaving in contention tests.
    pub generate_hold: Option<Duration>,
}

/// One recorded generation call.
#[derive(Debug, Clone)]
pub struct GenerationRecord {
    /// Prompt the call carried.
    pub prompt: String,
    /// Adapter scales in effect when the call ran.
    pub adapter_scales: Option<Vec<f32>>,
    /// Number of control images attached.
    pub control_count: usize,
}

/// Scriptable [`BackendProvider`].
pub struct MockProvider {
    behavior: MockBehavior,
    base_loads: AtomicUsize,
    records: Arc<Mutex<Vec<GenerationRecord>>>,
}

impl MockProvider {
    /// Create a provider with the given behavior.
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            base_loads: AtomicUsize::new(0),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// How many times `load_base` ran.
    pub fn base_loads(&self) -> usize {
        self.base_loads.load(Ordering::SeqCst)
    }

    /// Snapshot of every recorded generation call, in completion order.
    pub fn records(&self) -> Vec<GenerationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BackendProvider for MockProvider {
    fn authenticate(&self, _token: &str) -> BackendResult<()> {
        if self.behavior.fail_auth {
            Err(BackendError::Auth("mock auth rejected".into()))
        } else {
            Ok(())
        }
    }

    fn load_control_adapter(
        &self,
        kind: ConditionKind,
        model_id: &str,
    ) -> BackendResult<Box<dyn ControlAdapter>> {
        if self.behavior.failing_adapters.contains(&kind) {
            return Err(BackendError::load_failed(format!(
                "mock adapter load failure for {}",
                kind
            )));
        }
        Ok(Box::new(MockAdapter {
            kind,
            model_id: model_id.to_string(),
        }))
    }

    fn load_base(
        &self,
        model_id: &str,
        _adapters: Vec<Box<dyn ControlAdapter>>,
    ) -> BackendResult<Box<dyn GenerationBackend>> {
        self.base_loads.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_base {
            return Err(BackendError::model_not_found(model_id.to_string()));
        }
        Ok(Box::new(MockBackend {
            behavior: self.behavior.clone(),
            records: Arc::clone(&self.records),
            current_scales: None,
        }))
    }
}

/// Control adapter handle produced by [`MockProvider`].
pub struct MockAdapter {
    kind: ConditionKind,
    model_id: String,
}

impl ControlAdapter for MockAdapter {
    fn kind(&self) -> ConditionKind {
        self.kind
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Scriptable [`GenerationBackend`] that records its calls.
pub struct MockBackend {
    behavior: MockBehavior,
    records: Arc<Mutex<Vec<GenerationRecord>>>,
    current_scales: Option<Vec<f32>>,
}

impl GenerationBackend for MockBackend {
    fn generate(&mut self, request: &GenerationRequest) -> BackendResult<RgbImage> {
        if let Some(hold) = self.behavior.generate_hold {
            std::thread::sleep(hold);
        }
        if self.behavior.fail_generate {
            return Err(BackendError::generation("mock generation failure"));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(GenerationRecord {
                prompt: request.prompt.clone(),
                adapter_scales: self.current_scales.clone(),
                control_count: request.control_images.len(),
            });
        Ok(RgbImage::from_pixel(
            request.width,
            request.height,
            Rgb([200, 120, 80]),
        ))
    }

    fn set_adapter_scales(&mut self, scales: &[f32]) -> BackendResult<()> {
        self.current_scales = Some(scales.to_vec());
        Ok(())
    }

    fn enable_attention_slicing(&mut self) -> BackendResult<()> {
        if self.behavior.fail_attention {
            Err(BackendError::Unsupported("attention slicing"))
        } else {
            Ok(())
        }
    }

    fn load_style_adapter(
        &mut self,
        _repo: &str,
        _subfolder: &str,
        _weight_names: &[String],
    ) -> BackendResult<()> {
        if self.behavior.fail_style_adapter {
            Err(BackendError::load_failed("mock style adapter failure"))
        } else {
            Ok(())
        }
    }

    fn load_embedding(&mut self, source: &str) -> BackendResult<()> {
        if self.behavior.failing_embeddings.iter().any(|s| s == source) {
            Err(BackendError::load_failed(source.to_string()))
        } else {
            Ok(())
        }
    }

    fn install_accelerator(&mut self, _module_id: &str) -> BackendResult<()> {
        if self.behavior.fail_accelerator {
            Err(BackendError::load_failed("mock accelerator failure"))
        } else {
            Ok(())
        }
    }
}

/// Detector that echoes its input; always succeeds.
pub struct EchoDetector;

impl Detector for EchoDetector {
    fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
        Ok(image.clone())
    }

    fn name(&self) -> &'static str {
        "Echo"
    }
}

/// Detector that always fails extraction.
pub struct FailingDetector;

impl Detector for FailingDetector {
    fn extract(&self, _image: &RgbImage) -> DetectorResult<RgbImage> {
        Err(DetectorError::extraction("induced detector failure"))
    }

    fn name(&self) -> &'static str {
        "Failing"
    }
}

/// Registry factory for [`EchoDetector`].
pub fn echo_detector_factory() -> DetectorFactory {
    Box::new(|| Ok(Box::new(EchoDetector) as Box<dyn Detector>))
}

/// Registry factory for [`FailingDetector`].
pub fn failing_detector_factory() -> DetectorFactory {
    Box::new(|| Ok(Box::new(FailingDetector) as Box<dyn Detector>))
}

/// Deterministic gradient test image.
pub fn sample_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}
