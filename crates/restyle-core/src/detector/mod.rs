//! Pluggable feature-extraction detectors.
//!
//! Each condition type is served by a [`Detector`] implementation that turns
//! the conditioning image into its control representation (edge map, depth
//! map, pose map, ...). Detector instances are expensive to build, so the
//! registry memoizes each one behind a lazy, mutex-guarded slot: the first
//! `extract` call pays the initialization cost, later calls reuse the
//! instance for the process lifetime. An initialization failure surfaces as a
//! failure of that call only and leaves the slot empty.

pub mod canny;
pub mod depth;
mod gradient;
pub mod lineart;
pub mod pose;
pub mod session;
pub mod softedge;

pub use canny::CannyDetector;
pub use depth::DepthDetector;
pub use lineart::LineArtDetector;
pub use pose::PoseDetector;
pub use softedge::SoftEdgeDetector;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::error::DetectorResult;

/// Condition types understood by the control pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    /// Hard edges (Canny).
    Canny,
    /// Soft edge map (HED-style).
    SoftEdge,
    /// Line-art strokes.
    LineArt,
    /// Relative depth map.
    Depth,
    /// Body pose skeleton.
    Pose,
}

impl ConditionKind {
    /// All condition types, in canonical order.
    pub const ALL: [ConditionKind; 5] = [
        ConditionKind::Canny,
        ConditionKind::SoftEdge,
        ConditionKind::LineArt,
        ConditionKind::Depth,
        ConditionKind::Pose,
    ];

    /// Configuration/wire name of this condition type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Canny => "canny",
            ConditionKind::SoftEdge => "softedge",
            ConditionKind::LineArt => "lineart",
            ConditionKind::Depth => "depth",
            ConditionKind::Pose => "pose",
        }
    }

    /// Human-readable description attached to the derived control image.
    pub fn description(&self) -> &'static str {
        match self {
            ConditionKind::Canny => "Canny Edge Detection",
            ConditionKind::SoftEdge => "Soft Edge Detection (HED)",
            ConditionKind::LineArt => "Line Art Extraction",
            ConditionKind::Depth => "Depth Map Estimation",
            ConditionKind::Pose => "Pose Detection (OpenPose)",
        }
    }

    /// Default control-adapter model identifier for this condition type.
    pub fn default_adapter_id(&self) -> &'static str {
        match self {
            ConditionKind::Canny => "lllyasviel/control_v11p_sd15_canny",
            ConditionKind::SoftEdge => "lllyasviel/control_v11p_sd15_softedge",
            ConditionKind::LineArt => "lllyasviel/control_v11p_sd15_lineart",
            ConditionKind::Depth => "lllyasviel/control_v11f1p_sd15_depth",
            ConditionKind::Pose => "lllyasviel/control_v11p_sd15_openpose",
        }
    }

    /// Model file name looked up under the detector model directory, for the
    /// detectors that need one.
    pub fn model_file(&self) -> Option<&'static str> {
        match self {
            ConditionKind::Depth => Some("depth.onnx"),
            ConditionKind::Pose => Some("pose.onnx"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConditionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "canny" => Ok(ConditionKind::Canny),
            "softedge" | "soft_edge" | "hed" => Ok(ConditionKind::SoftEdge),
            "lineart" | "line_art" => Ok(ConditionKind::LineArt),
            "depth" => Ok(ConditionKind::Depth),
            "pose" | "openpose" => Ok(ConditionKind::Pose),
            _ => Err(format!(
                "Unknown condition type: '{}'. Valid values: canny, softedge, lineart, depth, pose",
                s
            )),
        }
    }
}

/// Trait for feature-extraction detectors.
///
/// `extract` is idempotent and side-effect-free on its input; implementations
/// may hold lazily built model state internally.
pub trait Detector: Send + Sync {
    /// Derive the control representation of `image`.
    fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage>;

    /// Human-readable name of this detector.
    fn name(&self) -> &'static str;
}

/// Factory producing a detector instance on first use.
pub type DetectorFactory = Box<dyn Fn() -> DetectorResult<Box<dyn Detector>> + Send + Sync>;

/// A registry entry: a detector built on first use and memoized for the
/// process lifetime.
///
/// Concurrent first calls serialize on the slot mutex so only one
/// initialization runs. A failed initialization leaves the slot empty; the
/// next call pays the cost again.
pub struct LazyDetector {
    kind: ConditionKind,
    factory: DetectorFactory,
    slot: Mutex<Option<Arc<dyn Detector>>>,
}

impl LazyDetector {
    /// Create a lazy entry for `kind` backed by `factory`.
    pub fn new(kind: ConditionKind, factory: DetectorFactory) -> Self {
        Self {
            kind,
            factory,
            slot: Mutex::new(None),
        }
    }

    /// The condition type this entry serves.
    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// Run extraction, initializing the detector on first use.
    pub fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
        let detector = self.get_or_init()?;
        detector.extract(image)
    }

    fn get_or_init(&self) -> DetectorResult<Arc<dyn Detector>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(detector) = slot.as_ref() {
            return Ok(Arc::clone(detector));
        }
        info!("Initializing {} detector...", self.kind);
        let detector: Arc<dyn Detector> = Arc::from((self.factory)()?);
        info!("{} detector ready.", detector.name());
        *slot = Some(Arc::clone(&detector));
        Ok(detector)
    }
}

/// Maps condition types to their lazily built detectors.
pub struct DetectorRegistry {
    entries: HashMap<ConditionKind, LazyDetector>,
}

impl DetectorRegistry {
    /// Empty registry; entries are added with [`register`](Self::register).
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with the built-in detector set, parameterized from `config`
    /// (Canny thresholds, detector model directory).
    pub fn with_defaults(config: &GenerationConfig) -> Self {
        let mut registry = Self::new();

        let low = config.control.canny_low_threshold;
        let high = config.control.canny_high_threshold;
        registry.register(
            ConditionKind::Canny,
            Box::new(move || Ok(Box::new(CannyDetector::new(low, high)) as Box<dyn Detector>)),
        );
        registry.register(
            ConditionKind::SoftEdge,
            Box::new(|| Ok(Box::new(SoftEdgeDetector::new()) as Box<dyn Detector>)),
        );
        registry.register(
            ConditionKind::LineArt,
            Box::new(|| Ok(Box::new(LineArtDetector::new()) as Box<dyn Detector>)),
        );

        for kind in [ConditionKind::Depth, ConditionKind::Pose] {
            let model_dir = config.detector_model_dir.clone();
            registry.register(
                kind,
                Box::new(move || {
                    let dir = model_dir.as_ref().ok_or_else(|| {
                        crate::error::DetectorError::init(
                            "no detector model directory configured",
                        )
                    })?;
                    let path = dir.join(kind.model_file().unwrap_or_default());
                    match kind {
                        ConditionKind::Depth => {
                            Ok(Box::new(DepthDetector::load(&path)?) as Box<dyn Detector>)
                        }
                        ConditionKind::Pose => {
                            Ok(Box::new(PoseDetector::load(&path)?) as Box<dyn Detector>)
                        }
                        _ => unreachable!("model-backed kinds only"),
                    }
                }),
            );
        }

        registry
    }

    /// Register (or replace) the entry for a condition type.
    pub fn register(&mut self, kind: ConditionKind, factory: DetectorFactory) {
        self.entries.insert(kind, LazyDetector::new(kind, factory));
    }

    /// Resolve a condition type to its entry. Absent means the type has no
    /// detector here; callers skip it with a warning.
    pub fn resolve(&self, kind: ConditionKind) -> Option<&LazyDetector> {
        let entry = self.entries.get(&kind);
        if entry.is_none() {
            debug!("No detector registered for condition type '{}'", kind);
        }
        entry
    }

    /// Registered condition types.
    pub fn kinds(&self) -> impl Iterator<Item = ConditionKind> + '_ {
        self.entries.keys().copied()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectorError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector;

    impl Detector for FixedDetector {
        fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
            Ok(image.clone())
        }

        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    #[test]
    fn test_condition_kind_round_trip() {
        for kind in ConditionKind::ALL {
            assert_eq!(kind.as_str().parse::<ConditionKind>().unwrap(), kind);
        }
        assert!("watercolor".parse::<ConditionKind>().is_err());
    }

    #[test]
    fn test_condition_kind_aliases() {
        assert_eq!("hed".parse::<ConditionKind>().unwrap(), ConditionKind::SoftEdge);
        assert_eq!("openpose".parse::<ConditionKind>().unwrap(), ConditionKind::Pose);
    }

    #[test]
    fn test_resolve_unknown_is_absent() {
        let registry = DetectorRegistry::new();
        assert!(registry.resolve(ConditionKind::Depth).is_none());
    }

    #[test]
    fn test_lazy_detector_initializes_once() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let entry = LazyDetector::new(
            ConditionKind::Canny,
            Box::new(|| {
                BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FixedDetector) as Box<dyn Detector>)
            }),
        );

        let image = RgbImage::new(4, 4);
        entry.extract(&image).unwrap();
        entry.extract(&image).unwrap();
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_detector_retries_after_init_failure() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);
        let entry = LazyDetector::new(
            ConditionKind::Depth,
            Box::new(|| {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DetectorError::init("model missing"))
                } else {
                    Ok(Box::new(FixedDetector) as Box<dyn Detector>)
                }
            }),
        );

        let image = RgbImage::new(4, 4);
        assert!(entry.extract(&image).is_err());
        assert!(entry.extract(&image).is_ok());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }
}
