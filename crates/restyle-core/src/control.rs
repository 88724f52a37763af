//! Control-image extraction over the detector registry.
//!
//! Runs each requested condition type through its detector inside an
//! isolated failure boundary: a failed or unknown type is logged and
//! skipped, never aborting the batch. The returned sequence preserves the
//! order of the successful extractions.

use std::sync::Arc;

use image::RgbImage;
use log::{debug, warn};

use crate::detector::{ConditionKind, DetectorRegistry};

/// A successfully derived control image with its human-readable label.
#[derive(Debug, Clone)]
pub struct ControlImage {
    /// The derived control representation.
    pub image: RgbImage,
    /// Label identifying which condition produced it.
    pub description: String,
}

/// Extracts control images for a configured list of condition types.
pub struct ControlImageProcessor {
    registry: Arc<DetectorRegistry>,
}

impl ControlImageProcessor {
    /// Create a processor over `registry`.
    pub fn new(registry: Arc<DetectorRegistry>) -> Self {
        Self { registry }
    }

    /// Derive one control image per successful condition type, in order.
    ///
    /// A missing detector or a failed extraction is logged and skipped;
    /// failure of one type never prevents the next from running.
    pub fn process(&self, image: &RgbImage, kinds: &[ConditionKind]) -> Vec<ControlImage> {
        let mut control_images = Vec::with_capacity(kinds.len());

        for kind in kinds {
            let Some(entry) = self.registry.resolve(*kind) else {
                warn!("No detector found for condition type: {}", kind);
                continue;
            };

            match entry.extract(image) {
                Ok(derived) => {
                    debug!("Processed control image for '{}'", kind);
                    control_images.push(ControlImage {
                        image: derived,
                        description: kind.description().to_string(),
                    });
                }
                Err(err) => {
                    warn!("Failed to process control image for '{}': {}", kind, err);
                }
            }
        }

        control_images
    }
}
