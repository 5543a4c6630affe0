//! Post-inference processing: decoding, suppression and temporal smoothing

pub mod geometry;
pub mod smoother;
pub mod suppression;

pub use geometry::{BoundingBox, RawDetections};
pub use smoother::{DetectionSmoother, SettleEvent, TrackedClassId};
pub use suppression::Suppressor;

use serde::{Deserialize, Serialize};

/// A detection that survived suppression and class filtering.
///
/// The box stays in model-input space; the renderer maps it to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: usize, score: f32) -> Self {
        Self {
            bbox,
            class_id,
            score,
        }
    }
}
