//! Class-agnostic non-maximum suppression and class exclusion

use crate::config::DetectionConfig;
use crate::error::VisionError;
use crate::processing::geometry::RawDetections;
use crate::processing::Detection;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Greedy NMS followed by the excluded-class filter
#[derive(Debug, Clone)]
pub struct Suppressor {
    score_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
    excluded: Arc<BTreeSet<usize>>,
}

impl Suppressor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            score_threshold: config.score_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            excluded: Arc::new(config.excluded_classes.clone()),
        }
    }

    /// Suppress on the calling thread
    pub fn suppress(&self, raw: &RawDetections) -> Vec<Detection> {
        let mut kept = Vec::new();
        self.suppress_into(raw, &mut kept);
        kept
    }

    /// Suppress into `kept`, replacing its contents
    pub fn suppress_into(&self, raw: &RawDetections, kept: &mut Vec<Detection>) {
        kept.clear();

        // NaN scores fail the comparison and are dropped here
        let mut order: Vec<usize> = (0..raw.len())
            .filter(|&i| raw.scores[i] >= self.score_threshold)
            .collect();
        order.sort_by(|&a, &b| {
            raw.scores[b]
                .partial_cmp(&raw.scores[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        for &candidate in &order {
            if kept.len() >= self.max_detections {
                break;
            }
            let bbox = raw.boxes[candidate];
            let overlaps = kept
                .iter()
                .any(|k: &Detection| k.bbox.iou(&bbox) > self.iou_threshold);
            if !overlaps {
                kept.push(Detection::new(
                    bbox,
                    raw.class_ids[candidate],
                    raw.scores[candidate],
                ));
            }
        }

        let before = kept.len();
        kept.retain(|d| !self.excluded.contains(&d.class_id));

        debug!(
            "Suppression kept {} of {} candidates ({} above threshold, {} excluded)",
            kept.len(),
            raw.len(),
            order.len(),
            before - kept.len()
        );
    }

    /// Suppress on the blocking pool.
    ///
    /// The candidate buffer is handed back alongside the result so the caller
    /// can reuse it.
    pub async fn suppress_async(
        &self,
        raw: RawDetections,
    ) -> Result<(RawDetections, Vec<Detection>), VisionError> {
        let suppressor = self.clone();
        tokio::task::spawn_blocking(move || {
            let kept = suppressor.suppress(&raw);
            (raw, kept)
        })
        .await
        .map_err(|e| VisionError::Suppression(format!("Suppression task failed: {}", e)))
    }
}
