//! Temporal smoothing of per-frame detections into settle events

use crate::config::{DetectionConfig, SmoothingPolicy};
use crate::processing::Detection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Index of a counter slot; only tracked classes have one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackedClassId(usize);

impl TrackedClassId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A class that was seen often enough to count as present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleEvent {
    /// Lower-cased label
    pub class_name: String,
    pub class_id: usize,
    /// Counter value that crossed the threshold
    pub count: u32,
    pub at: DateTime<Utc>,
}

/// Per-class hit counters with a settle threshold.
///
/// Counters live in a fixed slice indexed by [`TrackedClassId`]; the model
/// class id is mapped to a slot through a lookup table built once.
#[derive(Debug, Clone)]
pub struct DetectionSmoother {
    counts: Box<[u32]>,
    names: Box<[String]>,
    slot_class: Box<[usize]>,
    slot_of: Box<[Option<TrackedClassId>]>,
    threshold: u32,
    policy: SmoothingPolicy,
}

impl DetectionSmoother {
    pub fn new(config: &DetectionConfig) -> Self {
        let mut names = Vec::new();
        let mut slot_class = Vec::new();
        let mut slot_of = vec![None; config.num_classes()];

        // Counters are keyed by lower-cased label, so every class id sharing
        // a tracked label feeds the same slot
        for name in config.tracked_class_names() {
            let slot = TrackedClassId(names.len());
            let mut first = None;
            for (class_id, label) in config.labels.iter().enumerate() {
                if label.to_lowercase() == name {
                    slot_of[class_id] = Some(slot);
                    first.get_or_insert(class_id);
                }
            }
            match first {
                Some(class_id) => {
                    slot_class.push(class_id);
                    names.push(name);
                }
                None => warn!("Tracked class '{}' has no label, ignoring", name),
            }
        }

        debug!(
            "Smoother tracking {} classes, threshold {}, {:?}",
            names.len(),
            config.settle_threshold,
            config.smoothing_policy
        );

        Self {
            counts: vec![0; names.len()].into_boxed_slice(),
            names: names.into_boxed_slice(),
            slot_class: slot_class.into_boxed_slice(),
            slot_of: slot_of.into_boxed_slice(),
            threshold: config.settle_threshold,
            policy: config.smoothing_policy,
        }
    }

    /// Feed one frame's kept detections.
    ///
    /// Returns a settle event when a counter passes the threshold; every
    /// counter is zeroed when that happens.
    pub fn observe(&mut self, detections: &[Detection]) -> Option<SettleEvent> {
        if detections.is_empty() {
            return None;
        }

        match self.policy {
            SmoothingPolicy::BestOfFrame => {
                if let Some(best) = best_of_frame(detections) {
                    self.increment(best.class_id);
                }
            }
            SmoothingPolicy::EveryDetection => {
                for detection in detections {
                    self.increment(detection.class_id);
                }
            }
        }

        self.settle()
    }

    fn increment(&mut self, class_id: usize) {
        if let Some(Some(slot)) = self.slot_of.get(class_id) {
            let count = &mut self.counts[slot.0];
            *count = count.saturating_add(1);
        }
    }

    fn settle(&mut self) -> Option<SettleEvent> {
        let mut winner: Option<(usize, u32)> = None;
        for (slot, &count) in self.counts.iter().enumerate() {
            if count > self.threshold && winner.map_or(true, |(_, best)| count > best) {
                winner = Some((slot, count));
            }
        }

        let (slot, count) = winner?;
        let event = SettleEvent {
            class_name: self.names[slot].clone(),
            class_id: self.slot_class[slot],
            count,
            at: Utc::now(),
        };
        self.reset();
        info!("Class '{}' settled after {} hits", event.class_name, count);
        Some(event)
    }

    /// Zero every counter
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Current count for a tracked class name (case-insensitive)
    pub fn count(&self, class_name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(class_name))
            .map(|slot| self.counts[slot])
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Slot for a model class id, if the class is tracked
    pub fn tracked_slot(&self, class_id: usize) -> Option<TrackedClassId> {
        self.slot_of.get(class_id).copied().flatten()
    }

    pub fn tracked_names(&self) -> &[String] {
        &self.names
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Highest score wins; equal scores go to the lowest class id
fn best_of_frame(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best: Option<&Detection>, d| match best {
        Some(b) if d.score > b.score || (d.score == b.score && d.class_id < b.class_id) => Some(d),
        Some(b) => Some(b),
        None => Some(d),
    })
}
