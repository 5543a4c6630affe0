//! Tests for Suppressor

use proptest::prelude::*;
use quarry_eye::config::DetectionConfig;
use quarry_eye::processing::geometry::{BoundingBox, RawDetections};
use quarry_eye::processing::Suppressor;

fn config(max_detections: usize, iou: f32, score: f32) -> DetectionConfig {
    DetectionConfig {
        max_detections,
        iou_threshold: iou,
        score_threshold: score,
        ..DetectionConfig::default()
    }
}

fn candidate() -> impl Strategy<Value = (BoundingBox, f32, usize)> {
    (0.0f32..600.0, 0.0f32..600.0, 1.0f32..120.0, 1.0f32..120.0, 0.0f32..1.0, 0usize..80)
        .prop_map(|(x, y, w, h, score, class_id)| {
            (BoundingBox::new(x, y, x + w, y + h), score, class_id)
        })
}

fn to_raw(candidates: &[(BoundingBox, f32, usize)]) -> RawDetections {
    let mut raw = RawDetections::default();
    for &(bbox, score, class_id) in candidates {
        raw.push(bbox, score, class_id);
    }
    raw
}

proptest! {
    #[test]
    fn test_suppression_invariants(
        candidates in prop::collection::vec(candidate(), 0..60),
        max_detections in 1usize..20,
        iou in 0.1f32..0.9,
        score in 0.0f32..0.9,
    ) {
        let suppressor = Suppressor::new(&config(max_detections, iou, score));
        let kept = suppressor.suppress(&to_raw(&candidates));

        prop_assert!(kept.len() <= max_detections);
        for d in &kept {
            prop_assert!(d.score >= score);
        }
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                prop_assert!(a.bbox.iou(&b.bbox) <= iou);
            }
        }
        for pair in kept.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[test]
fn test_excluded_class_removed_even_when_top_scoring() {
    let mut cfg = config(10, 0.5, 0.3);
    cfg.excluded_classes.insert(0);
    let suppressor = Suppressor::new(&cfg);

    let raw = to_raw(&[
        (BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.99, 0),
        (BoundingBox::new(200.0, 200.0, 260.0, 260.0), 0.6, 15),
    ]);
    let kept = suppressor.suppress(&raw);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].class_id, 15);
}

#[test]
fn test_excluded_box_still_suppresses_overlaps() {
    let mut cfg = config(10, 0.5, 0.3);
    cfg.excluded_classes.insert(0);
    let suppressor = Suppressor::new(&cfg);

    // Exclusion runs after NMS: the excluded box wins its overlap first
    let raw = to_raw(&[
        (BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.99, 0),
        (BoundingBox::new(5.0, 5.0, 100.0, 100.0), 0.8, 15),
    ]);
    assert!(suppressor.suppress(&raw).is_empty());
}

#[test]
fn test_empty_input() {
    let suppressor = Suppressor::new(&DetectionConfig::default());
    assert!(suppressor.suppress(&RawDetections::default()).is_empty());
}

#[test]
fn test_suppress_into_reuses_buffer() {
    let suppressor = Suppressor::new(&config(10, 0.5, 0.5));
    let mut kept = Vec::with_capacity(8);
    let raw = to_raw(&[(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9, 3)]);

    suppressor.suppress_into(&raw, &mut kept);
    suppressor.suppress_into(&raw, &mut kept);
    assert_eq!(kept.len(), 1);
    assert!(kept.capacity() >= 8);
}

#[tokio::test]
async fn test_suppress_async_on_blocking_pool() {
    let suppressor = Suppressor::new(&config(1, 0.5, 0.5));
    let raw = to_raw(&[
        (BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.7, 1),
        (BoundingBox::new(50.0, 50.0, 60.0, 60.0), 0.9, 2),
    ]);

    let (returned, kept) = suppressor.suppress_async(raw).await.unwrap();
    assert_eq!(returned.len(), 2);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].class_id, 2);
}
