//! Tests for the overlay renderer

use image::Rgba;
use quarry_eye::config::DetectionConfig;
use quarry_eye::processing::geometry::BoundingBox;
use quarry_eye::processing::Detection;
use quarry_eye::render::overlay::{class_color, OverlayRenderer};
use quarry_eye::render::{RgbaSurface, Surface};

fn detections() -> Vec<Detection> {
    vec![
        Detection::new(BoundingBox::new(100.0, 120.0, 300.0, 400.0), 15, 0.91),
        Detection::new(BoundingBox::new(350.0, 50.0, 600.0, 250.0), 16, 0.64),
    ]
}

#[test]
fn test_render_is_idempotent() {
    let config = DetectionConfig::default();
    let renderer = OverlayRenderer::new(&config);
    let mut surface = RgbaSurface::new(640, 480);

    renderer
        .render_with_ratios(&mut surface, &detections(), 1.0, 1.333)
        .unwrap();
    let first = surface.image().clone();

    renderer
        .render_with_ratios(&mut surface, &detections(), 1.0, 1.333)
        .unwrap();
    assert_eq!(surface.image(), &first);
}

#[test]
fn test_render_clears_previous_frame() {
    let renderer = OverlayRenderer::new(&DetectionConfig::default());
    let mut surface = RgbaSurface::new(64, 64);
    surface.fill_rect(BoundingBox::new(0.0, 0.0, 64.0, 64.0), Rgba([9, 9, 9, 255]), 1.0);

    renderer.render_with_ratios(&mut surface, &[], 1.0, 1.0).unwrap();
    assert!(surface.image().pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
}

#[test]
fn test_boxes_scaled_to_surface() {
    let config = DetectionConfig::default();
    let renderer = OverlayRenderer::new(&config);
    // Surface twice the model input: box interior moves accordingly
    let mut surface = RgbaSurface::new(1280, 1280);
    let det = Detection::new(BoundingBox::new(100.0, 200.0, 200.0, 300.0), 15, 0.9);

    renderer.render_with_ratios(&mut surface, &[det], 1.0, 1.0).unwrap();

    let color = class_color(15);
    let inside = surface.image().get_pixel(300, 500);
    assert_eq!(inside[3], 51);
    assert_eq!(&inside.0[..3], &color.0[..3]);
    assert_eq!(*surface.image().get_pixel(150, 250), Rgba([0, 0, 0, 0]));
}

#[test]
fn test_oversized_box_renders_clipped() {
    let renderer = OverlayRenderer::new(&DetectionConfig::default());
    let mut surface = RgbaSurface::new(640, 480);
    let det = Detection::new(BoundingBox::new(0.0, 10.0, 3e9, 20.0), 15, 0.9);

    renderer.render_with_ratios(&mut surface, &[det], 1.0, 1.0).unwrap();

    let color = class_color(15);
    assert_eq!(&surface.image().get_pixel(320, 10).0[..3], &color.0[..3]);
    assert_eq!(*surface.image().get_pixel(320, 200), Rgba([0, 0, 0, 0]));
}

#[test]
fn test_every_class_gets_palette_colour() {
    for class_id in 0..80 {
        assert_eq!(class_color(class_id), class_color(class_id + 20));
    }
}
