//! Edge case tests across the pipeline

use image::{Rgb, RgbImage};
use ndarray::{ArrayD, ArrayView4, IxDyn};
use quarry_eye::config::DetectionConfig;
use quarry_eye::error::VisionError;
use quarry_eye::frame::{FrameSource, ImageSequenceSource, RawFrame};
use quarry_eye::models::{InferenceBackend, InferenceEngine};
use quarry_eye::preprocess::FramePreprocessor;
use quarry_eye::processing::geometry::{decode, BoundingBox};
use quarry_eye::processing::Suppressor;

struct EchoBackend;

impl InferenceBackend for EchoBackend {
    fn input_size(&self) -> (u32, u32) {
        (640, 640)
    }

    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, VisionError> {
        assert_eq!(input.shape(), &[1, 640, 640, 3]);
        Ok(ArrayD::zeros(IxDyn(&[1, 84, 10])))
    }
}

#[test]
fn test_hd_frame_preprocessing() {
    let img = RgbImage::from_pixel(1280, 720, Rgb([200, 100, 50]));
    let prepared = FramePreprocessor::new(&DetectionConfig::default())
        .prepare(RawFrame::new(&img))
        .unwrap();

    assert_eq!(prepared.shape(), &[1, 640, 640, 3]);
    assert_eq!(prepared.ratio_x(), 1.0);
    assert!((prepared.ratio_y() - 1.778).abs() < 1e-3);

    // Bottom rows come from the zero padding
    let t = prepared.tensor();
    assert_eq!(t[[0, 639, 320, 0]], 0.0);
    assert!(t[[0, 10, 320, 0]] > 0.7);
}

#[test]
fn test_full_pass_with_empty_output() {
    let config = DetectionConfig::default();
    let mut engine = InferenceEngine::new(EchoBackend, &config).unwrap();
    let img = RgbImage::new(320, 240);
    let prepared = FramePreprocessor::new(&config)
        .prepare(RawFrame::new(&img))
        .unwrap();

    let output = engine.run(&prepared).unwrap();
    let raw = decode(output.view(), config.num_classes()).unwrap();
    assert_eq!(raw.len(), 10);

    let kept = Suppressor::new(&config).suppress(&raw);
    assert!(kept.is_empty());
}

#[test]
fn test_display_mapping_with_input_sized_surface() {
    let img = RgbImage::new(1280, 720);
    let prepared = FramePreprocessor::new(&DetectionConfig::default())
        .prepare(RawFrame::new(&img))
        .unwrap();

    let b = BoundingBox::new(64.0, 36.0, 128.0, 72.0);
    let d = b.to_display(prepared.ratio_x(), prepared.ratio_y(), (640, 640), (640, 640));
    assert_eq!(d.x1, 64.0);
    assert!((d.y1 - 64.0).abs() < 1e-3);
    assert!((d.y2 - 128.0).abs() < 1e-3);
}

#[test]
fn test_engine_size_mismatch_is_fatal() {
    let config = DetectionConfig {
        input_width: 320,
        input_height: 320,
        ..DetectionConfig::default()
    };
    let result = InferenceEngine::new(EchoBackend, &config);
    match result {
        Err(e) => assert!(!e.is_recoverable()),
        Ok(_) => panic!("engine accepted mismatched input size"),
    }
}

#[test]
fn test_sequence_source_ignores_non_images() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "frames").unwrap();
    RgbImage::new(8, 8).save(dir.path().join("0001.png")).unwrap();
    RgbImage::new(8, 8).save(dir.path().join("0002.bmp")).unwrap();

    let mut source = ImageSequenceSource::open(dir.path()).unwrap();
    assert_eq!(source.len(), 2);
    let mut frames = 0;
    while source.grab().is_some() {
        frames += 1;
    }
    assert_eq!(frames, 2);
    assert!(source.is_closed());
}

#[test]
fn test_sequence_source_missing_dir() {
    let result = ImageSequenceSource::open(std::path::Path::new("/nonexistent/frames"));
    assert!(matches!(result, Err(VisionError::Io(_))));
}
