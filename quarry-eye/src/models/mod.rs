//! Detector model ownership and inference

pub mod engine;
pub mod labels;
pub mod ort_backend;

pub use engine::{InferenceBackend, InferenceEngine};
pub use labels::COCO_CLASSES;
pub use ort_backend::OrtBackend;
