//! Error types for quarry-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    /// A forward pass failed on a frame; the model itself stays loaded
    #[error("Inference error: {0}")]
    Inference(String),

    /// The frame source has no pixels yet (zero dimensions or stream not live)
    #[error("Frame source not ready")]
    NotReady,

    #[error("Unexpected tensor shape: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Suppression error: {0}")]
    Suppression(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl VisionError {
    /// Whether the error only affects the current frame.
    ///
    /// Recoverable errors abort a single tick; the frame loop keeps running.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VisionError::NotReady
                | VisionError::ShapeMismatch { .. }
                | VisionError::Suppression(_)
                | VisionError::Ort(_)
                | VisionError::Inference(_)
                | VisionError::Render(_)
        )
    }

    pub(crate) fn shape(expected: impl Into<String>, got: &[usize]) -> Self {
        VisionError::ShapeMismatch {
            expected: expected.into(),
            got: format!("{:?}", got),
        }
    }
}

impl From<ort::Error> for VisionError {
    fn from(err: ort::Error) -> Self {
        VisionError::Ort(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VisionError {
    fn from(err: ndarray::ShapeError) -> Self {
        VisionError::ShapeMismatch {
            expected: "compatible array layout".to_string(),
            got: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for VisionError {
    fn from(err: serde_json::Error) -> Self {
        VisionError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for VisionError {
    fn from(err: toml::de::Error) -> Self {
        VisionError::Serialization(err.to_string())
    }
}
