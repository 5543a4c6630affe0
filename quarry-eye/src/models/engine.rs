//! Inference engine: exclusive owner of the loaded model

use crate::config::DetectionConfig;
use crate::error::VisionError;
use crate::preprocess::PreparedInput;
use ndarray::{Array4, ArrayD, ArrayView4};
use std::time::Instant;
use tracing::{debug, info};

/// A loaded model capable of one forward pass at a time.
///
/// Implementations must not keep references to the input or output past
/// the call.
pub trait InferenceBackend: Send {
    /// Spatial input size `(width, height)` the model was exported with
    fn input_size(&self) -> (u32, u32);

    /// Run one forward pass on a `[1, H, W, 3]` tensor and return the first output
    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, VisionError>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, VisionError> {
        (**self).forward(input)
    }
}

/// Runs exactly one forward pass per frame on a warmed-up backend
pub struct InferenceEngine<B: InferenceBackend> {
    backend: B,
    input_width: u32,
    input_height: u32,
    passes: u64,
}

impl<B: InferenceBackend> InferenceEngine<B> {
    /// Wrap a loaded backend and run the warm-up pass.
    ///
    /// Fails if the backend's input size disagrees with the configuration or
    /// if the warm-up pass itself fails; either way the pipeline never starts.
    pub fn new(mut backend: B, config: &DetectionConfig) -> Result<Self, VisionError> {
        let (model_w, model_h) = backend.input_size();
        if (model_w, model_h) != (config.input_width, config.input_height) {
            return Err(VisionError::Model(format!(
                "Model expects {}x{} input but config specifies {}x{}",
                model_w, model_h, config.input_width, config.input_height
            )));
        }

        let started = Instant::now();
        let dummy = Array4::<f32>::zeros((1, model_h as usize, model_w as usize, 3));
        backend
            .forward(dummy.view())
            .map_err(|e| VisionError::Model(format!("Warm-up pass failed: {}", e)))?;
        info!("Model warmed up in {:?}", started.elapsed());

        Ok(Self {
            backend,
            input_width: model_w,
            input_height: model_h,
            passes: 0,
        })
    }

    /// Run one forward pass.
    ///
    /// Any backend failure here only concerns this frame and comes back
    /// recoverable, whatever variant the backend reported.
    pub fn run(&mut self, input: &PreparedInput) -> Result<ArrayD<f32>, VisionError> {
        let expected = [1, self.input_height as usize, self.input_width as usize, 3];
        if input.shape() != expected {
            return Err(VisionError::shape(format!("{:?}", expected), input.shape()));
        }

        let output = self.backend.forward(input.tensor()).map_err(|e| {
            if e.is_recoverable() {
                e
            } else {
                VisionError::Inference(e.to_string())
            }
        })?;
        self.passes += 1;
        debug!("Forward pass {} produced {:?}", self.passes, output.shape());
        Ok(output)
    }

    /// Forward passes run since construction, warm-up excluded
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }
}
