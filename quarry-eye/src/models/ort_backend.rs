//! ONNX Runtime backend

use crate::config::{DetectionConfig, TensorLayout};
use crate::error::VisionError;
use crate::models::engine::InferenceBackend;
use ndarray::{ArrayD, ArrayView4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

/// Detector model loaded into an ONNX Runtime session
pub struct OrtBackend {
    session: Session,
    input_size: (u32, u32),
    layout: TensorLayout,
}

impl OrtBackend {
    /// Load the model named by `config.model_path`
    pub fn load(config: &DetectionConfig) -> Result<Self, VisionError> {
        Self::from_file(
            &config.model_path,
            (config.input_width, config.input_height),
            config.tensor_layout,
        )
    }

    /// Load a model file.
    ///
    /// The input size is read from the model's first input; `input_size`
    /// only fills in axes the model leaves dynamic.
    pub fn from_file(
        model_path: &Path,
        input_size: (u32, u32),
        layout: TensorLayout,
    ) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::Model(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Model(format!("Failed to load model: {}", e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| VisionError::Model("Model has no inputs".to_string()))?;
        let dims: Vec<i64> = input
            .input_type
            .tensor_shape()
            .ok_or_else(|| VisionError::Model("Model input is not a tensor".to_string()))?
            .iter()
            .copied()
            .collect();
        let input_size = model_input_size(&dims, layout, input_size)?;

        info!(
            "Detector model loaded from {:?} ({}x{}, {:?})",
            model_path, input_size.0, input_size.1, layout
        );

        Ok(Self {
            session,
            input_size,
            layout,
        })
    }
}

/// `(width, height)` from a model input shape; dynamic axes take `fallback`
fn model_input_size(
    dims: &[i64],
    layout: TensorLayout,
    fallback: (u32, u32),
) -> Result<(u32, u32), VisionError> {
    let (h_axis, w_axis, c_axis) = match layout {
        TensorLayout::Nhwc => (1, 2, 3),
        TensorLayout::Nchw => (2, 3, 1),
    };
    if dims.len() != 4 {
        return Err(VisionError::Model(format!(
            "Expected a 4D model input, got {:?}",
            dims
        )));
    }
    if dims[c_axis] > 0 && dims[c_axis] != 3 {
        return Err(VisionError::Model(format!(
            "Model input {:?} has no 3-channel axis for the {:?} layout",
            dims, layout
        )));
    }

    let axis = |value: i64, fallback: u32| -> Result<u32, VisionError> {
        if value <= 0 {
            return Ok(fallback);
        }
        u32::try_from(value)
            .map_err(|_| VisionError::Model(format!("Model input axis {} out of range", value)))
    };
    Ok((axis(dims[w_axis], fallback.0)?, axis(dims[h_axis], fallback.1)?))
}

impl InferenceBackend for OrtBackend {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn forward(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, VisionError> {
        let array = match self.layout {
            TensorLayout::Nhwc => input.to_owned(),
            TensorLayout::Nchw => input
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        };

        let tensor = Tensor::from_array(array)?;
        let outputs = self.session.run(ort::inputs![tensor])?;
        if outputs.len() == 0 {
            return Err(VisionError::Ort("Model produced no outputs".to_string()));
        }

        let output = outputs[0].try_extract_array::<f32>()?;
        debug!("Model output shape: {:?}", output.shape());
        Ok(output.to_owned())
    }
}
