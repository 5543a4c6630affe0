//! Frame preprocessing: pad, resize and normalize a raw frame into model input

use crate::config::{DetectionConfig, Normalization, PreprocessConfig};
use crate::error::VisionError;
use crate::frame::RawFrame;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array4, ArrayView4};
use std::borrow::Cow;
use tracing::trace;

/// Model-ready input tensor plus the ratios needed to map boxes back to the frame
#[derive(Debug, Clone)]
pub struct PreparedInput {
    tensor: Array4<f32>,
    ratio_x: f32,
    ratio_y: f32,
}

impl PreparedInput {
    /// `[1, H, W, 3]` tensor
    pub fn tensor(&self) -> ArrayView4<'_, f32> {
        self.tensor.view()
    }

    /// Padded size divided by the native frame width
    pub fn ratio_x(&self) -> f32 {
        self.ratio_x
    }

    /// Padded size divided by the native frame height
    pub fn ratio_y(&self) -> f32 {
        self.ratio_y
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }
}

/// Converts raw frames into the fixed-size input the model expects
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    input_width: u32,
    input_height: u32,
    options: PreprocessConfig,
}

impl FramePreprocessor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            input_width: config.input_width,
            input_height: config.input_height,
            options: config.preprocess.clone(),
        }
    }

    /// Prepare one frame.
    ///
    /// Returns [`VisionError::NotReady`] for frames without pixels.
    pub fn prepare(&self, frame: RawFrame<'_>) -> Result<PreparedInput, VisionError> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(VisionError::NotReady);
        }

        let side = width.max(height);
        let ratio_x = side as f32 / width as f32;
        let ratio_y = side as f32 / height as f32;

        let padded = pad_to_square(frame.image());
        let resized = imageops::resize(
            &*padded,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let (w, h) = (self.input_width as usize, self.input_height as usize);
        let mut tensor = Array4::<f32>::zeros((1, h, w, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let dst_x = if self.options.flip_horizontal {
                w - 1 - x as usize
            } else {
                x as usize
            };
            for c in 0..3 {
                let value = self.adjust(pixel[c] as f32);
                tensor[[0, y as usize, dst_x, c]] = self.normalize(value);
            }
        }

        trace!(
            "Prepared {}x{} frame as {:?} (ratios {:.3}, {:.3})",
            width,
            height,
            tensor.shape(),
            ratio_x,
            ratio_y
        );

        Ok(PreparedInput {
            tensor,
            ratio_x,
            ratio_y,
        })
    }

    /// Brightness then contrast, clipped to the 8-bit range
    fn adjust(&self, value: f32) -> f32 {
        let PreprocessConfig {
            brightness,
            contrast,
            ..
        } = self.options;
        if brightness.is_none() && contrast.is_none() {
            return value;
        }

        let mut v = value * brightness.unwrap_or(1.0);
        if let Some(c) = contrast {
            v = (v - 127.5) * c + 127.5;
        }
        v.clamp(0.0, 255.0)
    }

    fn normalize(&self, value: f32) -> f32 {
        match self.options.normalization {
            Normalization::ZeroToOne => value / 255.0,
            Normalization::MinusOneToOne => value / 127.5 - 1.0,
        }
    }
}

/// Zero-pad the bottom/right edge so the image becomes square
pub fn pad_to_square(image: &RgbImage) -> Cow<'_, RgbImage> {
    let (width, height) = image.dimensions();
    if width == height {
        return Cow::Borrowed(image);
    }

    let side = width.max(height);
    let mut canvas = RgbImage::new(side, side);
    imageops::replace(&mut canvas, image, 0, 0);
    Cow::Owned(canvas)
}
