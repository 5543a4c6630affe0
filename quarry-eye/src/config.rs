//! Configuration for quarry-eye

use crate::error::VisionError;
use crate::models::labels::COCO_CLASSES;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Pixel value range the model expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `v / 255`
    ZeroToOne,
    /// `v / 127.5 - 1`
    MinusOneToOne,
}

/// Memory layout of the model's input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the layout produced by the preprocessor
    Nhwc,
    /// `[1, 3, H, W]`, permuted by the backend before the forward pass
    Nchw,
}

/// How per-frame detections feed the class counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingPolicy {
    /// Only the frame's single best detection increments its counter
    BestOfFrame,
    /// Every surviving detection increments its own counter
    EveryDetection,
}

/// Optional frame adjustments applied before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub normalization: Normalization,
    /// Multiplier applied to raw pixel values
    pub brightness: Option<f32>,
    /// Contrast stretch around mid-grey (127.5)
    pub contrast: Option<f32>,
    /// Mirror the prepared input left-right
    pub flip_horizontal: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            normalization: Normalization::ZeroToOne,
            brightness: None,
            contrast: None,
            flip_horizontal: false,
        }
    }
}

/// Detection pipeline configuration.
///
/// Built once at startup and shared as `Arc<DetectionConfig>`; nothing in
/// the pipeline mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Model input width in pixels
    pub input_width: u32,
    /// Model input height in pixels
    pub input_height: u32,
    /// Maximum detections kept per frame
    pub max_detections: usize,
    /// Overlap above which a lower-scoring box is suppressed
    pub iou_threshold: f32,
    /// Minimum score for a candidate to be considered
    pub score_threshold: f32,
    /// Label table, index = model class id
    pub labels: Vec<String>,
    /// Class ids dropped after suppression
    pub excluded_classes: BTreeSet<usize>,
    /// Hit count a class must exceed before it settles
    pub settle_threshold: u32,
    /// Class names eligible for settling; `None` tracks every non-excluded label
    pub tracked_classes: Option<Vec<String>>,
    pub smoothing_policy: SmoothingPolicy,
    pub preprocess: PreprocessConfig,
    pub tensor_layout: TensorLayout,
    /// ONNX model file
    pub model_path: PathBuf,
    /// Target frame rate of the scheduling loop
    pub frame_rate: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let model_path = dirs::home_dir()
            .map(|mut p| {
                p.push(".quarry");
                p.push("models");
                p.push("detector.onnx");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models/detector.onnx"));

        Self {
            input_width: 640,
            input_height: 640,
            max_detections: 100,
            iou_threshold: 0.5,
            score_threshold: 0.5,
            labels: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
            excluded_classes: BTreeSet::new(),
            settle_threshold: 20,
            tracked_classes: None,
            smoothing_policy: SmoothingPolicy::BestOfFrame,
            preprocess: PreprocessConfig::default(),
            tensor_layout: TensorLayout::Nhwc,
            model_path,
            frame_rate: 30,
        }
    }
}

impl DetectionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err("Input dimensions must be non-zero".to_string());
        }

        if self.input_width > 4096 || self.input_height > 4096 {
            return Err("Input dimensions too large (max 4096)".to_string());
        }

        if self.max_detections == 0 {
            return Err("max_detections must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err("IoU threshold must be within [0, 1]".to_string());
        }

        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err("Score threshold must be within [0, 1]".to_string());
        }

        if self.labels.is_empty() {
            return Err("Label table must not be empty".to_string());
        }

        if let Some(&bad) = self.excluded_classes.iter().find(|&&id| id >= self.labels.len()) {
            return Err(format!(
                "Excluded class {} is outside the label table ({} labels)",
                bad,
                self.labels.len()
            ));
        }

        if self.settle_threshold == 0 {
            return Err("settle_threshold must be positive".to_string());
        }

        if let Some(tracked) = &self.tracked_classes {
            if tracked.is_empty() {
                return Err("tracked_classes must not be empty when set".to_string());
            }
            for name in tracked {
                if self.class_id(name).is_none() {
                    return Err(format!("Tracked class '{}' is not in the label table", name));
                }
            }
        }

        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err("Frame rate must be between 1 and 120".to_string());
        }

        for (name, value) in [
            ("brightness", self.preprocess.brightness),
            ("contrast", self.preprocess.contrast),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(format!("{} must be a positive finite number", name));
                }
            }
        }

        Ok(())
    }

    /// Number of classes in the label table
    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Label for a class id
    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    /// Class id for a label, compared case-insensitively
    pub fn class_id(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(name))
    }

    pub fn is_excluded(&self, class_id: usize) -> bool {
        self.excluded_classes.contains(&class_id)
    }

    /// Lower-cased names of the classes eligible for settling, in counter order
    pub fn tracked_class_names(&self) -> Vec<String> {
        match &self.tracked_classes {
            Some(names) => {
                let mut out: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    let lower = name.to_lowercase();
                    if !out.contains(&lower) {
                        out.push(lower);
                    }
                }
                out
            }
            None => {
                let mut out: Vec<String> = Vec::new();
                for (id, label) in self.labels.iter().enumerate() {
                    let lower = label.to_lowercase();
                    if !self.is_excluded(id) && !out.contains(&lower) {
                        out.push(lower);
                    }
                }
                out
            }
        }
    }

    /// Delay between scheduled ticks
    pub fn frame_interval(&self) -> Duration {
        let rate = self.frame_rate.max(1);
        Duration::from_secs_f64(1.0 / rate as f64)
    }

    /// Load configuration from a JSON or TOML file
    pub fn from_file(path: &Path) -> Result<Self, VisionError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_str(&content)?;
        info!("Loaded detection config from {:?}", path);
        Ok(config)
    }

    /// Parse configuration, trying JSON first and then TOML
    pub fn from_str(content: &str) -> Result<Self, VisionError> {
        let config = match serde_json::from_str::<DetectionConfig>(content) {
            Ok(config) => config,
            Err(json_err) => {
                debug!("Config is not JSON ({}), trying TOML", json_err);
                toml::from_str::<DetectionConfig>(content)?
            }
        };
        config.validate().map_err(VisionError::Config)?;
        Ok(config)
    }

    /// Apply `QUARRY_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("QUARRY_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("QUARRY_SETTLE_THRESHOLD") {
            if let Ok(threshold) = value.parse::<u32>() {
                self.settle_threshold = threshold;
            }
        }

        if let Ok(value) = std::env::var("QUARRY_SCORE_THRESHOLD") {
            if let Ok(threshold) = value.parse::<f32>() {
                self.score_threshold = threshold;
            }
        }
    }
}
