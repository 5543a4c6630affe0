//! quarry-eye: live object-presence detection
//!
//! Turns a stream of video frames into stable "this object is present"
//! events. Each frame is padded and resized into model input, run through a
//! single-output detector, decoded into boxes, de-duplicated with
//! non-maximum suppression and filtered by class. Per-class hit counters
//! smooth out stray misclassifications: only a class seen often enough
//! settles, and settling resets every counter.
//!
//! [`FrameLoop`] drives the whole pipeline once per tick and draws the kept
//! detections onto a [`Surface`](render::Surface).

pub mod config;
pub mod error;
pub mod frame;
pub mod models;
pub mod preprocess;
pub mod processing;
pub mod render;
pub mod scheduler;
pub mod scope;

pub use config::{DetectionConfig, Normalization, SmoothingPolicy, TensorLayout};
pub use error::VisionError;
pub use frame::{FrameSource, ImageSequenceSource, RawFrame};
pub use models::{InferenceBackend, InferenceEngine, OrtBackend};
pub use processing::{Detection, SettleEvent};
pub use scheduler::{FrameListener, FrameLoop, LoopHandle, LoopState, RunSummary, TickOutcome};
