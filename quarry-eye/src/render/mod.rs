//! Overlay rendering

pub mod overlay;
pub mod surface;

pub use overlay::OverlayRenderer;
pub use surface::{RgbaSurface, Surface};
