//! Frame sources feeding the detection loop

use crate::error::VisionError;
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Borrowed view of the frame currently held by a source
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    image: &'a RgbImage,
}

impl<'a> RawFrame<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &'a RgbImage {
        self.image
    }
}

/// A live video source.
///
/// The loop reads at most one frame per tick and never keeps it past the tick.
pub trait FrameSource: Send {
    /// Native pixel size of the current frame, `(0, 0)` before the stream starts
    fn dimensions(&self) -> (u32, u32);

    /// Whether the stream is currently active
    fn is_live(&self) -> bool;

    /// Whether the stream has ended for good; the run loop exits when it has
    fn is_closed(&self) -> bool {
        false
    }

    /// Current frame, if one is available
    fn grab(&mut self) -> Option<RawFrame<'_>>;
}

/// Frame source replaying a directory of still images in file-name order
pub struct ImageSequenceSource {
    pending: VecDeque<PathBuf>,
    current: Option<RgbImage>,
    served: bool,
    total: usize,
}

impl ImageSequenceSource {
    /// Open a directory of frames
    pub fn open(dir: &Path) -> Result<Self, VisionError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(VisionError::Config(format!("No image frames found in {:?}", dir)));
        }

        let total = paths.len();
        let mut source = Self {
            pending: paths.into(),
            current: None,
            served: false,
            total,
        };
        source.advance();
        info!("Opened frame sequence {:?} ({} frames)", dir, total);
        Ok(source)
    }

    /// Total number of frames found when the source was opened
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Load the next decodable frame, skipping unreadable files
    fn advance(&mut self) {
        self.current = None;
        while let Some(path) = self.pending.pop_front() {
            match image::open(&path) {
                Ok(img) => {
                    debug!("Loaded frame {:?}", path);
                    self.current = Some(img.to_rgb8());
                    return;
                }
                Err(e) => warn!("Skipping unreadable frame {:?}: {}", path, e),
            }
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn dimensions(&self) -> (u32, u32) {
        self.current
            .as_ref()
            .map(|img| img.dimensions())
            .unwrap_or((0, 0))
    }

    fn is_live(&self) -> bool {
        self.current.is_some()
    }

    fn is_closed(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    fn grab(&mut self) -> Option<RawFrame<'_>> {
        if self.served {
            self.advance();
        }
        self.served = true;
        self.current.as_ref().map(RawFrame::new)
    }
}
