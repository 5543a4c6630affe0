//! Box, label and confidence overlay

use crate::config::DetectionConfig;
use crate::error::VisionError;
use crate::preprocess::PreparedInput;
use crate::processing::geometry::BoundingBox;
use crate::processing::Detection;
use crate::render::surface::Surface;
use image::Rgba;

/// Class colours, indexed by `class_id % 20`
pub const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const FILL_ALPHA: f32 = 0.2;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

pub fn class_color(class_id: usize) -> Rgba<u8> {
    let [r, g, b] = PALETTE[class_id % PALETTE.len()];
    Rgba([r, g, b, 255])
}

/// Label font size for a surface: `max(round(max(w, h) / 40), 14)`
pub fn font_size(width: u32, height: u32) -> f32 {
    (width.max(height) as f32 / 40.0).round().max(14.0)
}

/// Outline width for a surface: `max(min(w, h) / 200, 2.5)`
pub fn line_width(width: u32, height: u32) -> f32 {
    (width.min(height) as f32 / 200.0).max(2.5)
}

/// `"<label> - <score>%"` with the score as a percentage to one decimal
pub fn label_text(label: &str, score: f32) -> String {
    format!("{} - {:.1}%", label, score * 100.0)
}

/// Draws the kept detections of one frame
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    labels: Vec<String>,
    input_size: (u32, u32),
}

impl OverlayRenderer {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            labels: config.labels.clone(),
            input_size: (config.input_width, config.input_height),
        }
    }

    /// Clear `surface` and draw `detections` in order
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        detections: &[Detection],
        input: &PreparedInput,
    ) -> Result<(), VisionError> {
        self.render_with_ratios(surface, detections, input.ratio_x(), input.ratio_y())
    }

    pub fn render_with_ratios<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        detections: &[Detection],
        ratio_x: f32,
        ratio_y: f32,
    ) -> Result<(), VisionError> {
        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::Render("Surface has no pixels".to_string()));
        }

        surface.clear();

        let size = font_size(width, height);
        let lw = line_width(width, height);

        for detection in detections {
            let bbox = detection
                .bbox
                .to_display(ratio_x, ratio_y, self.input_size, (width, height));
            let color = class_color(detection.class_id);

            surface.fill_rect(bbox, color, FILL_ALPHA);
            surface.stroke_rect(bbox, color, lw);

            let text = label_text(&self.label(detection.class_id), detection.score);
            let text_w = surface.text_width(&text, size);
            let y_text = (bbox.y1 - (size + lw)).max(0.0);
            let x_text = bbox.x1 - 1.0;

            surface.fill_rect(
                BoundingBox::new(x_text, y_text, x_text + text_w + lw, y_text + size + lw),
                color,
                1.0,
            );
            surface.draw_text(&text, x_text, y_text, size, TEXT_COLOR);
        }

        Ok(())
    }

    fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::surface::RgbaSurface;

    #[test]
    fn test_typography() {
        assert_eq!(font_size(640, 480), 16.0);
        assert_eq!(font_size(320, 240), 14.0);
        assert_eq!(line_width(640, 480), 2.5);
        assert_eq!(line_width(1920, 1080), 5.4);
    }

    #[test]
    fn test_label_text_format() {
        assert_eq!(label_text("cat", 0.876), "cat - 87.6%");
        assert_eq!(label_text("dog", 1.0), "dog - 100.0%");
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(class_color(0), class_color(20));
        assert_eq!(class_color(5), Rgba([0x48, 0xF9, 0x0A, 255]));
    }

    #[test]
    fn test_render_draws_fill_and_label() {
        let config = DetectionConfig {
            input_width: 100,
            input_height: 100,
            labels: vec!["cat".to_string()],
            ..DetectionConfig::default()
        };
        let renderer = OverlayRenderer::new(&config);
        let mut surface = RgbaSurface::new(100, 100);
        let det = Detection::new(BoundingBox::new(20.0, 40.0, 80.0, 90.0), 0, 0.9);

        renderer
            .render_with_ratios(&mut surface, &[det], 1.0, 1.0)
            .unwrap();

        // Box interior carries the translucent fill
        let inside = surface.image().get_pixel(50, 70);
        assert_eq!(inside[3], 51);
        // Label background sits above the box, opaque
        let label = surface.image().get_pixel(25, 25);
        assert_eq!(*label, class_color(0));
        // Far corner untouched
        assert_eq!(*surface.image().get_pixel(99, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_label_clamped_to_top_edge() {
        let config = DetectionConfig {
            input_width: 100,
            input_height: 100,
            labels: vec!["cat".to_string()],
            ..DetectionConfig::default()
        };
        let renderer = OverlayRenderer::new(&config);
        let mut surface = RgbaSurface::new(100, 100);
        let det = Detection::new(BoundingBox::new(20.0, 2.0, 80.0, 90.0), 0, 0.9);
        renderer
            .render_with_ratios(&mut surface, &[det], 1.0, 1.0)
            .unwrap();
        assert_eq!(*surface.image().get_pixel(25, 0), class_color(0));
    }

    #[test]
    fn test_render_rejects_empty_surface() {
        let renderer = OverlayRenderer::new(&DetectionConfig::default());
        let mut surface = RgbaSurface::new(0, 0);
        assert!(matches!(
            renderer.render_with_ratios(&mut surface, &[], 1.0, 1.0),
            Err(VisionError::Render(_))
        ));
    }
}
