//! Drawing surfaces the overlay is rendered onto

use crate::error::VisionError;
use crate::processing::geometry::BoundingBox;
use ab_glyph::{FontArc, PxScale};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

/// Average glyph advance as a fraction of the font size, used without a font
const ESTIMATED_ADVANCE: f32 = 0.6;

/// A 2D drawing target of fixed pixel size
pub trait Surface: Send {
    fn dimensions(&self) -> (u32, u32);

    /// Reset every pixel to transparent
    fn clear(&mut self);

    /// Fill a rectangle, blending `color` over the existing pixels with `alpha`
    fn fill_rect(&mut self, rect: BoundingBox, color: Rgba<u8>, alpha: f32);

    /// Outline a rectangle with a line centred on its edges
    fn stroke_rect(&mut self, rect: BoundingBox, color: Rgba<u8>, line_width: f32);

    /// Draw text with its top-left corner at `(x, y)`
    fn draw_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: Rgba<u8>);

    /// Rendered width of `text` in pixels
    fn text_width(&self, text: &str, size: f32) -> f32;
}

/// In-memory RGBA surface
pub struct RgbaSurface {
    image: RgbaImage,
    font: Option<FontArc>,
}

impl RgbaSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            font: None,
        }
    }

    /// Use `font` for labels; without one, label text is measured but not drawn
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType/OpenType font from disk
    pub fn load_font(path: &Path) -> Result<FontArc, VisionError> {
        let bytes = std::fs::read(path)?;
        FontArc::try_from_vec(bytes)
            .map_err(|e| VisionError::Render(format!("Invalid font {:?}: {}", path, e)))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Write the surface as a PNG
    pub fn save(&self, path: &Path) -> Result<(), VisionError> {
        self.image.save(path)?;
        Ok(())
    }

    /// Integer pixel bounds of `rect` clipped to the image, `None` when empty
    fn clip(&self, rect: BoundingBox) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = self.image.dimensions();
        let x0 = rect.x1.max(0.0).round();
        let y0 = rect.y1.max(0.0).round();
        let x1 = rect.x2.min(w as f32).round();
        let y1 = rect.y2.min(h as f32).round();
        if !(x1 > x0 && y1 > y0) {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

impl Surface for RgbaSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn fill_rect(&mut self, rect: BoundingBox, color: Rgba<u8>, alpha: f32) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let mut src = color;
        src[3] = (color[3] as f32 * alpha.clamp(0.0, 1.0)).round() as u8;

        for y in y0..y1 {
            for x in x0..x1 {
                self.image.get_pixel_mut(x, y).blend(&src);
            }
        }
    }

    fn stroke_rect(&mut self, rect: BoundingBox, color: Rgba<u8>, line_width: f32) {
        let (w, h) = self.image.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let passes = line_width.round().clamp(1.0, w.max(h) as f32) as i64;
        let margin = passes as f32;

        // Edges far outside the image are pinned just past its border, where
        // no outline pass can reach back onto it
        let left = rect.x1.clamp(-margin, w as f32 + margin).round() as i64;
        let top = rect.y1.clamp(-margin, h as f32 + margin).round() as i64;
        let right = rect.x2.clamp(-margin, w as f32 + margin).round() as i64;
        let bottom = rect.y2.clamp(-margin, h as f32 + margin).round() as i64;

        // Concentric one-pixel outlines, outermost first
        for i in 0..passes {
            let inset = i - passes / 2;
            let width = (right - left).saturating_sub(2 * inset);
            let height = (bottom - top).saturating_sub(2 * inset);
            if width <= 0 || height <= 0 {
                continue;
            }
            let outline = Rect::at((left + inset) as i32, (top + inset) as i32)
                .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut self.image, outline, color);
        }
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: Rgba<u8>) {
        if let Some(font) = &self.font {
            let scale = PxScale::from(size);
            draw_text_mut(
                &mut self.image,
                color,
                x.round() as i32,
                y.round() as i32,
                scale,
                font,
                text,
            );
        }
    }

    fn text_width(&self, text: &str, size: f32) -> f32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(size), font, text).0 as f32,
            None => text.chars().count() as f32 * size * ESTIMATED_ADVANCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn test_clear_makes_transparent() {
        let mut s = RgbaSurface::new(4, 4);
        s.fill_rect(BoundingBox::new(0.0, 0.0, 4.0, 4.0), RED, 1.0);
        s.clear();
        assert!(s.image().pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_fill_rect_blends() {
        let mut s = RgbaSurface::new(4, 4);
        s.fill_rect(BoundingBox::new(0.0, 0.0, 2.0, 2.0), RED, 0.2);
        assert_eq!(*s.image().get_pixel(1, 1), Rgba([255, 0, 0, 51]));
        assert_eq!(*s.image().get_pixel(3, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_fill_rect_over_opaque_pixels() {
        let mut s = RgbaSurface::new(2, 2);
        s.fill_rect(BoundingBox::new(0.0, 0.0, 2.0, 2.0), Rgba([0, 0, 255, 255]), 1.0);
        s.fill_rect(BoundingBox::new(0.0, 0.0, 2.0, 2.0), RED, 0.2);
        let p = s.image().get_pixel(0, 0);
        assert_eq!(p[3], 255);
        assert!(p[0] >= 50 && p[0] <= 52);
        assert_eq!(p[1], 0);
        assert!(p[2] >= 203 && p[2] <= 205);
    }

    #[test]
    fn test_fill_rect_clips_out_of_bounds() {
        let mut s = RgbaSurface::new(4, 4);
        s.fill_rect(BoundingBox::new(-10.0, -10.0, 2.0, 100.0), RED, 1.0);
        assert_eq!(*s.image().get_pixel(0, 3), RED);
        s.fill_rect(BoundingBox::new(10.0, 10.0, 20.0, 20.0), RED, 1.0);
    }

    #[test]
    fn test_stroke_rect_outline_only() {
        let mut s = RgbaSurface::new(10, 10);
        s.stroke_rect(BoundingBox::new(2.0, 2.0, 8.0, 8.0), RED, 1.0);
        assert_eq!(*s.image().get_pixel(2, 2), RED);
        assert_eq!(*s.image().get_pixel(5, 5), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_stroke_rect_oversized_box() {
        let mut s = RgbaSurface::new(10, 10);
        s.stroke_rect(BoundingBox::new(0.0, 2.0, 3e9, 6.0), RED, 1.0);
        assert_eq!(*s.image().get_pixel(5, 2), RED);
        assert_eq!(*s.image().get_pixel(5, 4), Rgba([0, 0, 0, 0]));

        s.clear();
        s.stroke_rect(BoundingBox::new(-f32::MAX, -f32::MAX, f32::MAX, f32::MAX), RED, 2.0);
        assert!(s.image().pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_text_width_estimate_without_font() {
        let s = RgbaSurface::new(10, 10);
        assert!((s.text_width("abcd", 10.0) - 24.0).abs() < 1e-6);
    }
}
