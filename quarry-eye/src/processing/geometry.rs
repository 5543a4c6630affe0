//! Decoding raw model output into boxes, and mapping boxes to display space

use crate::error::VisionError;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in corner form
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a box from its center and size
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let x1 = cx - w / 2.0;
        let y1 = cy - h / 2.0;
        Self {
            x1,
            y1,
            x2: x1 + w,
            y2: y1 + h,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area, zero for degenerate boxes
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union, zero when the boxes do not overlap
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let intersection = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        intersection / union
    }

    /// Map a box from model-input space onto a surface.
    ///
    /// x is scaled by `ratio_x * surface_w / input_w` and y by
    /// `ratio_y * surface_h / input_h`, which undoes the square padding and
    /// stretches the result onto the surface.
    pub fn to_display(
        &self,
        ratio_x: f32,
        ratio_y: f32,
        input: (u32, u32),
        surface: (u32, u32),
    ) -> BoundingBox {
        let sx = ratio_x * surface.0 as f32 / input.0 as f32;
        let sy = ratio_y * surface.1 as f32 / input.1 as f32;
        BoundingBox {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

/// Decoded candidates as parallel vectors, one entry per model anchor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    pub boxes: Vec<BoundingBox>,
    pub scores: Vec<f32>,
    pub class_ids: Vec<usize>,
}

impl RawDetections {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Drop every candidate but keep the allocations
    pub fn clear(&mut self) {
        self.boxes.clear();
        self.scores.clear();
        self.class_ids.clear();
    }

    pub fn push(&mut self, bbox: BoundingBox, score: f32, class_id: usize) {
        self.boxes.push(bbox);
        self.scores.push(score);
        self.class_ids.push(class_id);
    }
}

/// Decode a raw output tensor into a fresh [`RawDetections`]
pub fn decode(output: ArrayViewD<'_, f32>, num_classes: usize) -> Result<RawDetections, VisionError> {
    let mut raw = RawDetections::default();
    decode_into(output, num_classes, &mut raw)?;
    Ok(raw)
}

/// Decode a raw output tensor into `out`, replacing its contents.
///
/// Accepts `[1, 4+C, N]`, `[1, N, 4+C]`, `[4+C, N]` and `[N, 4+C]`. When both
/// axes equal `4+C` the channel-first reading wins.
pub fn decode_into(
    output: ArrayViewD<'_, f32>,
    num_classes: usize,
    out: &mut RawDetections,
) -> Result<(), VisionError> {
    out.clear();
    let attributes = 4 + num_classes;
    let expected = || format!("[1, {0}, N] or [1, N, {0}]", attributes);
    if num_classes == 0 {
        return Err(VisionError::shape("at least one class score", output.shape()));
    }

    let matrix: ArrayView2<'_, f32> = match output.ndim() {
        3 if output.shape()[0] == 1 => output
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()?,
        2 => output.into_dimensionality::<Ix2>()?,
        _ => return Err(VisionError::shape(expected(), output.shape())),
    };

    // Normalise to [attributes, candidates]
    let matrix = if matrix.nrows() == attributes {
        matrix
    } else if matrix.ncols() == attributes {
        matrix.reversed_axes()
    } else {
        return Err(VisionError::shape(expected(), matrix.shape()));
    };

    let candidates = matrix.ncols();
    out.boxes.reserve(candidates);
    out.scores.reserve(candidates);
    out.class_ids.reserve(candidates);

    for column in matrix.axis_iter(Axis(1)) {
        let bbox = BoundingBox::from_center(column[0], column[1], column[2], column[3]);

        let mut best_class = 0;
        let mut best_score = column[4];
        for class_id in 1..num_classes {
            let score = column[4 + class_id];
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }

        out.push(bbox, best_score, best_class);
    }

    Ok(())
}
