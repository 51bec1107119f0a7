//! Geometry and visibility sampling.
//!
//! Every tick the canvas reports the shapes it renders together with their
//! screen-space size and the fraction of each shape that lies inside the viewport.
//! [`measure`] turns those reports into [`VisibleShape`]s: shapes whose visible
//! pixel estimate (`width * height * overlap`) reaches the configured floor.
//! Slivers below the floor are treated as invisible so that a shape peeking a few
//! pixels into the viewport never gets a browser instance spun up for it.
//!
//! Canvases that only know page-space bounds can go through [`sample_bounds`]
//! first.

use crate::ids::ShapeId;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Finite origin and a strictly positive, finite size.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Overlapping part of both rectangles, `None` when they are disjoint or only touch.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }
}

/// Fraction of `shape` that lies inside `viewport`, in `0.0..=1.0`.
///
/// Invalid shapes and disjoint rectangles yield `0.0`.
pub fn overlap_fraction(shape: &Rect, viewport: &Rect) -> f64 {
    if !shape.is_valid() || !viewport.is_valid() {
        return 0.0;
    }
    match shape.intersection(viewport) {
        Some(hit) => (hit.area() / shape.area()).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// A shape as reported by the canvas: screen-space size plus viewport overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSample {
    pub id: ShapeId,
    pub width: f64,
    pub height: f64,
    pub overlap: f64,
}

impl ShapeSample {
    pub fn new(id: impl Into<ShapeId>, width: f64, height: f64, overlap: f64) -> Self {
        Self { id: id.into(), width, height, overlap }
    }
}

/// Page-space bounds of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeBounds {
    pub id: ShapeId,
    pub bounds: Rect,
}

/// Convert page-space bounds into samples. Screen size is the page size scaled by `zoom`.
pub fn sample_bounds(shapes: &[ShapeBounds], viewport: &Rect, zoom: f64) -> Vec<ShapeSample> {
    let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 0.0 };

    shapes
        .iter()
        .map(|s| ShapeSample {
            id: s.id.clone(),
            width: s.bounds.width * zoom,
            height: s.bounds.height * zoom,
            overlap: overlap_fraction(&s.bounds, viewport),
        })
        .collect()
}

/// A shape that counts as visible this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleShape {
    pub id: ShapeId,
    /// Overlap with the viewport, clamped to `0.0..=1.0`.
    pub overlap: f64,
    /// Estimated number of on-screen pixels.
    pub visible_px: f64,
}

/// Filter samples down to the shapes that are visible enough to matter.
///
/// Samples with a non-finite or non-positive size, or a non-finite overlap, are
/// dropped rather than reported as errors.
pub fn measure(samples: &[ShapeSample], tiny_px_floor: f64) -> Vec<VisibleShape> {
    samples
        .iter()
        .filter_map(|s| {
            if !(s.width.is_finite() && s.height.is_finite() && s.overlap.is_finite()) {
                return None;
            }
            if s.width <= 0.0 || s.height <= 0.0 {
                return None;
            }

            let overlap = s.overlap.clamp(0.0, 1.0);
            let visible_px = s.width * s.height * overlap;
            if visible_px <= 0.0 || visible_px < tiny_px_floor {
                return None;
            }

            Some(VisibleShape { id: s.id.clone(), overlap, visible_px })
        })
        .collect()
}
