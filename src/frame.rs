//! Frame and geometry types shared by every pipeline stage.
//!
//! - `DepthFrame`: ROI-sized grid of 16-bit depth samples (millimeters).
//! - `MappedFrame`: 8-bit delta image where 128 is the baseline level.
//! - `HeightMap`: float heights (relief patches, height deltas).
//! - `Roi` / `Rect`: integer rectangles in sensor and ROI coordinates.
//!
//! Frame dimensions are fixed for a session; stages that combine two frames
//! check sizes with `ensure_same_size` instead of trusting the caller.

use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::CanvasError;

/// Neutral level of a mapped frame: a pixel exactly at baseline depth.
pub const NEUTRAL_LEVEL: u8 = 128;

pub type DepthFrame = ImageBuffer<Luma<u16>, Vec<u16>>;
pub type MappedFrame = GrayImage;
pub type HeightMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Build a frame where every sample has the same depth.
pub fn flat_frame(width: u32, height: u32, depth_mm: u16) -> DepthFrame {
    DepthFrame::from_pixel(width, height, Luma([depth_mm]))
}

pub fn ensure_same_size(expected: &DepthFrame, actual: &DepthFrame) -> Result<(), CanvasError> {
    if expected.dimensions() != actual.dimensions() {
        return Err(CanvasError::FrameSizeMismatch {
            expected: expected.dimensions(),
            actual: actual.dimensions(),
        });
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Region of interest
// ----------------------------------------------------------------------------

/// Rectangle of the raw sensor frame the pipeline operates on. `x1`/`y1` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Roi {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// True when the ROI lies fully inside a sensor frame of the given size.
    pub fn fits_within(&self, sensor_width: u32, sensor_height: u32) -> bool {
        self.x1 <= sensor_width && self.y1 <= sensor_height && !self.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

// ----------------------------------------------------------------------------
// Rect
// ----------------------------------------------------------------------------

/// Axis-aligned rectangle in frame coordinates. May extend past the frame until clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle of size `w`×`h` whose center is at (`cx`, `cy`).
    pub fn centered(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let w = w.max(0.0);
        let h = h.max(0.0);
        Self {
            x: (cx - w / 2.0) as i32,
            y: (cy - h / 2.0) as i32,
            w: w as u32,
            h: h as u32,
        }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Intersect with `[0, width) × [0, height)`. `None` when nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.max(0) as i64;
        let y0 = self.y.max(0) as i64;
        let x1 = (self.x as i64 + self.w as i64).min(width as i64);
        let y1 = (self.y as i64 + self.h as i64).min(height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(Rect {
            x: x0 as i32,
            y: y0 as i32,
            w: (x1 - x0) as u32,
            h: (y1 - y0) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_dimensions_are_derived() {
        let roi = Roi {
            x0: 125,
            y0: 90,
            x1: 400,
            y1: 265,
        };
        assert_eq!(roi.width(), 275);
        assert_eq!(roi.height(), 175);
        assert!(roi.fits_within(512, 424));
        assert!(!roi.fits_within(300, 424));
    }

    #[test]
    fn rect_clamps_to_frame_bounds() {
        let rect = Rect::new(-5, 8, 20, 10);
        assert_eq!(rect.clamp_to(12, 12), Some(Rect::new(0, 8, 12, 4)));
        assert_eq!(Rect::new(20, 20, 5, 5).clamp_to(12, 12), None);
    }

    #[test]
    fn centered_rect_uses_truncated_origin() {
        let rect = Rect::centered(10.0, 10.0, 6.0, 4.0);
        assert_eq!(rect, Rect::new(7, 8, 6, 4));
    }

    #[test]
    fn size_mismatch_is_reported() {
        let a = flat_frame(4, 4, 1000);
        let b = flat_frame(4, 5, 1000);
        assert!(ensure_same_size(&a, &a).is_ok());
        assert!(matches!(
            ensure_same_size(&a, &b),
            Err(CanvasError::FrameSizeMismatch { .. })
        ));
    }
}
