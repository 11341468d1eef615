use image::{Rgb, Rgb32FImage, RgbImage};

use crate::frame::{MappedFrame, NEUTRAL_LEVEL};
use crate::imaging::to_u8_saturating;
use crate::Tool;

/// Exponentially smoothed depth-change canvas, one three-plane buffer per stroke tool.
///
/// Each tool writes only into its own channel (tool 1 → channel 0, ...).
#[derive(Debug)]
pub struct StrokeAccumulator {
    width: u32,
    height: u32,
    alpha: f32,
    abs_mode: bool,
    buffers: Vec<Rgb32FImage>,
}

impl StrokeAccumulator {
    pub fn new(width: u32, height: u32, alpha: f32, abs_mode: bool) -> Self {
        Self {
            width,
            height,
            alpha,
            abs_mode,
            buffers: (0..Tool::STROKE_TOOLS)
                .map(|_| Rgb32FImage::new(width, height))
                .collect(),
        }
    }

    /// Blend `mapped` into the tool's plane and return the tool's 8-bit composite.
    /// Returns `None` for tools without a stroke channel or mismatched frame sizes.
    pub fn update(&mut self, mapped: &MappedFrame, tool: Tool) -> Option<RgbImage> {
        let channel = tool.channel()?;
        if mapped.dimensions() != (self.width, self.height) {
            return None;
        }
        let (alpha, abs_mode) = (self.alpha, self.abs_mode);
        let buffer = &mut self.buffers[channel];
        for (px, m) in buffer.pixels_mut().zip(mapped.pixels()) {
            let signed = m[0] as f32 - NEUTRAL_LEVEL as f32;
            // Without abs mode only levels below neutral contribute.
            let diff = if abs_mode { signed.abs() } else { (-signed).max(0.0) };
            px[channel] = (1.0 - alpha) * px[channel] + alpha * diff;
        }
        Some(composite(buffer))
    }

    /// Current composite of a tool without updating it.
    pub fn composite(&self, tool: Tool) -> Option<RgbImage> {
        let channel = tool.channel()?;
        Some(composite(&self.buffers[channel]))
    }

    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.pixels_mut().for_each(|px| *px = Rgb([0.0; 3]));
        }
    }
}

fn composite(buffer: &Rgb32FImage) -> RgbImage {
    RgbImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let px = buffer.get_pixel(x, y);
        Rgb([
            to_u8_saturating(px[0]),
            to_u8_saturating(px[1]),
            to_u8_saturating(px[2]),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mapped(level: u8) -> MappedFrame {
        MappedFrame::from_pixel(4, 4, Luma([level]))
    }

    #[test]
    fn smoothing_converges_on_tool_channel() {
        let mut acc = StrokeAccumulator::new(4, 4, 0.5, true);
        let tool = Tool::new(2).unwrap();
        let first = acc.update(&mapped(28), tool).unwrap();
        assert_eq!(first.get_pixel(0, 0).0, [0, 50, 0]);
        let second = acc.update(&mapped(28), tool).unwrap();
        assert_eq!(second.get_pixel(0, 0).0, [0, 75, 0]);
        assert_eq!(acc.composite(Tool::new(1).unwrap()).unwrap().get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn one_sided_mode_ignores_levels_above_neutral() {
        let mut acc = StrokeAccumulator::new(4, 4, 1.0, false);
        let tool = Tool::new(1).unwrap();
        let out = acc.update(&mapped(100), tool).unwrap();
        assert_eq!(out.get_pixel(1, 1).0, [28, 0, 0]);
        let out = acc.update(&mapped(200), tool).unwrap();
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 0]);

        let mut both = StrokeAccumulator::new(4, 4, 1.0, true);
        assert_eq!(both.update(&mapped(200), tool).unwrap().get_pixel(1, 1).0, [72, 0, 0]);
    }

    #[test]
    fn object_tool_has_no_canvas() {
        let mut acc = StrokeAccumulator::new(4, 4, 0.5, true);
        assert!(acc.update(&mapped(0), Tool::OBJECTS).is_none());
        acc.update(&mapped(0), Tool::new(3).unwrap());
        acc.clear();
        assert_eq!(acc.composite(Tool::new(3).unwrap()).unwrap().get_pixel(0, 0).0, [0, 0, 0]);
    }
}
