//! Per-frame depth interpretation against a baseline.
//!
//! responsible for:
//! - mapping the signed depth delta to an 8-bit image (128 = baseline level)
//! - isolating regions closer to the sensor than the baseline
//! - returning their external contours
//!
//! MUST NOT:
//! - keep state between frames
//! - modify the baseline

use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};

use crate::config::DepthSettings;
use crate::frame::{ensure_same_size, DepthFrame, MappedFrame, NEUTRAL_LEVEL};
use crate::imaging::{self, Contour};
use crate::CanvasError;

#[derive(Clone, Debug)]
pub struct DepthResult {
    pub mapped: MappedFrame,
    pub mask: GrayImage,
    pub contours: Vec<Contour>,
}

#[derive(Clone, Debug)]
pub struct DepthProcessor {
    scale: f32,
    mask_threshold: u8,
    morph_radius: u8,
}

impl DepthProcessor {
    pub fn new(settings: &DepthSettings) -> Self {
        Self {
            scale: settings.scale,
            mask_threshold: settings.mask_threshold,
            morph_radius: settings.morph_kernel / 2,
        }
    }

    /// `clip(128 + (frame - baseline) * scale, 0, 255)` per pixel.
    pub fn map_delta(
        &self,
        frame: &DepthFrame,
        baseline: &DepthFrame,
    ) -> Result<MappedFrame, CanvasError> {
        ensure_same_size(baseline, frame)?;
        Ok(GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            let delta = frame.get_pixel(x, y)[0] as f32 - baseline.get_pixel(x, y)[0] as f32;
            let level = NEUTRAL_LEVEL as f32 + delta * self.scale;
            Luma([level.clamp(0.0, 255.0) as u8])
        }))
    }

    pub fn process(
        &self,
        frame: &DepthFrame,
        baseline: &DepthFrame,
    ) -> Result<DepthResult, CanvasError> {
        let mapped = self.map_delta(frame, baseline)?;
        // Objects are closer than the baseline, so they map darker than neutral.
        let mask = threshold(&mapped, self.mask_threshold, ThresholdType::BinaryInverted);
        let mask = imaging::open_close(&mask, self.morph_radius);
        let contours = imaging::find_external_contours(&mask);
        Ok(DepthResult {
            mapped,
            mask,
            contours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;
    use crate::frame::{flat_frame, Rect};

    fn processor() -> DepthProcessor {
        DepthProcessor::new(&CanvasConfig::default().depth)
    }

    #[test]
    fn unchanged_frame_maps_to_neutral() {
        let baseline = flat_frame(16, 12, 1200);
        let result = processor().process(&baseline, &baseline).unwrap();
        assert!(result.mapped.pixels().all(|p| p[0] == NEUTRAL_LEVEL));
        assert!(result.contours.is_empty());
    }

    #[test]
    fn raised_block_yields_one_contour() {
        let baseline = flat_frame(80, 60, 1200);
        let mut frame = baseline.clone();
        for y in 20..34 {
            for x in 30..50 {
                frame.put_pixel(x, y, Luma([1160]));
            }
        }
        let result = processor().process(&frame, &baseline).unwrap();
        assert_eq!(result.mapped.get_pixel(35, 25)[0], 0);
        assert_eq!(result.contours.len(), 1);
        assert_eq!(result.contours[0].bounding_rect(), Rect::new(30, 20, 20, 14));
    }

    #[test]
    fn deeper_pixels_map_brighter_and_are_ignored() {
        let baseline = flat_frame(40, 40, 1200);
        let mut frame = baseline.clone();
        for y in 10..20 {
            for x in 10..20 {
                frame.put_pixel(x, y, Luma([1300]));
            }
        }
        let result = processor().process(&frame, &baseline).unwrap();
        assert_eq!(result.mapped.get_pixel(15, 15)[0], 255);
        assert!(result.contours.is_empty());
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let err = processor()
            .process(&flat_frame(10, 10, 1), &flat_frame(12, 10, 1))
            .unwrap_err();
        assert!(matches!(err, CanvasError::FrameSizeMismatch { .. }));
    }
}
