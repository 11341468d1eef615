use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::{threshold, ThresholdType};

use crate::config::StrokeSettings;
use crate::imaging;
use crate::stroke::StrokePoint;
use crate::Tool;

const CLEAN_RADIUS: u8 = 3;

/// Extracts stroke centerline points from an accumulated composite.
#[derive(Clone, Debug)]
pub struct BrushStrokeDetector {
    blur_sigma: f32,
    intensity_thresh: u8,
    radius_min: f32,
    radius_max: f32,
}

impl BrushStrokeDetector {
    pub fn new(settings: &StrokeSettings) -> Self {
        Self {
            blur_sigma: settings.blur_sigma,
            intensity_thresh: settings.intensity_thresh,
            radius_min: settings.radius_min,
            radius_max: settings.radius_max,
        }
    }

    /// Skeleton pixels of the tool's channel whose distance to the stroke edge lies in
    /// `[radius_min, radius_max]`; size is the local stroke width (twice that distance).
    pub fn detect(&self, composite: &RgbImage, tool: Tool) -> Vec<StrokePoint> {
        let Some(channel) = tool.channel() else {
            return Vec::new();
        };
        let plane = GrayImage::from_fn(composite.width(), composite.height(), |x, y| {
            Luma([composite.get_pixel(x, y)[channel]])
        });
        let blurred = imaging::gaussian_blur(&plane, self.blur_sigma);
        let mask = threshold(&blurred, self.intensity_thresh, ThresholdType::Binary);
        let mask = imaging::open_close(&mask, CLEAN_RADIUS);
        if mask.pixels().all(|p| p[0] == 0) {
            return Vec::new();
        }
        let distance = imaging::distance_inside(&mask);
        let skeleton = imaging::skeletonize(&mask);

        skeleton
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .filter_map(|(x, y, _)| {
                let d = distance.get_pixel(x, y)[0];
                (d >= self.radius_min && d <= self.radius_max).then_some(StrokePoint {
                    tool,
                    x: x as i32,
                    y: y as i32,
                    size: 2.0 * d,
                })
            })
            .collect()
    }
}
