use anyhow::{anyhow, Result};
use image::imageops;
use image::Luma;

use crate::config::SensorSettings;
use crate::frame::{DepthFrame, Roi};

/// Sensor-side frame preparation: median pre-filter, ROI crop, horizontal mirror.
#[derive(Clone, Debug)]
pub struct FramePrep {
    roi: Roi,
    median_kernel: u32,
    mirror: bool,
    sensor_width: u32,
    sensor_height: u32,
}

impl FramePrep {
    pub fn new(settings: &SensorSettings, roi: Roi) -> Self {
        Self {
            roi,
            median_kernel: settings.median_kernel,
            mirror: settings.mirror,
            sensor_width: settings.width,
            sensor_height: settings.height,
        }
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn sensor_size(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }

    /// Turn a full sensor frame into the ROI frame the core expects.
    pub fn prepare(&self, raw: &DepthFrame) -> Result<DepthFrame> {
        if !self.roi.fits_within(raw.width(), raw.height()) {
            return Err(anyhow!(
                "roi {:?} does not fit sensor frame {}x{}",
                self.roi,
                raw.width(),
                raw.height()
            ));
        }
        let filtered = median_filter(raw, self.median_kernel);
        let mut cropped = imageops::crop_imm(
            &filtered,
            self.roi.x0,
            self.roi.y0,
            self.roi.width(),
            self.roi.height(),
        )
        .to_image();
        if self.mirror {
            imageops::flip_horizontal_in_place(&mut cropped);
        }
        Ok(cropped)
    }
}

/// Wrap raw sensor samples into a frame, checking the sample count.
pub fn depth_from_samples(samples: Vec<u16>, width: u32, height: u32) -> Result<DepthFrame> {
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| anyhow!("depth frame dimensions overflow"))? as usize;
    if samples.len() != expected {
        return Err(anyhow!(
            "depth frame length mismatch: expected {}, got {}",
            expected,
            samples.len()
        ));
    }
    DepthFrame::from_raw(width, height, samples)
        .ok_or_else(|| anyhow!("depth frame buffer rejected"))
}

/// k×k median with replicated borders. Kernels below 3 return the input unchanged.
pub fn median_filter(frame: &DepthFrame, kernel: u32) -> DepthFrame {
    if kernel < 3 {
        return frame.clone();
    }
    let radius = (kernel / 2) as i64;
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let mut window = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    DepthFrame::from_fn(frame.width(), frame.height(), |x, y| {
        window.clear();
        for dy in -radius..=radius {
            let sy = (y as i64 + dy).clamp(0, h - 1) as u32;
            for dx in -radius..=radius {
                let sx = (x as i64 + dx).clamp(0, w - 1) as u32;
                window.push(frame.get_pixel(sx, sy)[0]);
            }
        }
        let mid = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable(mid);
        Luma([*median])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;
    use crate::frame::flat_frame;

    #[test]
    fn median_removes_isolated_spike() {
        let mut frame = flat_frame(9, 9, 1000);
        frame.put_pixel(4, 4, Luma([0]));
        frame.put_pixel(0, 0, Luma([65535]));
        let filtered = median_filter(&frame, 5);
        assert!(filtered.pixels().all(|p| p[0] == 1000));
    }

    #[test]
    fn prepare_crops_and_mirrors() {
        let mut settings = CanvasConfig::default().sensor;
        settings.median_kernel = 1;
        let roi = Roi {
            x0: 2,
            y0: 1,
            x1: 6,
            y1: 3,
        };
        let prep = FramePrep::new(&settings, roi);
        let raw = DepthFrame::from_fn(8, 4, |x, y| Luma([(y * 10 + x) as u16]));
        let out = prep.prepare(&raw).unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        assert_eq!(out.get_pixel(0, 0)[0], 15);
        assert_eq!(out.get_pixel(3, 1)[0], 22);
    }

    #[test]
    fn sample_count_is_checked() {
        assert!(depth_from_samples(vec![0; 11], 4, 3).is_err());
        assert_eq!(depth_from_samples(vec![7; 12], 4, 3).unwrap().dimensions(), (4, 3));
    }
}
