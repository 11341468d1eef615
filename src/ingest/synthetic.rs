use anyhow::{anyhow, Result};
use image::Luma;
use std::time::{Duration, Instant};

use super::{DepthSource, FramePrep};
use crate::frame::{flat_frame, DepthFrame};

const FLOOR_MM: u16 = 1200;
const BLOCK_HEIGHT_MM: u16 = 40;
const BLOCK_SIZE: (u32, u32) = (20, 14);
const WARMUP_FRAMES: u64 = 30;
const BLOCK_PERIOD: u64 = 60;
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Sandbox scene: a flat floor where a block is placed and lifted periodically.
pub struct SyntheticSource {
    name: String,
    prep: FramePrep,
    opened: bool,
    frame_count: u64,
    last_frame: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(name: &str, prep: FramePrep) -> Self {
        Self {
            name: name.to_string(),
            prep,
            opened: false,
            frame_count: 0,
            last_frame: None,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn block_present(&self) -> bool {
        self.frame_count > WARMUP_FRAMES && ((self.frame_count - WARMUP_FRAMES) / BLOCK_PERIOD) % 2 == 0
    }

    fn generate_raw(&self) -> DepthFrame {
        let (width, height) = self.prep.sensor_size();
        let mut frame = flat_frame(width, height, FLOOR_MM);
        if self.block_present() {
            let roi = self.prep.roi();
            let x0 = roi.x0 + roi.width() / 2 - BLOCK_SIZE.0 / 2;
            let y0 = roi.y0 + roi.height() / 2 - BLOCK_SIZE.1 / 2;
            for y in y0..(y0 + BLOCK_SIZE.1).min(height) {
                for x in x0..(x0 + BLOCK_SIZE.0).min(width) {
                    frame.put_pixel(x, y, Luma([FLOOR_MM - BLOCK_HEIGHT_MM]));
                }
            }
        }
        frame
    }
}

impl DepthSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        self.opened = true;
        log::info!("SyntheticSource: connected to {} (synthetic)", self.name);
        Ok(())
    }

    fn close(&mut self) {
        if self.opened {
            log::info!("SyntheticSource: closed after {} frames", self.frame_count);
        }
        self.opened = false;
    }

    fn has_new_frame(&mut self) -> bool {
        self.opened
            && self
                .last_frame
                .map_or(true, |at| at.elapsed() >= FRAME_INTERVAL)
    }

    fn get_frame(&mut self) -> Result<DepthFrame> {
        if !self.opened {
            return Err(anyhow!("{} is not open", self.name));
        }
        self.frame_count += 1;
        self.last_frame = Some(Instant::now());
        self.prep.prepare(&self.generate_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;

    #[test]
    fn block_appears_after_warmup() {
        let cfg = CanvasConfig::default();
        let mut source = SyntheticSource::new("stub://sandbox", FramePrep::new(&cfg.sensor, cfg.roi));
        assert!(source.get_frame().is_err());
        source.open().unwrap();
        for _ in 0..WARMUP_FRAMES {
            let frame = source.get_frame().unwrap();
            assert!(frame.pixels().all(|p| p[0] == FLOOR_MM));
        }
        let frame = source.get_frame().unwrap();
        let (w, h) = frame.dimensions();
        assert_eq!(frame.get_pixel(w / 2, h / 2)[0], FLOOR_MM - BLOCK_HEIGHT_MM);
        assert_eq!(source.frames_captured(), WARMUP_FRAMES + 1);
    }
}
