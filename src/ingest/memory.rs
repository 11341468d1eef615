use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use super::DepthSource;
use crate::frame::DepthFrame;

/// Queue of ready-made ROI frames.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<DepthFrame>,
    opened: bool,
    closed_count: usize,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = DepthFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            opened: false,
            closed_count: 0,
        }
    }

    pub fn push(&mut self, frame: DepthFrame) {
        self.frames.push_back(frame);
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// How many times `close` released an open source.
    pub fn closed_count(&self) -> usize {
        self.closed_count
    }
}

impl DepthSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&mut self) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.opened {
            self.closed_count += 1;
        }
        self.opened = false;
    }

    fn has_new_frame(&mut self) -> bool {
        self.opened && !self.frames.is_empty()
    }

    fn get_frame(&mut self) -> Result<DepthFrame> {
        if !self.opened {
            return Err(anyhow!("memory source is not open"));
        }
        self.frames
            .pop_front()
            .ok_or_else(|| anyhow!("memory source is empty"))
    }

    fn is_exhausted(&self) -> bool {
        self.opened && self.frames.is_empty()
    }
}
