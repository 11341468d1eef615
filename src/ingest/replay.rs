use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{DepthSource, FramePrep};
use crate::frame::DepthFrame;

/// Replays a directory of 16-bit grayscale PNG depth captures in file-name order.
///
/// Captures may be full sensor frames (prepared like live frames) or already
/// ROI-sized (used as-is).
pub struct ReplaySource {
    name: String,
    dir: PathBuf,
    prep: FramePrep,
    files: Vec<PathBuf>,
    cursor: usize,
    opened: bool,
}

impl ReplaySource {
    pub fn new(dir: impl AsRef<Path>, prep: FramePrep) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            name: format!("replay://{}", dir.display()),
            dir,
            prep,
            files: Vec::new(),
            cursor: 0,
            opened: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.files.len().saturating_sub(self.cursor)
    }
}

impl DepthSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to open replay directory {}", self.dir.display()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("png"))
                    .unwrap_or(false)
            })
            .collect();
        if files.is_empty() {
            return Err(anyhow!(
                "replay directory {} holds no PNG captures",
                self.dir.display()
            ));
        }
        files.sort();
        log::info!("ReplaySource: {} captures in {}", files.len(), self.dir.display());
        self.files = files;
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn has_new_frame(&mut self) -> bool {
        self.opened && self.cursor < self.files.len()
    }

    fn get_frame(&mut self) -> Result<DepthFrame> {
        if !self.has_new_frame() {
            return Err(anyhow!("{} has no more frames", self.name));
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;
        let raw = image::open(path)
            .with_context(|| format!("failed to decode capture {}", path.display()))?
            .to_luma16();
        let roi = self.prep.roi();
        if raw.dimensions() == (roi.width(), roi.height()) {
            return Ok(raw);
        }
        self.prep.prepare(&raw)
    }

    fn is_exhausted(&self) -> bool {
        self.opened && self.cursor >= self.files.len()
    }
}
