//! Depth frame sources.
//!
//! This module provides the sensor side of the pipeline:
//! - Synthetic sandbox (`stub://...`) for demos and smoke tests
//! - Replay of recorded 16-bit PNG depth captures (`replay://<dir>` or a plain path)
//! - In-memory queue for tests
//!
//! Every source hands the core ROI-sized frames that already went through `FramePrep`
//! (median pre-filter, ROI crop, horizontal mirror).
//!
//! Sources MUST NOT:
//! - Block in `has_new_frame`
//! - Return frames of varying dimensions within a session

use anyhow::{anyhow, Result};

use crate::config::SensorSettings;
use crate::frame::{DepthFrame, Roi};

pub mod memory;
pub mod normalize;
pub mod replay;
pub mod synthetic;

pub use memory::MemorySource;
pub use normalize::FramePrep;
pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

const STUB_SCHEME: &str = "stub://";
const REPLAY_SCHEME: &str = "replay://";

/// A depth sensor as seen by the frame loop.
pub trait DepthSource {
    fn name(&self) -> &str;

    /// Acquire the device. Failure is fatal for the session.
    fn open(&mut self) -> Result<()>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);

    fn has_new_frame(&mut self) -> bool;

    /// Next prepared ROI-sized frame.
    fn get_frame(&mut self) -> Result<DepthFrame>;

    /// True once a finite source has delivered its last frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Build the source named by `settings.source`.
pub fn open_source(settings: &SensorSettings, roi: Roi) -> Result<Box<dyn DepthSource>> {
    let prep = FramePrep::new(settings, roi);
    let source = settings.source.trim();
    if source.is_empty() {
        return Err(anyhow!("sensor source must not be empty"));
    }
    let mut boxed: Box<dyn DepthSource> = if source.starts_with(STUB_SCHEME) {
        Box::new(SyntheticSource::new(source, prep))
    } else if let Some(dir) = source.strip_prefix(REPLAY_SCHEME) {
        Box::new(ReplaySource::new(dir, prep))
    } else if source.contains("://") {
        return Err(anyhow!("unsupported sensor source {}", source));
    } else {
        Box::new(ReplaySource::new(source, prep))
    };
    boxed.open()?;
    Ok(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;

    #[test]
    fn stub_scheme_opens_synthetic_source() {
        let cfg = CanvasConfig::default();
        let mut source = open_source(&cfg.sensor, cfg.roi).unwrap();
        assert_eq!(source.name(), "stub://sandbox");
        let frame = source.get_frame().unwrap();
        assert_eq!(frame.dimensions(), (cfg.roi.width(), cfg.roi.height()));
        source.close();
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let mut cfg = CanvasConfig::default();
        cfg.sensor.source = "rtsp://camera".to_string();
        assert!(open_source(&cfg.sensor, cfg.roi).is_err());
    }

    #[test]
    fn missing_replay_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = CanvasConfig::default();
        cfg.sensor.source = dir.path().join("missing").display().to_string();
        assert!(open_source(&cfg.sensor, cfg.roi).is_err());
    }
}
