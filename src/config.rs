use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::Roi;

const DEFAULT_ROI: Roi = Roi {
    x0: 125,
    y0: 90,
    x1: 400,
    y1: 265,
};
const DEFAULT_TEMPLATE_DIR: &str = "templates";
const DEFAULT_AREA_THRESHOLD: f64 = 2000.0;
const DEFAULT_SMALL_AREA_THRESHOLD: f64 = 250.0;
const DEFAULT_MATCH_THRESHOLD: f64 = 100.0;
const DEFAULT_PROFILE_SAMPLES: usize = 50;
const DEFAULT_SCALE: f32 = 738.0 / 30.0;
const DEFAULT_MASK_THRESHOLD: u8 = 80;
const DEFAULT_MORPH_KERNEL: u8 = 3;
const DEFAULT_ALPHA: f32 = 0.1;
const DEFAULT_STROKE_INTENSITY: u8 = 30;
const DEFAULT_STROKE_RADIUS_MIN: f32 = 5.0;
const DEFAULT_STROKE_RADIUS_MAX: f32 = 50.0;
const DEFAULT_STROKE_SIZE_MAX: f32 = 100.0;
const DEFAULT_STROKE_CONFIRMATION_FRAMES: u32 = 5;
const DEFAULT_STROKE_PROXIMITY: i32 = 5;
const DEFAULT_STROKE_MAX_AGE: u32 = 5;
const DEFAULT_STROKE_BLUR_SIGMA: f32 = 0.8;
const DEFAULT_BG_MIN_CONFIRM: u32 = 5;
const DEFAULT_BG_MIN_REMOVE: u32 = 10;
const DEFAULT_CLUSTER_TOL: f32 = 2.0;
const DEFAULT_CLUSTER_MAX_HISTORY: usize = 10;
const DEFAULT_CLUSTER_MIN_POINTS: usize = 10;
const DEFAULT_MAX_AREA_RATIO: f64 = 0.5;
const DEFAULT_N_PROFILE: usize = 10;
const DEFAULT_REMOVAL_THRESHOLD: f32 = 20.0;
const DEFAULT_REMOVAL_RATIO: f32 = 0.5;
const DEFAULT_SOURCE: &str = "stub://sandbox";
const DEFAULT_MEDIAN_KERNEL: u32 = 5;
const DEFAULT_SENSOR_WIDTH: u32 = 512;
const DEFAULT_SENSOR_HEIGHT: u32 = 424;
const DEFAULT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_TOPIC_PREFIX: &str = "canvas";
const DEFAULT_MODULE_ID: u32 = 4;

#[derive(Debug, Deserialize, Default)]
struct CanvasConfigFile {
    roi: Option<Roi>,
    templates: Option<TemplatesConfigFile>,
    matching: Option<MatchingConfigFile>,
    depth: Option<DepthConfigFile>,
    strokes: Option<StrokesConfigFile>,
    background: Option<BackgroundConfigFile>,
    clusters: Option<ClustersConfigFile>,
    baseline: Option<BaselineConfigFile>,
    sensor: Option<SensorConfigFile>,
    transport: Option<TransportConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TemplatesConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct MatchingConfigFile {
    area_threshold: Option<f64>,
    small_area_threshold: Option<f64>,
    method: Option<MatchMethod>,
    match_threshold: Option<f64>,
    profile_samples: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DepthConfigFile {
    scale: Option<f32>,
    mask_threshold: Option<u8>,
    morph_kernel: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct StrokesConfigFile {
    alpha: Option<f32>,
    abs_mode: Option<bool>,
    intensity_thresh: Option<u8>,
    radius_min: Option<f32>,
    radius_max: Option<f32>,
    size_max: Option<f32>,
    confirmation_frames: Option<u32>,
    proximity: Option<i32>,
    max_age: Option<u32>,
    blur_sigma: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct BackgroundConfigFile {
    min_confirm_frames: Option<u32>,
    min_remove_frames: Option<u32>,
    bake: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ClustersConfigFile {
    tol: Option<f32>,
    max_history: Option<usize>,
    min_points: Option<usize>,
    max_area_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct BaselineConfigFile {
    n_profile: Option<usize>,
    removal_threshold: Option<f32>,
    removal_ratio: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SensorConfigFile {
    source: Option<String>,
    median_kernel: Option<u32>,
    mirror: Option<bool>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TransportConfigFile {
    broker: Option<String>,
    topic_prefix: Option<String>,
    module_id: Option<u32>,
    bypass: Option<bool>,
}

/// How small and medium contours are compared against templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Hu-invariant contour similarity (I1 metric).
    ContourSimilarity,
    /// Euclidean distance between log-scaled Hu descriptors.
    HuDistance,
    /// Height-map comparison against template reliefs, falling back to contour similarity.
    Relief,
}

#[derive(Debug, Clone)]
pub struct CanvasConfig {
    pub roi: Roi,
    pub template_dir: PathBuf,
    pub matching: MatchSettings,
    pub depth: DepthSettings,
    pub strokes: StrokeSettings,
    pub background: BackgroundSettings,
    pub clusters: ClusterSettings,
    pub baseline: BaselineSettings,
    pub sensor: SensorSettings,
    pub transport: TransportSettings,
}

#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub area_threshold: f64,
    pub small_area_threshold: f64,
    pub method: MatchMethod,
    /// Maximum relief MSE (mm²) accepted as a match.
    pub match_threshold: f64,
    /// Number of columns sampled for background height profiles.
    pub profile_samples: usize,
}

#[derive(Debug, Clone)]
pub struct DepthSettings {
    pub scale: f32,
    pub mask_threshold: u8,
    pub morph_kernel: u8,
}

#[derive(Debug, Clone)]
pub struct StrokeSettings {
    pub alpha: f32,
    pub abs_mode: bool,
    pub intensity_thresh: u8,
    pub radius_min: f32,
    pub radius_max: f32,
    pub size_max: f32,
    pub confirmation_frames: u32,
    pub proximity: i32,
    pub max_age: u32,
    pub blur_sigma: f32,
}

#[derive(Debug, Clone)]
pub struct BackgroundSettings {
    pub min_confirm_frames: u32,
    pub min_remove_frames: u32,
    /// Bake confirmed background reliefs into the baseline.
    pub bake: bool,
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub tol: f32,
    pub max_history: usize,
    pub min_points: usize,
    pub max_area_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct BaselineSettings {
    pub n_profile: usize,
    pub removal_threshold: f32,
    pub removal_ratio: f32,
}

#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub source: String,
    pub median_kernel: u32,
    pub mirror: bool,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub broker: String,
    pub topic_prefix: String,
    pub module_id: u32,
    pub bypass: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self::from_file(CanvasConfigFile::default())
    }
}

impl CanvasConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CANVAS_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as `load` with an explicit config file instead of `CANVAS_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = path.map(read_config_file).transpose()?;
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CanvasConfigFile) -> Self {
        let templates = file.templates.unwrap_or_default();
        let matching = file.matching.unwrap_or_default();
        let depth = file.depth.unwrap_or_default();
        let strokes = file.strokes.unwrap_or_default();
        let background = file.background.unwrap_or_default();
        let clusters = file.clusters.unwrap_or_default();
        let baseline = file.baseline.unwrap_or_default();
        let sensor = file.sensor.unwrap_or_default();
        let transport = file.transport.unwrap_or_default();

        Self {
            roi: file.roi.unwrap_or(DEFAULT_ROI),
            template_dir: templates
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR)),
            matching: MatchSettings {
                area_threshold: matching.area_threshold.unwrap_or(DEFAULT_AREA_THRESHOLD),
                small_area_threshold: matching
                    .small_area_threshold
                    .unwrap_or(DEFAULT_SMALL_AREA_THRESHOLD),
                method: matching.method.unwrap_or(MatchMethod::ContourSimilarity),
                match_threshold: matching.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
                profile_samples: matching.profile_samples.unwrap_or(DEFAULT_PROFILE_SAMPLES),
            },
            depth: DepthSettings {
                scale: depth.scale.unwrap_or(DEFAULT_SCALE),
                mask_threshold: depth.mask_threshold.unwrap_or(DEFAULT_MASK_THRESHOLD),
                morph_kernel: depth.morph_kernel.unwrap_or(DEFAULT_MORPH_KERNEL),
            },
            strokes: StrokeSettings {
                alpha: strokes.alpha.unwrap_or(DEFAULT_ALPHA),
                abs_mode: strokes.abs_mode.unwrap_or(true),
                intensity_thresh: strokes.intensity_thresh.unwrap_or(DEFAULT_STROKE_INTENSITY),
                radius_min: strokes.radius_min.unwrap_or(DEFAULT_STROKE_RADIUS_MIN),
                radius_max: strokes.radius_max.unwrap_or(DEFAULT_STROKE_RADIUS_MAX),
                size_max: strokes.size_max.unwrap_or(DEFAULT_STROKE_SIZE_MAX),
                confirmation_frames: strokes
                    .confirmation_frames
                    .unwrap_or(DEFAULT_STROKE_CONFIRMATION_FRAMES),
                proximity: strokes.proximity.unwrap_or(DEFAULT_STROKE_PROXIMITY),
                max_age: strokes.max_age.unwrap_or(DEFAULT_STROKE_MAX_AGE),
                blur_sigma: strokes.blur_sigma.unwrap_or(DEFAULT_STROKE_BLUR_SIGMA),
            },
            background: BackgroundSettings {
                min_confirm_frames: background
                    .min_confirm_frames
                    .unwrap_or(DEFAULT_BG_MIN_CONFIRM),
                min_remove_frames: background.min_remove_frames.unwrap_or(DEFAULT_BG_MIN_REMOVE),
                bake: background.bake.unwrap_or(true),
            },
            clusters: ClusterSettings {
                tol: clusters.tol.unwrap_or(DEFAULT_CLUSTER_TOL),
                max_history: clusters.max_history.unwrap_or(DEFAULT_CLUSTER_MAX_HISTORY),
                min_points: clusters.min_points.unwrap_or(DEFAULT_CLUSTER_MIN_POINTS),
                max_area_ratio: clusters.max_area_ratio.unwrap_or(DEFAULT_MAX_AREA_RATIO),
            },
            baseline: BaselineSettings {
                n_profile: baseline.n_profile.unwrap_or(DEFAULT_N_PROFILE),
                removal_threshold: baseline
                    .removal_threshold
                    .unwrap_or(DEFAULT_REMOVAL_THRESHOLD),
                removal_ratio: baseline.removal_ratio.unwrap_or(DEFAULT_REMOVAL_RATIO),
            },
            sensor: SensorSettings {
                source: sensor.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                median_kernel: sensor.median_kernel.unwrap_or(DEFAULT_MEDIAN_KERNEL),
                mirror: sensor.mirror.unwrap_or(true),
                width: sensor.width.unwrap_or(DEFAULT_SENSOR_WIDTH),
                height: sensor.height.unwrap_or(DEFAULT_SENSOR_HEIGHT),
            },
            transport: TransportSettings {
                broker: transport
                    .broker
                    .unwrap_or_else(|| DEFAULT_BROKER.to_string()),
                topic_prefix: transport
                    .topic_prefix
                    .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
                module_id: transport.module_id.unwrap_or(DEFAULT_MODULE_ID),
                bypass: transport.bypass.unwrap_or(false),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("CANVAS_TEMPLATE_DIR") {
            if !dir.trim().is_empty() {
                self.template_dir = PathBuf::from(dir);
            }
        }
        if let Ok(source) = std::env::var("CANVAS_SOURCE") {
            if !source.trim().is_empty() {
                self.sensor.source = source;
            }
        }
        if let Ok(broker) = std::env::var("CANVAS_MQTT_BROKER") {
            if !broker.trim().is_empty() {
                self.transport.broker = broker;
            }
        }
        if let Ok(module_id) = std::env::var("CANVAS_MODULE_ID") {
            self.transport.module_id = module_id
                .trim()
                .parse()
                .map_err(|_| anyhow!("CANVAS_MODULE_ID must be a non-negative integer"))?;
        }
        if let Ok(bypass) = std::env::var("CANVAS_BYPASS_TRANSPORT") {
            self.transport.bypass = parse_flag(&bypass)
                .ok_or_else(|| anyhow!("CANVAS_BYPASS_TRANSPORT must be true/false/1/0"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.roi.is_empty() {
            return Err(anyhow!(
                "roi must be non-empty (x1 > x0 and y1 > y0), got {:?}",
                self.roi
            ));
        }
        if !self.roi.fits_within(self.sensor.width, self.sensor.height) {
            return Err(anyhow!(
                "roi {:?} exceeds sensor frame {}x{}",
                self.roi,
                self.sensor.width,
                self.sensor.height
            ));
        }
        if !(self.strokes.alpha > 0.0 && self.strokes.alpha <= 1.0) {
            return Err(anyhow!("strokes.alpha must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.baseline.removal_ratio) {
            return Err(anyhow!("baseline.removal_ratio must be in [0, 1]"));
        }
        if self.baseline.n_profile == 0 {
            return Err(anyhow!("baseline.n_profile must be greater than zero"));
        }
        if self.matching.small_area_threshold >= self.matching.area_threshold {
            return Err(anyhow!(
                "matching.small_area_threshold must be below matching.area_threshold"
            ));
        }
        if self.strokes.radius_min > self.strokes.radius_max {
            return Err(anyhow!("strokes.radius_min must not exceed strokes.radius_max"));
        }
        if self.clusters.max_history == 0 {
            return Err(anyhow!("clusters.max_history must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CanvasConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CanvasConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.roi.width(), 275);
        assert_eq!(cfg.roi.height(), 175);
        assert_eq!(cfg.matching.method, MatchMethod::ContourSimilarity);
        assert_eq!(cfg.transport.module_id, 4);
    }

    #[test]
    fn rejects_inverted_area_thresholds() {
        let mut cfg = CanvasConfig::default();
        cfg.matching.small_area_threshold = 5000.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        let mut cfg = CanvasConfig::default();
        cfg.strokes.alpha = 0.0;
        assert!(cfg.validate().is_err());
        cfg.strokes.alpha = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn flags_parse_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
