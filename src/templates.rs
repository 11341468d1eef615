//! Reference templates loaded once at startup.
//!
//! A template directory holds one PNG per shape: dark pixels form the silhouette and
//! the largest external contour becomes the reference contour. An optional sibling
//! `<name>.relief.png` (16-bit, millimeters) carries the physical height of the piece.
//!
//! Templates are bucketed by size class:
//! - background: name prefix `fond_` / `landscape_` / `background_`, or area at or above
//!   the area threshold (the area rule wins over any other prefix)
//! - small: prefix `small_`, or area at or below the small-area threshold
//! - medium: everything else

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::MatchSettings;
use crate::frame::HeightMap;
use crate::imaging::{self, Contour};
use crate::CanvasError;

const RELIEF_SUFFIX: &str = ".relief";
const BACKGROUND_PREFIXES: [&str; 3] = ["fond_", "landscape_", "background_"];
const SMALL_PREFIX: &str = "small_";
const SILHOUETTE_LEVEL: u8 = 127;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Background,
}

#[derive(Clone, Debug)]
pub struct Template {
    pub name: String,
    pub class: SizeClass,
    pub contour: Contour,
    pub width: u32,
    pub height: u32,
    pub area: f64,
    /// Normalized top-edge profile, present for background templates.
    pub profile: Option<Vec<f32>>,
    /// Physical height of the piece in millimeters.
    pub relief: Option<HeightMap>,
}

impl Template {
    /// Build a template from a silhouette mask (non-zero = shape).
    /// Returns `None` when the mask holds no usable contour.
    pub fn from_mask(name: &str, mask: &GrayImage, settings: &MatchSettings) -> Option<Self> {
        let contour = imaging::find_external_contours(mask)
            .into_iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))?;
        let area = contour.area();
        if area <= 0.0 {
            return None;
        }
        Some(Self::from_contour(name, contour, settings))
    }

    pub fn from_contour(name: &str, contour: Contour, settings: &MatchSettings) -> Self {
        let area = contour.area();
        let rect = contour.bounding_rect();
        let class = size_class_for(name, area, settings);
        let profile = (class == SizeClass::Background).then(|| {
            let filled = imaging::fill_contour(&contour, rect);
            imaging::height_profile(&filled, settings.profile_samples)
        });
        Self {
            name: name.to_string(),
            class,
            contour,
            width: rect.w,
            height: rect.h,
            area,
            profile,
            relief: None,
        }
    }

    pub fn with_relief(mut self, relief: HeightMap) -> Self {
        self.relief = Some(relief);
        self
    }
}

pub fn size_class_for(name: &str, area: f64, settings: &MatchSettings) -> SizeClass {
    let lower = name.to_ascii_lowercase();
    if area >= settings.area_threshold || BACKGROUND_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        SizeClass::Background
    } else if lower.starts_with(SMALL_PREFIX) || area <= settings.small_area_threshold {
        SizeClass::Small
    } else {
        SizeClass::Medium
    }
}

/// Read-only template store with lookup by name and by size class.
#[derive(Debug)]
pub struct TemplateManager {
    dir: Option<PathBuf>,
    settings: MatchSettings,
    templates: Vec<Template>,
    by_name: HashMap<String, usize>,
}

impl TemplateManager {
    /// Load every template PNG under `dir`. Unreadable or empty templates are skipped.
    pub fn load(dir: &Path, settings: &MatchSettings) -> Result<Self> {
        let mut manager = Self {
            dir: Some(dir.to_path_buf()),
            settings: settings.clone(),
            templates: Vec::new(),
            by_name: HashMap::new(),
        };
        manager.reload()?;
        Ok(manager)
    }

    pub fn from_templates(templates: Vec<Template>, settings: &MatchSettings) -> Self {
        let mut manager = Self {
            dir: None,
            settings: settings.clone(),
            templates: Vec::new(),
            by_name: HashMap::new(),
        };
        manager.install(templates);
        manager
    }

    /// Clear and reload all templates from the directory. In-memory managers keep their set.
    pub fn reload(&mut self) -> Result<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        let templates = read_template_dir(&dir, &self.settings)?;
        log::info!(
            "templates: loaded {} from {} ({} small, {} medium, {} background)",
            templates.len(),
            dir.display(),
            templates.iter().filter(|t| t.class == SizeClass::Small).count(),
            templates.iter().filter(|t| t.class == SizeClass::Medium).count(),
            templates.iter().filter(|t| t.class == SizeClass::Background).count(),
        );
        self.install(templates);
        Ok(())
    }

    fn install(&mut self, mut templates: Vec<Template>) {
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates.dedup_by(|a, b| a.name == b.name);
        self.by_name = templates
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.name.clone(), idx))
            .collect();
        self.templates = templates;
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.by_name.get(name).map(|&idx| &self.templates[idx])
    }

    pub fn require(&self, name: &str) -> Result<&Template, CanvasError> {
        self.get(name)
            .ok_or_else(|| CanvasError::UnknownTemplate(name.to_string()))
    }

    /// Templates of one size class, in name order.
    pub fn bucket(&self, class: SizeClass) -> impl Iterator<Item = &Template> {
        self.templates.iter().filter(move |t| t.class == class)
    }

    pub fn all(&self) -> &[Template] {
        &self.templates
    }

    pub fn size_of(&self, name: &str) -> Option<(u32, u32)> {
        self.get(name).map(|t| (t.width, t.height))
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn read_template_dir(dir: &Path, settings: &MatchSettings) -> Result<Vec<Template>> {
    if !dir.is_dir() {
        return Err(anyhow!("template directory {} does not exist", dir.display()));
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list template directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_png(path))
        .collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.ends_with(RELIEF_SUFFIX) {
            continue;
        }
        match load_template(&path, name, settings) {
            Ok(Some(template)) => templates.push(template),
            Ok(None) => log::warn!("templates: {} has no contour, skipped", path.display()),
            Err(err) => log::warn!("templates: skipping {}: {:#}", path.display(), err),
        }
    }
    Ok(templates)
}

fn load_template(path: &Path, name: &str, settings: &MatchSettings) -> Result<Option<Template>> {
    let gray = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_luma8();
    let mask = threshold(&gray, SILHOUETTE_LEVEL, ThresholdType::BinaryInverted);
    let Some(template) = Template::from_mask(name, &mask, settings) else {
        return Ok(None);
    };

    let relief_path = path.with_file_name(format!("{name}{RELIEF_SUFFIX}.png"));
    if !relief_path.exists() {
        return Ok(Some(template));
    }
    match load_relief(&relief_path) {
        Ok(relief) => Ok(Some(template.with_relief(relief))),
        Err(err) => {
            log::warn!("templates: ignoring relief for {}: {:#}", name, err);
            Ok(Some(template))
        }
    }
}

fn load_relief(path: &Path) -> Result<HeightMap> {
    let raw = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_luma16();
    Ok(HeightMap::from_fn(raw.width(), raw.height(), |x, y| {
        Luma([raw.get_pixel(x, y)[0] as f32])
    }))
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}
