use image::imageops;

use crate::frame::{ensure_same_size, DepthFrame, Rect};
use crate::imaging;
use crate::templates::TemplateManager;
use crate::CanvasError;

/// A relief baked into the baseline, keyed by the id of the object that caused it.
#[derive(Clone, Debug)]
pub struct PlacedZone {
    pub obj_id: String,
    pub name: String,
    /// Always clamped to the baseline extents.
    pub rect: Rect,
    original: DepthFrame,
}

/// Emitted when a baked object is detected as physically removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneRemoval {
    pub obj_id: String,
    pub name: String,
    pub rect: Rect,
}

/// Owns the mutable baseline after calibration.
#[derive(Debug)]
pub struct BaselineManager {
    baseline: DepthFrame,
    zones: Vec<PlacedZone>,
    removal_threshold: f32,
    removal_ratio: f32,
}

impl BaselineManager {
    pub fn new(initial: DepthFrame, removal_threshold: f32, removal_ratio: f32) -> Self {
        Self {
            baseline: initial,
            zones: Vec::new(),
            removal_threshold,
            removal_ratio,
        }
    }

    pub fn baseline(&self) -> &DepthFrame {
        &self.baseline
    }

    pub fn zones(&self) -> &[PlacedZone] {
        &self.zones
    }

    pub fn has_zone(&self, obj_id: &str) -> bool {
        self.zones.iter().any(|z| z.obj_id == obj_id)
    }

    /// Bake template `name`'s relief into the baseline, centered at `centroid` with `size`.
    ///
    /// Returns the clamped zone rectangle, or `None` when the template has no relief or
    /// the zone falls outside the frame.
    pub fn place_zone(
        &mut self,
        templates: &TemplateManager,
        obj_id: &str,
        name: &str,
        centroid: (f32, f32),
        size: (f32, f32),
    ) -> Result<Option<Rect>, CanvasError> {
        let template = templates.require(name)?;
        let Some(relief) = template.relief.as_ref() else {
            return Ok(None);
        };
        let (width, height) = self.baseline.dimensions();
        let Some(rect) = Rect::centered(centroid.0, centroid.1, size.0, size.1).clamp_to(width, height)
        else {
            return Ok(None);
        };
        let Some(resized) = imaging::resize_heights(relief, rect.w, rect.h) else {
            return Ok(None);
        };

        let (x0, y0) = (rect.x as u32, rect.y as u32);
        let original = imageops::crop_imm(&self.baseline, x0, y0, rect.w, rect.h).to_image();
        for (dx, dy, h) in resized.enumerate_pixels() {
            let px = self.baseline.get_pixel_mut(x0 + dx, y0 + dy);
            px[0] = (px[0] as f32 - h[0]).round().clamp(0.0, u16::MAX as f32) as u16;
        }
        self.zones.push(PlacedZone {
            obj_id: obj_id.to_string(),
            name: name.to_string(),
            rect,
            original,
        });
        log::info!("baseline: baked '{}' ({}) into {:?}", name, obj_id, rect);
        Ok(Some(rect))
    }

    /// Detect baked objects that were lifted off the table.
    ///
    /// A zone is removed when more than `removal_ratio` of its pixels read deeper than
    /// the baseline by over `removal_threshold` mm; its baseline patch is overwritten
    /// with the raw frame.
    pub fn detect_and_handle_removals(
        &mut self,
        raw: &DepthFrame,
    ) -> Result<Vec<ZoneRemoval>, CanvasError> {
        ensure_same_size(&self.baseline, raw)?;
        let (width, height) = self.baseline.dimensions();
        let mut removals = Vec::new();
        let mut kept = Vec::with_capacity(self.zones.len());

        for zone in std::mem::take(&mut self.zones) {
            let Some(rect) = zone.rect.clamp_to(width, height) else {
                continue;
            };
            let (x0, y0) = (rect.x as u32, rect.y as u32);
            let mut lifted = 0u64;
            for y in y0..y0 + rect.h {
                for x in x0..x0 + rect.w {
                    let delta = raw.get_pixel(x, y)[0] as f32 - self.baseline.get_pixel(x, y)[0] as f32;
                    if delta > self.removal_threshold {
                        lifted += 1;
                    }
                }
            }
            let ratio = lifted as f64 / rect.area() as f64;
            if ratio > self.removal_ratio as f64 {
                let patch = imageops::crop_imm(raw, x0, y0, rect.w, rect.h).to_image();
                imageops::replace(&mut self.baseline, &patch, x0 as i64, y0 as i64);
                log::info!(
                    "baseline: '{}' ({}) removed, {:.0}% of zone lifted",
                    zone.name,
                    zone.obj_id,
                    ratio * 100.0
                );
                removals.push(ZoneRemoval {
                    obj_id: zone.obj_id,
                    name: zone.name,
                    rect,
                });
            } else {
                kept.push(zone);
            }
        }
        self.zones = kept;
        Ok(removals)
    }

    /// Drop a zone and restore the baseline patch it replaced.
    pub fn release_zone(&mut self, obj_id: &str) -> Option<PlacedZone> {
        let idx = self.zones.iter().position(|z| z.obj_id == obj_id)?;
        let zone = self.zones.remove(idx);
        imageops::replace(
            &mut self.baseline,
            &zone.original,
            zone.rect.x as i64,
            zone.rect.y as i64,
        );
        log::info!("baseline: released '{}' ({})", zone.name, zone.obj_id);
        Some(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;
    use crate::frame::{flat_frame, HeightMap};
    use crate::imaging::Contour;
    use crate::templates::Template;
    use image::Luma;

    fn templates() -> TemplateManager {
        let settings = CanvasConfig::default().matching;
        let contour = Contour::from_coords(&[(0, 0), (19, 0), (19, 9), (0, 9)]);
        let hill = Template::from_contour("landscape_hill", contour.clone(), &settings)
            .with_relief(HeightMap::from_pixel(20, 10, Luma([30.0])));
        let flat = Template::from_contour("flat", contour, &settings);
        TemplateManager::from_templates(vec![hill, flat], &settings)
    }

    #[test]
    fn placing_bakes_relief_into_baseline() {
        let mut manager = BaselineManager::new(flat_frame(40, 30, 1000), 20.0, 0.5);
        let rect = manager
            .place_zone(&templates(), "a1", "landscape_hill", (20.0, 15.0), (20.0, 10.0))
            .unwrap()
            .unwrap();
        assert_eq!(rect, Rect::new(10, 10, 20, 10));
        assert_eq!(manager.baseline().get_pixel(15, 12)[0], 970);
        assert_eq!(manager.baseline().get_pixel(5, 5)[0], 1000);
        assert!(manager.has_zone("a1"));
    }

    #[test]
    fn relief_is_scaled_to_zone_size() {
        let mut manager = BaselineManager::new(flat_frame(60, 40, 1000), 20.0, 0.5);
        let rect = manager
            .place_zone(&templates(), "a1", "landscape_hill", (30.0, 20.0), (40.0, 20.0))
            .unwrap()
            .unwrap();
        assert_eq!(rect, Rect::new(10, 10, 40, 20));
        for (x, y) in [(10, 10), (30, 20), (49, 29)] {
            assert_eq!(manager.baseline().get_pixel(x, y)[0], 970, "({x}, {y})");
        }
        assert_eq!(manager.baseline().get_pixel(9, 10)[0], 1000);
    }

    #[test]
    fn zone_is_clamped_to_frame() {
        let mut manager = BaselineManager::new(flat_frame(40, 30, 1000), 20.0, 0.5);
        let rect = manager
            .place_zone(&templates(), "a1", "landscape_hill", (2.0, 2.0), (20.0, 10.0))
            .unwrap()
            .unwrap();
        assert_eq!(rect, Rect::new(0, 0, 12, 7));
    }

    #[test]
    fn template_without_relief_is_not_baked() {
        let mut manager = BaselineManager::new(flat_frame(40, 30, 1000), 20.0, 0.5);
        let placed = manager
            .place_zone(&templates(), "a1", "flat", (20.0, 15.0), (20.0, 10.0))
            .unwrap();
        assert!(placed.is_none());
        assert!(manager.zones().is_empty());
        assert!(matches!(
            manager.place_zone(&templates(), "a2", "kite", (20.0, 15.0), (20.0, 10.0)),
            Err(CanvasError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn lifted_zone_triggers_single_removal() {
        let mut manager = BaselineManager::new(flat_frame(40, 30, 1000), 20.0, 0.5);
        manager
            .place_zone(&templates(), "a1", "landscape_hill", (20.0, 15.0), (20.0, 10.0))
            .unwrap();

        // Piece still present: raw matches the baked baseline.
        let mut present = flat_frame(40, 30, 1000);
        for y in 10..20 {
            for x in 10..30 {
                present.put_pixel(x, y, Luma([970]));
            }
        }
        assert!(manager.detect_and_handle_removals(&present).unwrap().is_empty());

        // Piece lifted: raw reads the bare table again (30 mm deeper than baked baseline).
        let lifted = flat_frame(40, 30, 1000);
        let removals = manager.detect_and_handle_removals(&lifted).unwrap();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].obj_id, "a1");
        assert_eq!(manager.baseline().get_pixel(15, 12)[0], 1000);
        assert!(manager.detect_and_handle_removals(&lifted).unwrap().is_empty());
    }

    #[test]
    fn release_restores_original_patch() {
        let mut manager = BaselineManager::new(flat_frame(40, 30, 1000), 20.0, 0.5);
        manager
            .place_zone(&templates(), "a1", "landscape_hill", (20.0, 15.0), (20.0, 10.0))
            .unwrap();
        let zone = manager.release_zone("a1").unwrap();
        assert_eq!(zone.name, "landscape_hill");
        assert!(manager.baseline().pixels().all(|p| p[0] == 1000));
        assert!(manager.release_zone("a1").is_none());
    }
}
