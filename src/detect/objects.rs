use std::collections::HashMap;

use crate::config::ClusterSettings;
use crate::detect::{ClusterTracker, ObjectDiff, ObjectEvent};
use crate::frame::Roi;
use crate::templates::TemplateManager;

/// Turns confirmed clusters into object events.
#[derive(Debug)]
pub struct ObjectDetector {
    template_sizes: HashMap<String, (u32, u32)>,
    roi_area: f64,
    min_points: usize,
    max_area_ratio: f64,
    tracked: Vec<ObjectEvent>,
}

impl ObjectDetector {
    pub fn new(templates: &TemplateManager, roi: Roi, settings: &ClusterSettings) -> Self {
        Self {
            template_sizes: templates
                .all()
                .iter()
                .map(|t| (t.name.clone(), (t.width, t.height)))
                .collect(),
            roi_area: roi.area() as f64,
            min_points: settings.min_points,
            max_area_ratio: settings.max_area_ratio,
            tracked: Vec::new(),
        }
    }

    /// Objects backed by clusters with enough history and a plausible footprint.
    ///
    /// Clusters larger than `max_area_ratio` of the ROI (hands, arms) are skipped, as
    /// are shapes without a known template size.
    pub fn detect(&self, tracker: &ClusterTracker) -> Vec<ObjectEvent> {
        tracker
            .get_valid_clusters(self.min_points)
            .filter_map(|cluster| {
                let (w, h) = (cluster.avg_width(), cluster.avg_height());
                if (w as f64 * h as f64) > self.roi_area * self.max_area_ratio {
                    return None;
                }
                let &(tw, th) = self.template_sizes.get(&cluster.shape)?;
                if tw == 0 || th == 0 {
                    return None;
                }
                let scale = (w / tw as f32 + h / th as f32) / 2.0;
                let (cx, cy) = cluster.centroid();
                Some(ObjectEvent {
                    id: cluster.id.clone(),
                    shape: cluster.shape.clone(),
                    cx: cx as i32,
                    cy: cy as i32,
                    w,
                    h,
                    angle: cluster.avg_angle(),
                    scale,
                })
            })
            .collect()
    }

    /// Diff the current objects against the previous call.
    pub fn update(&mut self, tracker: &ClusterTracker) -> ObjectDiff {
        let current = self.detect(tracker);
        let new = current
            .iter()
            .filter(|o| !self.tracked.iter().any(|t| t.id == o.id))
            .cloned()
            .collect();
        let removed = self
            .tracked
            .iter()
            .filter(|t| !current.iter().any(|o| o.id == t.id))
            .map(|t| t.id.clone())
            .collect();
        self.tracked = current;
        ObjectDiff { new, removed }
    }

    pub fn tracked(&self) -> &[ObjectEvent] {
        &self.tracked
    }

    /// Forget every tracked object, returning their ids.
    pub fn reset(&mut self) -> Vec<String> {
        std::mem::take(&mut self.tracked)
            .into_iter()
            .map(|o| o.id)
            .collect()
    }
}
