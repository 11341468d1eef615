use std::sync::Arc;

use crate::config::{MatchMethod, MatchSettings};
use crate::frame::DepthFrame;
use crate::imaging::{self, Contour};
use crate::templates::{SizeClass, Template, TemplateManager};

/// Nearest-template classification of contours.
///
/// Small and medium contours are compared by shape; background-sized contours by their
/// normalized top-edge profile. Equal scores resolve to the template that comes first
/// in name order.
#[derive(Clone, Debug)]
pub struct ShapeClassifier {
    templates: Arc<TemplateManager>,
    settings: MatchSettings,
}

impl ShapeClassifier {
    pub fn new(templates: Arc<TemplateManager>) -> Self {
        let settings = templates.settings().clone();
        Self {
            templates,
            settings,
        }
    }

    pub fn templates(&self) -> &TemplateManager {
        &self.templates
    }

    pub fn bucket_for_area(&self, area: f64) -> SizeClass {
        if area < self.settings.small_area_threshold {
            SizeClass::Small
        } else if area < self.settings.area_threshold {
            SizeClass::Medium
        } else {
            SizeClass::Background
        }
    }

    /// Closest template for `contour`, or `None` when its bucket is empty.
    pub fn classify(&self, contour: &Contour) -> Option<&Template> {
        match self.bucket_for_area(contour.area()) {
            SizeClass::Background => self.classify_background(contour),
            bucket => self.classify_shape(contour, bucket),
        }
    }

    fn classify_shape(&self, contour: &Contour, bucket: SizeClass) -> Option<&Template> {
        let score = |t: &Template| match self.settings.method {
            MatchMethod::HuDistance => imaging::hu_distance(contour, &t.contour),
            MatchMethod::ContourSimilarity | MatchMethod::Relief => {
                imaging::match_shapes(contour, &t.contour)
            }
        };
        pick_min(self.templates.bucket(bucket).map(|t| (t, score(t))))
    }

    fn classify_background(&self, contour: &Contour) -> Option<&Template> {
        let filled = imaging::fill_contour(contour, contour.bounding_rect());
        let query = imaging::height_profile(&filled, self.settings.profile_samples);
        pick_min(
            self.templates
                .bucket(SizeClass::Background)
                .filter_map(|t| {
                    let profile = t.profile.as_ref()?;
                    Some((t, imaging::profile_distance(&query, profile)))
                }),
        )
    }

    /// Compare the measured height map under `contour` with every template relief.
    ///
    /// Heights are `baseline - frame` inside the filled contour. Returns the template
    /// with the lowest mean squared error if it is below the match threshold.
    pub fn classify_relief(
        &self,
        contour: &Contour,
        frame: &DepthFrame,
        baseline: &DepthFrame,
    ) -> Option<&Template> {
        if contour.area() < self.settings.small_area_threshold {
            return None;
        }
        if frame.dimensions() != baseline.dimensions() {
            return None;
        }
        let rect = contour
            .bounding_rect()
            .clamp_to(frame.width(), frame.height())?;
        let mask = imaging::fill_contour(contour, rect);
        let (x0, y0) = (rect.x as u32, rect.y as u32);
        let measured: Vec<(u32, u32, f32)> = mask
            .enumerate_pixels()
            .filter(|(_, _, m)| m[0] > 0)
            .map(|(x, y, _)| {
                let b = baseline.get_pixel(x0 + x, y0 + y)[0] as f32;
                let f = frame.get_pixel(x0 + x, y0 + y)[0] as f32;
                (x, y, b - f)
            })
            .collect();
        if measured.is_empty() {
            return None;
        }

        let scored = self.templates.all().iter().filter_map(|t| {
            let relief = imaging::resize_heights(t.relief.as_ref()?, rect.w, rect.h)?;
            let sse: f64 = measured
                .iter()
                .map(|&(x, y, h)| {
                    let d = (h - relief.get_pixel(x, y)[0]) as f64;
                    d * d
                })
                .sum();
            Some((t, sse / measured.len() as f64))
        });
        let (best, mse) = pick_min_scored(scored)?;
        log::debug!("classifier: relief best match '{}' mse {:.2}", best.name, mse);
        (mse < self.settings.match_threshold).then_some(best)
    }
}

fn pick_min<'a>(scored: impl Iterator<Item = (&'a Template, f64)>) -> Option<&'a Template> {
    pick_min_scored(scored).map(|(t, _)| t)
}

fn pick_min_scored<'a>(
    scored: impl Iterator<Item = (&'a Template, f64)>,
) -> Option<(&'a Template, f64)> {
    let mut best: Option<(&Template, f64)> = None;
    for (template, score) in scored {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((template, score));
        }
    }
    best
}
