use std::collections::VecDeque;

use crate::config::ClusterSettings;
use crate::detect::Detection;
use crate::fresh_id;

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterPoint {
    pub cx: f32,
    pub cy: f32,
    pub area: f32,
    pub angle: f32,
    pub width: f32,
    pub height: f32,
}

/// Same-shape detections that stayed at one place across frames.
#[derive(Clone, Debug)]
pub struct Cluster {
    pub id: String,
    pub shape: String,
    points: VecDeque<ClusterPoint>,
    pub last_seen: u64,
}

impl Cluster {
    fn new(shape: String, point: ClusterPoint, frame_idx: u64) -> Self {
        Self {
            id: fresh_id(),
            shape,
            points: VecDeque::from([point]),
            last_seen: frame_idx,
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &ClusterPoint> {
        self.points.iter()
    }

    pub fn confirmation_count(&self) -> usize {
        self.points.len()
    }

    fn mean(&self, f: impl Fn(&ClusterPoint) -> f32) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(f).sum::<f32>() / self.points.len() as f32
    }

    pub fn centroid(&self) -> (f32, f32) {
        (self.mean(|p| p.cx), self.mean(|p| p.cy))
    }

    pub fn avg_width(&self) -> f32 {
        self.mean(|p| p.width)
    }

    pub fn avg_height(&self) -> f32 {
        self.mean(|p| p.height)
    }

    pub fn avg_angle(&self) -> f32 {
        self.mean(|p| p.angle)
    }
}

#[derive(Debug)]
pub struct ClusterTracker {
    tol: f32,
    max_history: usize,
    area_threshold: f32,
    frame_idx: u64,
    clusters: Vec<Cluster>,
}

impl ClusterTracker {
    pub fn new(settings: &ClusterSettings, area_threshold: f64) -> Self {
        Self {
            tol: settings.tol,
            max_history: settings.max_history.max(1),
            area_threshold: area_threshold as f32,
            frame_idx: 0,
            clusters: Vec::new(),
        }
    }

    /// Fold one frame of detections into the tracked clusters.
    pub fn update(&mut self, detections: &[Detection]) {
        self.frame_idx += 1;
        for det in detections {
            let point = ClusterPoint {
                cx: det.cx,
                cy: det.cy,
                area: det.area,
                angle: if det.area > self.area_threshold {
                    0.0
                } else {
                    det.angle
                },
                width: det.width,
                height: det.height,
            };
            let tol = self.tol;
            let matched = self.clusters.iter_mut().find(|c| {
                if c.shape != det.shape {
                    return false;
                }
                let (mx, my) = c.centroid();
                (point.cx - mx).abs() <= tol && (point.cy - my).abs() <= tol
            });
            match matched {
                Some(cluster) => {
                    cluster.points.push_back(point);
                    if cluster.points.len() > self.max_history {
                        cluster.points.pop_front();
                    }
                    cluster.last_seen = self.frame_idx;
                }
                None => self
                    .clusters
                    .push(Cluster::new(det.shape.clone(), point, self.frame_idx)),
            }
        }

        let (frame_idx, max_history) = (self.frame_idx, self.max_history as u64);
        self.clusters
            .retain(|c| frame_idx - c.last_seen <= max_history);
    }

    pub fn get_valid_clusters(&self, min_confirmations: usize) -> impl Iterator<Item = &Cluster> {
        self.clusters
            .iter()
            .filter(move |c| c.confirmation_count() >= min_confirmations)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn frame_idx(&self) -> u64 {
        self.frame_idx
    }

    pub fn reset(&mut self) {
        self.clusters.clear();
        self.frame_idx = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;

    fn det(shape: &str, cx: f32, cy: f32) -> Detection {
        Detection {
            shape: shape.to_string(),
            cx,
            cy,
            area: 200.0,
            angle: 15.0,
            width: 20.0,
            height: 14.0,
        }
    }

    fn tracker() -> ClusterTracker {
        let cfg = CanvasConfig::default();
        ClusterTracker::new(&cfg.clusters, cfg.matching.area_threshold)
    }

    #[test]
    fn nearby_detections_share_a_cluster() {
        let mut t = tracker();
        t.update(&[det("boat", 10.0, 10.0)]);
        t.update(&[det("boat", 11.5, 9.0)]);
        assert_eq!(t.clusters().len(), 1);
        assert_eq!(t.clusters()[0].confirmation_count(), 2);

        t.update(&[det("boat", 20.0, 10.0)]);
        assert_eq!(t.clusters().len(), 2);
        t.update(&[det("kite", 10.0, 10.0)]);
        assert_eq!(t.clusters().len(), 3);
    }

    #[test]
    fn history_is_capped() {
        let mut t = tracker();
        for _ in 0..25 {
            t.update(&[det("boat", 10.0, 10.0)]);
        }
        assert_eq!(t.clusters().len(), 1);
        assert_eq!(t.clusters()[0].confirmation_count(), 10);
        assert_eq!(t.get_valid_clusters(10).count(), 1);
        assert_eq!(t.get_valid_clusters(11).count(), 0);
    }

    #[test]
    fn stale_clusters_are_purged() {
        let mut t = tracker();
        t.update(&[det("boat", 10.0, 10.0)]);
        for _ in 0..10 {
            t.update(&[]);
        }
        assert_eq!(t.clusters().len(), 1);
        t.update(&[]);
        assert!(t.clusters().is_empty());
    }

    #[test]
    fn large_detections_lose_orientation() {
        let mut t = tracker();
        let mut big = det("fond_sea", 50.0, 50.0);
        big.area = 5000.0;
        t.update(&[big, det("boat", 10.0, 10.0)]);
        let angles: Vec<f32> = t.clusters().iter().map(|c| c.avg_angle()).collect();
        assert_eq!(angles, vec![0.0, 15.0]);
    }
}
