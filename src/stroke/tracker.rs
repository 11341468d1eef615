use crate::stroke::StrokePoint;
use crate::StrokeEvent;

/// Drops raw points that duplicate strokes already emitted for the same tool.
#[derive(Clone, Copy, Debug)]
pub struct StrokeTracker {
    pub proximity_threshold: i32,
}

impl StrokeTracker {
    pub fn new(proximity_threshold: i32) -> Self {
        Self {
            proximity_threshold,
        }
    }

    pub fn update<'a>(
        &self,
        raw: &[StrokePoint],
        history: impl IntoIterator<Item = &'a StrokeEvent> + Clone,
    ) -> Vec<StrokePoint> {
        raw.iter()
            .filter(|p| !self.is_duplicate(p, history.clone()))
            .copied()
            .collect()
    }

    pub fn is_duplicate<'a>(
        &self,
        point: &StrokePoint,
        history: impl IntoIterator<Item = &'a StrokeEvent>,
    ) -> bool {
        history
            .into_iter()
            .any(|prev| prev.covers(point, self.proximity_threshold))
    }
}
