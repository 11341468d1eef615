use crate::stroke::{within, StrokePoint};

#[derive(Clone, Debug)]
struct Candidate {
    id: u64,
    point: StrokePoint,
    count: u32,
}

/// Emits stroke points only after they reappear in `min_confirm` consecutive frames.
///
/// Each raw point is matched to the nearest candidate of the previous frame (per-axis
/// proximity); the candidate takes the new position and its count grows. Candidates not
/// matched in the current frame are dropped.
#[derive(Debug)]
pub struct StrokeConfirmTracker {
    proximity_threshold: i32,
    min_confirm: u32,
    candidates: Vec<Candidate>,
    next_id: u64,
}

impl StrokeConfirmTracker {
    pub fn new(proximity_threshold: i32, min_confirm: u32) -> Self {
        Self {
            proximity_threshold,
            min_confirm: min_confirm.max(1),
            candidates: Vec::new(),
            next_id: 0,
        }
    }

    pub fn update(&mut self, raw: &[StrokePoint]) -> Vec<StrokePoint> {
        let mut next: Vec<Candidate> = Vec::with_capacity(raw.len());
        for point in raw {
            let nearest = self
                .candidates
                .iter()
                .filter(|c| {
                    c.point.tool == point.tool
                        && within(c.point.x, c.point.y, point.x, point.y, self.proximity_threshold)
                })
                .min_by_key(|c| {
                    let (dx, dy) = (c.point.x - point.x, c.point.y - point.y);
                    dx * dx + dy * dy
                });
            match nearest {
                Some(prev) => {
                    let updated = Candidate {
                        id: prev.id,
                        point: *point,
                        count: prev.count + 1,
                    };
                    // A later point matching the same candidate replaces the earlier one.
                    match next.iter_mut().find(|c| c.id == prev.id) {
                        Some(slot) => *slot = updated,
                        None => next.push(updated),
                    }
                }
                None => {
                    self.next_id += 1;
                    next.push(Candidate {
                        id: self.next_id,
                        point: *point,
                        count: 1,
                    });
                }
            }
        }
        self.candidates = next;
        self.candidates
            .iter()
            .filter(|c| c.count >= self.min_confirm)
            .map(|c| c.point)
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.candidates.len()
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
    }
}
