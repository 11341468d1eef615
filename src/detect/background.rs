use crate::config::BackgroundSettings;
use crate::fresh_id;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackgroundChange {
    Placed { id: String, shape: String },
    Removed { id: String, shape: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Confirmed {
    id: String,
    shape: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Candidate {
    shape: String,
    count: u32,
}

/// Hysteresis over the dominant background scene.
///
/// A shape is confirmed after `min_confirm_frames` consecutive sightings and retracted
/// after `min_remove_frames` consecutive empty frames. A different shape replaces the
/// confirmed one only after its own run of `min_confirm_frames`.
#[derive(Debug)]
pub struct BackgroundTracker {
    min_confirm_frames: u32,
    min_remove_frames: u32,
    confirmed: Option<Confirmed>,
    candidate: Option<Candidate>,
    empty_count: u32,
}

impl BackgroundTracker {
    pub fn new(settings: &BackgroundSettings) -> Self {
        Self {
            min_confirm_frames: settings.min_confirm_frames.max(1),
            min_remove_frames: settings.min_remove_frames.max(1),
            confirmed: None,
            candidate: None,
            empty_count: 0,
        }
    }

    /// Feed the top classified shape of one frame (or `None`).
    ///
    /// Seeing the confirmed shape again resets the empty count and also drops any
    /// competing candidate, so a replacement needs an uninterrupted run.
    pub fn update(&mut self, shape: Option<&str>) -> Vec<BackgroundChange> {
        let Some(shape) = shape else {
            return self.observe_empty();
        };
        self.empty_count = 0;

        if let Some(current) = &self.confirmed {
            if current.shape == shape {
                self.candidate = None;
                return Vec::new();
            }
        }

        let count = match &mut self.candidate {
            Some(candidate) if candidate.shape == shape => {
                candidate.count += 1;
                candidate.count
            }
            _ => {
                self.candidate = Some(Candidate {
                    shape: shape.to_string(),
                    count: 1,
                });
                1
            }
        };
        if count < self.min_confirm_frames {
            return Vec::new();
        }

        self.candidate = None;
        let mut changes = Vec::with_capacity(2);
        if let Some(old) = self.confirmed.take() {
            log::info!("background: '{}' ({}) replaced by '{}'", old.shape, old.id, shape);
            changes.push(BackgroundChange::Removed {
                id: old.id,
                shape: old.shape,
            });
        }
        let id = fresh_id();
        log::info!("background: '{}' confirmed as {}", shape, id);
        self.confirmed = Some(Confirmed {
            id: id.clone(),
            shape: shape.to_string(),
        });
        changes.push(BackgroundChange::Placed {
            id,
            shape: shape.to_string(),
        });
        changes
    }

    fn observe_empty(&mut self) -> Vec<BackgroundChange> {
        self.empty_count += 1;
        self.candidate = None;
        if self.confirmed.is_none() || self.empty_count < self.min_remove_frames {
            return Vec::new();
        }
        self.empty_count = 0;
        match self.confirmed.take() {
            Some(old) => {
                log::info!("background: '{}' ({}) removed", old.shape, old.id);
                vec![BackgroundChange::Removed {
                    id: old.id,
                    shape: old.shape,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Confirmed background as `(id, shape)`.
    pub fn confirmed(&self) -> Option<(&str, &str)> {
        self.confirmed
            .as_ref()
            .map(|c| (c.id.as_str(), c.shape.as_str()))
    }

    /// Drop the confirmed background if it carries `id` (removed by other means).
    pub fn forget(&mut self, id: &str) -> bool {
        if self.confirmed.as_ref().map_or(false, |c| c.id == id) {
            self.confirmed = None;
            self.candidate = None;
            self.empty_count = 0;
            return true;
        }
        false
    }

    /// Clear all state, returning a removal for the confirmed background if any.
    pub fn reset(&mut self) -> Option<BackgroundChange> {
        self.candidate = None;
        self.empty_count = 0;
        self.confirmed.take().map(|old| BackgroundChange::Removed {
            id: old.id,
            shape: old.shape,
        })
    }
}
