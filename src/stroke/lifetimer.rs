use std::collections::BTreeMap;

/// Ages dynamic strokes; strokes not redetected for `max_age` frames expire.
#[derive(Debug)]
pub struct StrokeLifeTimer {
    max_age: u32,
    ages: BTreeMap<String, u32>,
}

impl StrokeLifeTimer {
    pub fn new(max_age: u32) -> Self {
        Self {
            max_age: max_age.max(1),
            ages: BTreeMap::new(),
        }
    }

    /// Start aging a newly created stroke.
    pub fn track(&mut self, id: &str) {
        self.ages.insert(id.to_string(), self.max_age);
    }

    /// Stop aging a stroke (it became persistent or was removed elsewhere).
    pub fn forget(&mut self, id: &str) -> bool {
        self.ages.remove(id).is_some()
    }

    /// Refresh `active` ids, age the rest and return the ids that expired.
    pub fn update(&mut self, active: &[String]) -> Vec<String> {
        for id in active {
            self.ages.insert(id.clone(), self.max_age);
        }
        let mut expired = Vec::new();
        self.ages.retain(|id, age| {
            if active.contains(id) {
                return true;
            }
            *age = age.saturating_sub(1);
            if *age == 0 {
                expired.push(id.clone());
                return false;
            }
            true
        });
        expired
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ages.contains_key(id)
    }

    pub fn age(&self, id: &str) -> Option<u32> {
        self.ages.get(id).copied()
    }

    pub fn clear(&mut self) {
        self.ages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_stroke_expires_after_max_age() {
        let mut timer = StrokeLifeTimer::new(3);
        timer.track("s1");
        assert!(timer.update(&[]).is_empty());
        assert!(timer.update(&[]).is_empty());
        assert_eq!(timer.update(&[]), vec!["s1".to_string()]);
        assert!(!timer.contains("s1"));
    }

    #[test]
    fn redetection_resets_age() {
        let mut timer = StrokeLifeTimer::new(3);
        timer.track("s1");
        timer.update(&[]);
        timer.update(&[]);
        timer.update(&["s1".to_string()]);
        assert_eq!(timer.age("s1"), Some(3));
        assert!(timer.update(&[]).is_empty());
    }

    #[test]
    fn forgotten_strokes_never_expire() {
        let mut timer = StrokeLifeTimer::new(1);
        timer.track("s1");
        assert!(timer.forget("s1"));
        assert!(timer.update(&[]).is_empty());
    }
}
