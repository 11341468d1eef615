use crate::frame::{ensure_same_size, DepthFrame};
use crate::CanvasError;

/// Mean of the first `n_profile` frames, computed once until `reset`.
#[derive(Debug)]
pub struct BaselineCalculator {
    n_profile: usize,
    sum: Option<(u32, u32, Vec<u64>)>,
    count: usize,
    baseline: Option<DepthFrame>,
}

impl BaselineCalculator {
    pub fn new(n_profile: usize) -> Self {
        Self {
            n_profile: n_profile.max(1),
            sum: None,
            count: 0,
            baseline: None,
        }
    }

    /// Accumulate one frame. Returns `true` once the baseline is available.
    pub fn update(&mut self, frame: &DepthFrame) -> Result<bool, CanvasError> {
        if self.baseline.is_some() {
            return Ok(true);
        }
        let (width, height) = frame.dimensions();
        let (w, h, sum) = self
            .sum
            .get_or_insert_with(|| (width, height, vec![0u64; (width * height) as usize]));
        if (*w, *h) != (width, height) {
            return Err(CanvasError::FrameSizeMismatch {
                expected: (*w, *h),
                actual: (width, height),
            });
        }
        for (acc, px) in sum.iter_mut().zip(frame.as_raw()) {
            *acc += *px as u64;
        }
        self.count += 1;
        log::debug!("baseline: accumulated frame {}/{}", self.count, self.n_profile);

        if self.count >= self.n_profile {
            if let Some((w, h, sum)) = self.sum.take() {
                let n = self.count as u64;
                let mean: Vec<u16> = sum.iter().map(|v| (v / n) as u16).collect();
                self.baseline = DepthFrame::from_raw(w, h, mean);
                log::info!("baseline computed after {} frames", self.count);
            }
        }
        Ok(self.baseline.is_some())
    }

    pub fn baseline(&self) -> Result<&DepthFrame, CanvasError> {
        self.baseline.as_ref().ok_or(CanvasError::BaselineNotReady {
            collected: self.count,
            required: self.n_profile,
        })
    }

    /// Return the baseline if ready, otherwise feed `frame` and report progress.
    pub fn ensure_ready(&mut self, frame: &DepthFrame) -> Result<&DepthFrame, CanvasError> {
        if self.baseline.is_none() {
            self.update(frame)?;
        }
        self.baseline()
    }

    pub fn is_ready(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn collected(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = None;
        self.count = 0;
        self.baseline = None;
    }

    /// Check a frame against the computed baseline's dimensions.
    pub fn check_frame(&self, frame: &DepthFrame) -> Result<(), CanvasError> {
        match &self.baseline {
            Some(baseline) => ensure_same_size(baseline, frame),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::flat_frame;

    #[test]
    fn baseline_is_elementwise_mean() {
        let mut calc = BaselineCalculator::new(3);
        assert!(!calc.update(&flat_frame(4, 3, 1000)).unwrap());
        assert!(!calc.update(&flat_frame(4, 3, 1003)).unwrap());
        assert!(calc.update(&flat_frame(4, 3, 1008)).unwrap());
        let baseline = calc.baseline().unwrap();
        assert!(baseline.pixels().all(|p| p[0] == 1003));
    }

    #[test]
    fn updates_after_ready_are_ignored() {
        let mut calc = BaselineCalculator::new(2);
        calc.update(&flat_frame(2, 2, 500)).unwrap();
        calc.update(&flat_frame(2, 2, 500)).unwrap();
        calc.update(&flat_frame(2, 2, 9000)).unwrap();
        assert_eq!(calc.baseline().unwrap().get_pixel(0, 0)[0], 500);
        assert_eq!(calc.collected(), 2);
    }

    #[test]
    fn not_ready_until_n_profile() {
        let mut calc = BaselineCalculator::new(10);
        calc.update(&flat_frame(2, 2, 500)).unwrap();
        assert_eq!(
            calc.baseline().unwrap_err(),
            CanvasError::BaselineNotReady {
                collected: 1,
                required: 10
            }
        );
        calc.reset();
        assert_eq!(calc.collected(), 0);
        assert!(!calc.is_ready());
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let mut calc = BaselineCalculator::new(3);
        calc.update(&flat_frame(4, 4, 500)).unwrap();
        assert!(matches!(
            calc.update(&flat_frame(5, 4, 500)),
            Err(CanvasError::FrameSizeMismatch { .. })
        ));
    }
}
