//! Step detection
//!
//! Single-threshold rising-edge counter over acceleration magnitude. A step is
//! counted when the magnitude rises above the threshold while the detector is
//! disarmed; the detector rearms once the magnitude drops below it again.
//!
//! There is no hysteresis band, smoothing or minimum inter-step interval, so a
//! noisy signal hovering around the threshold can produce extra steps.

use crate::types::StepState;
use tracing::info;

/// Default step threshold in g
pub const DEFAULT_STEP_THRESHOLD_G: f64 = 1.2;

/// Rising-edge step counter
#[derive(Debug, Clone)]
pub struct StepDetector {
    threshold: f64,
    state: StepState,
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_THRESHOLD_G)
    }
}

impl StepDetector {
    /// Create a detector with the given threshold (g)
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: StepState::default(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Feed one magnitude sample and return the updated state.
    ///
    /// A magnitude exactly equal to the threshold changes nothing.
    pub fn update(&mut self, magnitude: f64) -> StepState {
        if magnitude > self.threshold && !self.state.armed {
            self.state.armed = true;
            self.state.count += 1;
            info!(steps = self.state.count, magnitude, "step detected");
        } else if magnitude < self.threshold {
            self.state.armed = false;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &mut StepDetector, samples: &[f64]) -> StepState {
        let mut state = detector.state();
        for &m in samples {
            state = detector.update(m);
        }
        state
    }

    #[test]
    fn test_two_rising_edges() {
        let mut detector = StepDetector::new(1.2);
        let state = run(&mut detector, &[0.5, 1.5, 0.5, 1.5]);
        assert_eq!(state.count, 2);
        assert!(state.armed);
    }

    #[test]
    fn test_sustained_high_counts_once() {
        let mut detector = StepDetector::default();
        let state = run(&mut detector, &[1.5, 1.6, 1.9, 1.3]);
        assert_eq!(state.count, 1);
    }

    #[test]
    fn test_equality_neither_triggers_nor_rearms() {
        let mut detector = StepDetector::new(1.2);
        assert_eq!(detector.update(1.2).count, 0);

        detector.update(1.5);
        // Dropping to exactly the threshold keeps the detector armed
        let state = detector.update(1.2);
        assert!(state.armed);
        assert_eq!(detector.update(1.5).count, 1);

        detector.update(1.0);
        assert_eq!(detector.update(1.5).count, 2);
    }

    #[test]
    fn test_count_never_decreases() {
        let mut detector = StepDetector::new(1.2);
        let samples = [0.9, 1.3, 1.1, 1.25, 1.2, 0.0, 2.0, 1.19, 1.21, 1.21, 0.3];
        let mut previous = 0;
        let mut edges = 0;
        let mut above = false;
        for &m in &samples {
            let state = detector.update(m);
            assert!(state.count >= previous);
            assert!(state.count - previous <= 1);
            if m > 1.2 && !above {
                edges += 1;
                above = true;
            } else if m < 1.2 {
                above = false;
            }
            previous = state.count;
        }
        assert_eq!(previous, edges);
    }
}
