use crate::stats;
use super::Decision;

/// Z-score based anomaly detection.
/// Flags a value whose distance from the window mean exceeds a fixed number
/// of sample standard deviations.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    threshold: f64,
}

impl AnomalyDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Measure `current` against `window`. The window is expected to
    /// already contain `current` as its latest element.
    ///
    /// A window without spread is never anomalous, whatever the threshold.
    pub fn decide(&self, current: f64, window: &[f64]) -> Decision {
        let mean = stats::mean(window);
        let stddev = stats::stddev(window, mean);
        let zscore = stats::zscore(current, mean, stddev);

        Decision {
            mean,
            stddev,
            zscore,
            is_anomaly: stddev > 0.0 && zscore.abs() > self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_sample_is_never_anomalous() {
        for threshold in [0.0, -1.0, f64::NEG_INFINITY] {
            let d = AnomalyDetector::new(threshold).decide(1e9, &[1e9]);
            assert_eq!(d.stddev, 0.0);
            assert_eq!(d.zscore, 0.0);
            assert!(!d.is_anomaly, "flagged with threshold {threshold}");
        }
    }

    #[test]
    fn flat_window_ignores_negative_threshold() {
        let d = AnomalyDetector::new(-1.0).decide(5.0, &[5.0, 5.0, 5.0]);
        assert!(!d.is_anomaly);
    }

    #[test]
    fn flat_window_is_never_anomalous() {
        let detector = AnomalyDetector::new(2.0);
        let d = detector.decide(10.0, &[10.0, 10.0]);
        assert_eq!(d.mean, 10.0);
        assert!(!d.is_anomaly);
    }

    #[test]
    fn spike_exceeds_threshold() {
        let detector = AnomalyDetector::new(2.0);
        let mut window = vec![100.0, 101.0, 99.0, 100.0, 102.0, 98.0, 100.0, 101.0, 99.0, 100.0];
        window.push(500.0);
        let d = detector.decide(500.0, &window);
        assert!(d.zscore > 2.0, "z = {}", d.zscore);
        assert!(d.is_anomaly);
    }

    #[test]
    fn threshold_is_strict() {
        // mean 5, sample stddev ~2.1381, z(9) ~1.871
        let window = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(AnomalyDetector::new(1.8).decide(9.0, &window).is_anomaly);
        assert!(!AnomalyDetector::new(1.9).decide(9.0, &window).is_anomaly);
    }
}
