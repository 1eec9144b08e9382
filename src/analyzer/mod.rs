pub mod zscore;

use serde::{Deserialize, Serialize};

pub use zscore::AnomalyDetector;

/// Statistics of a value measured against its window, plus the verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub mean: f64,
    pub stddev: f64,
    pub zscore: f64,
    pub is_anomaly: bool,
}

/// Anomaly severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warn,
    Critical,
}

impl Severity {
    /// `Critical` once `|z|` exceeds `threshold * critical_multiplier`.
    pub fn classify(zscore: f64, threshold: f64, critical_multiplier: f64) -> Self {
        if zscore.abs() > threshold * critical_multiplier {
            Severity::Critical
        } else {
            Severity::Warn
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warn => write!(f, "WARN"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_escalates_past_multiplier() {
        assert_eq!(Severity::classify(2.5, 2.0, 2.0), Severity::Warn);
        assert_eq!(Severity::classify(-4.1, 2.0, 2.0), Severity::Critical);
        assert_eq!(Severity::classify(4.0, 2.0, 2.0), Severity::Warn);
    }
}
