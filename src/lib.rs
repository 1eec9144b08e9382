pub mod stats;
pub mod window;
pub mod analyzer;
pub mod events;
pub mod cache;
pub mod service;
pub mod alerter;
pub mod ingest;
pub mod error;
pub mod config;

/// Common types used across modules
pub mod types {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// One telemetry observation from a device.
    ///
    /// The rolling window and anomaly logic only look at `rps`; the other
    /// gauges travel with the sample untouched.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Sample {
        pub device_id: String,
        pub timestamp: DateTime<Utc>,
        #[serde(default)]
        pub cpu: f64,
        #[serde(default)]
        pub memory: f64,
        #[serde(default)]
        pub rps: f64,
        #[serde(default)]
        pub network: f64,
    }

    impl Sample {
        /// Sample carrying only a request-rate value, stamped now.
        pub fn with_rps(device_id: impl Into<String>, rps: f64) -> Self {
            Self {
                device_id: device_id.into(),
                timestamp: Utc::now(),
                cpu: 0.0,
                memory: 0.0,
                rps,
                network: 0.0,
            }
        }
    }

    /// Snapshot of a device's rolling statistics at one point in time
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AnalyticsResult {
        pub timestamp: DateTime<Utc>,
        pub device_id: String,
        pub rolling_average: f64,
        pub std_dev: f64,
        pub z_score: f64,
        pub is_anomaly: bool,
        pub current_value: f64,
    }

    impl AnalyticsResult {
        /// Zero-valued result for a device nothing is known about.
        pub fn empty(device_id: &str) -> Self {
            Self {
                timestamp: Utc::now(),
                device_id: device_id.to_string(),
                rolling_average: 0.0,
                std_dev: 0.0,
                z_score: 0.0,
                is_anomaly: false,
                current_value: 0.0,
            }
        }
    }

    /// An anomalous result handed to the event bus.
    ///
    /// Owns its own copy of the result, so it stays valid after the
    /// originating computation is gone.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct AnomalyEvent {
        pub result: AnalyticsResult,
    }

    impl AnomalyEvent {
        /// Returns `None` unless the result is flagged anomalous.
        pub fn from_result(result: &AnalyticsResult) -> Option<Self> {
            result.is_anomaly.then(|| Self { result: result.clone() })
        }

        pub fn device_id(&self) -> &str {
            &self.result.device_id
        }
    }

    /// Aggregate view over every known device
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Summary {
        pub total_devices: usize,
        pub total_metrics: usize,
        pub anomaly_count: usize,
        pub window_size: usize,
        pub threshold: f64,
    }
}
