use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::analyzer::{AnomalyDetector, Decision};
use crate::cache::CacheGateway;
use crate::config::{AnalyticsConfig, CacheConfig, CacheWritePolicy};
use crate::error::{AnalyticsError, CacheError};
use crate::events::EventBus;
use crate::stats;
use crate::types::{AnalyticsResult, AnomalyEvent, Sample, Summary};
use crate::window::WindowStore;

/// Streaming analytics orchestrator.
///
/// Owns every device window behind a single `RwLock`: `process_sample` takes
/// it exclusively, the read paths share it. The cache and the event bus are
/// best-effort side channels; neither can make an operation fail.
pub struct AnalyticsService {
    windows: RwLock<WindowStore>,
    detector: AnomalyDetector,
    smoothing_alpha: f64,
    cache: Arc<dyn CacheGateway>,
    cache_ttl: Duration,
    key_prefix: String,
    write_policy: CacheWritePolicy,
    events: EventBus,
    corrupt_cache_reads: AtomicU64,
}

impl AnalyticsService {
    pub fn new(
        analytics: &AnalyticsConfig,
        cache_config: &CacheConfig,
        cache: Arc<dyn CacheGateway>,
        events: EventBus,
    ) -> Self {
        info!(
            window_size = analytics.window_size,
            threshold = analytics.zscore_threshold,
            cache = cache.name(),
            write_policy = ?cache_config.write_policy,
            "Initialized analytics service"
        );
        Self {
            windows: RwLock::new(WindowStore::new(analytics.window_size)),
            detector: AnomalyDetector::new(analytics.zscore_threshold),
            smoothing_alpha: analytics.smoothing_alpha,
            cache,
            cache_ttl: cache_config.ttl(),
            key_prefix: cache_config.key_prefix.clone(),
            write_policy: cache_config.write_policy,
            events,
            corrupt_cache_reads: AtomicU64::new(0),
        }
    }

    /// Ingest one sample and return the freshly computed result.
    ///
    /// A missing device id or a NaN/infinite rate is rejected before
    /// anything is mutated.
    pub async fn process_sample(&self, sample: Sample) -> Result<AnalyticsResult, AnalyticsError> {
        if sample.device_id.trim().is_empty() {
            return Err(AnalyticsError::MissingDeviceId);
        }
        if !sample.rps.is_finite() {
            return Err(AnalyticsError::NonFiniteValue);
        }

        let device_id = sample.device_id.clone();
        let current = sample.rps;

        let mut windows = self.windows.write().await;
        let values = windows.append(sample);
        let decision = self.detector.decide(current, &values);
        let result = build_result(device_id, current, decision);

        match self.write_policy {
            CacheWritePolicy::UnderLock => {
                self.write_through(&result).await;
                drop(windows);
            }
            CacheWritePolicy::AfterUnlock => {
                drop(windows);
                self.write_through(&result).await;
            }
        }

        if let Some(event) = AnomalyEvent::from_result(&result) {
            if self.events.emit(event) {
                info!(
                    device_id = %result.device_id,
                    z_score = result.z_score,
                    value = result.current_value,
                    "Anomaly detected"
                );
            }
        }

        Ok(result)
    }

    /// Cache-aside read of the latest result for a device.
    ///
    /// A cached entry is returned as-is. Misses, unreadable entries and
    /// cache outages all fall through to a recompute from the live window.
    /// Unknown devices get a zero-valued result.
    pub async fn get_analytics(&self, device_id: &str) -> AnalyticsResult {
        let key = self.cache_key(device_id);
        match self.cache.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<AnalyticsResult>(&payload)
                .map_err(CacheError::Decode)
            {
                Ok(cached) => return cached,
                Err(e) => {
                    self.corrupt_cache_reads.fetch_add(1, Ordering::Relaxed);
                    warn!(%key, error = %e, "Corrupt cache entry, recomputing");
                }
            },
            Ok(None) => debug!(%key, "Cache miss"),
            Err(e) => warn!(%key, error = %e, "Cache read failed, recomputing"),
        }

        let windows = self.windows.read().await;
        match windows.values(device_id) {
            Some(values) if !values.is_empty() => {
                let current = values[values.len() - 1];
                let decision = self.detector.decide(current, &values);
                build_result(device_id.to_string(), current, decision)
            }
            _ => AnalyticsResult::empty(device_id),
        }
    }

    /// Recompute every device's latest verdict and aggregate.
    pub async fn get_summary(&self) -> Summary {
        let windows = self.windows.read().await;

        let anomaly_count = windows
            .iter_values()
            .filter(|(_, values)| match values.last() {
                Some(&latest) => self.detector.decide(latest, values).is_anomaly,
                None => false,
            })
            .count();

        Summary {
            total_devices: windows.device_count(),
            total_metrics: windows.sample_count(),
            anomaly_count,
            window_size: windows.capacity(),
            threshold: self.detector.threshold(),
        }
    }

    /// Current window contents for a device, oldest first.
    pub async fn window(&self, device_id: &str) -> Vec<f64> {
        self.windows
            .read()
            .await
            .values(device_id)
            .unwrap_or_default()
    }

    /// Exponentially smoothed view of a device's window using the
    /// configured alpha.
    pub async fn smoothed(&self, device_id: &str) -> Vec<f64> {
        stats::exponential_smoothing(&self.window(device_id).await, self.smoothing_alpha)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Number of cache reads that found an entry that would not decode
    pub fn corrupt_cache_reads(&self) -> u64 {
        self.corrupt_cache_reads.load(Ordering::Relaxed)
    }

    fn cache_key(&self, device_id: &str) -> String {
        format!("{}{}", self.key_prefix, device_id)
    }

    async fn write_through(&self, result: &AnalyticsResult) {
        let key = self.cache_key(&result.device_id);
        let payload = match serde_json::to_string(result).map_err(CacheError::Encode) {
            Ok(p) => p,
            Err(e) => {
                error!(%key, error = %e, "Skipping cache write");
                return;
            }
        };
        if let Err(e) = self.cache.set(&key, payload, self.cache_ttl).await {
            error!(%key, cache = self.cache.name(), error = %e, "Failed to cache analytics result");
        }
    }
}

fn build_result(device_id: String, current: f64, decision: Decision) -> AnalyticsResult {
    AnalyticsResult {
        timestamp: Utc::now(),
        device_id,
        rolling_average: decision.mean,
        std_dev: decision.stddev,
        z_score: decision.zscore,
        is_anomaly: decision.is_anomaly,
        current_value: current,
    }
}
