pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::analyzer::Severity;
use crate::config::AlertingConfig;
use crate::events::AnomalySubscription;
use crate::types::AnomalyEvent;

/// An anomaly alert ready for delivery
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub device_id: String,
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub message: String,
    pub instance: String,
}

/// Trait for alert delivery sinks
#[async_trait]
pub trait AnomalySink: Send + Sync {
    /// Sink name
    fn name(&self) -> &str;

    /// Deliver a single alert
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the process log
pub struct LogSink;

#[async_trait]
impl AnomalySink for LogSink {
    fn name(&self) -> &str { "log" }

    async fn send(&self, alert: &Alert) -> Result<()> {
        tracing::warn!(
            severity = %alert.severity,
            device_id = %alert.device_id,
            z_score = alert.z_score,
            "{}", alert.message
        );
        Ok(())
    }
}

/// What happened to an event handed to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Deduplicated,
    RateLimited,
}

/// Consumes anomaly events, applying de-duplication and rate limiting
/// before fanning out to every sink.
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AnomalySink>>,
    dedup_map: HashMap<DeduplicationKey, DedupEntry>,
    dedup_window: Duration,
    rate_limiter: RateLimiter,
    threshold: f64,
    critical_multiplier: f64,
    instance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeduplicationKey {
    device_id: String,
    severity: Severity,
}

struct DedupEntry {
    last_sent: Instant,
    count: u32,
}

struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(per_minute: u32) -> Self {
        Self {
            tokens: per_minute as f64,
            max_tokens: per_minute as f64,
            refill_rate: per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl AlertDispatcher {
    /// Build a dispatcher with the log sink plus any configured webhook.
    pub fn new(config: &AlertingConfig, threshold: f64, instance: &str) -> Result<Self> {
        let mut sinks: Vec<Box<dyn AnomalySink>> = vec![Box::new(LogSink)];

        if let Some(ref wc) = config.webhook {
            if wc.enabled {
                sinks.push(Box::new(webhook::WebhookSink::new(wc)?));
            }
        }

        tracing::info!(sinks = sinks.len(), "Initialized anomaly sinks");
        Ok(Self::with_sinks(config, threshold, instance, sinks))
    }

    pub fn with_sinks(
        config: &AlertingConfig,
        threshold: f64,
        instance: &str,
        sinks: Vec<Box<dyn AnomalySink>>,
    ) -> Self {
        Self {
            sinks,
            dedup_map: HashMap::new(),
            dedup_window: Duration::from_secs(config.dedup_window_secs),
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            threshold,
            critical_multiplier: config.critical_multiplier,
            instance: instance.to_string(),
        }
    }

    /// Drain the subscription until every bus handle is dropped.
    pub async fn run(mut self, mut subscription: AnomalySubscription) {
        while let Some(event) = subscription.recv().await {
            self.dispatch(event).await;
        }
        tracing::debug!("Anomaly subscription closed");
    }

    pub async fn dispatch(&mut self, event: AnomalyEvent) -> DispatchOutcome {
        let alert = self.build_alert(event);
        let key = DeduplicationKey {
            device_id: alert.device_id.clone(),
            severity: alert.severity,
        };

        if let Some(entry) = self.dedup_map.get_mut(&key) {
            if entry.last_sent.elapsed() < self.dedup_window {
                entry.count += 1;
                tracing::debug!(device_id = %alert.device_id, count = entry.count, "Alert deduplicated");
                return DispatchOutcome::Deduplicated;
            }
        }

        // Critical alerts bypass the rate limit
        if alert.severity < Severity::Critical && !self.rate_limiter.try_acquire() {
            tracing::warn!(device_id = %alert.device_id, "Alert rate limited");
            return DispatchOutcome::RateLimited;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.send(&alert).await {
                tracing::error!(sink = sink.name(), error = %e, "Failed to send alert");
            }
        }

        self.dedup_map.insert(key, DedupEntry {
            last_sent: Instant::now(),
            count: 1,
        });

        DispatchOutcome::Sent
    }

    fn build_alert(&self, event: AnomalyEvent) -> Alert {
        let r = event.result;
        let severity = Severity::classify(r.z_score, self.threshold, self.critical_multiplier);
        Alert {
            message: format!(
                "{} rps anomaly: z-score={:.2} (value={:.1}, mean={:.1}, stddev={:.1})",
                r.device_id, r.z_score, r.current_value, r.rolling_average, r.std_dev
            ),
            timestamp: r.timestamp,
            severity,
            device_id: r.device_id,
            value: r.current_value,
            mean: r.rolling_average,
            std_dev: r.std_dev,
            z_score: r.z_score,
            instance: self.instance.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::types::AnalyticsResult;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<Alert>>>,
    }

    #[async_trait]
    impl AnomalySink for RecordingSink {
        fn name(&self) -> &str { "recording" }

        async fn send(&self, alert: &Alert) -> Result<()> {
            self.seen.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AnomalySink for FailingSink {
        fn name(&self) -> &str { "failing" }

        async fn send(&self, _alert: &Alert) -> Result<()> {
            anyhow::bail!("endpoint returned 503")
        }
    }

    fn event(device: &str, z: f64) -> AnomalyEvent {
        let mut r = AnalyticsResult::empty(device);
        r.z_score = z;
        r.is_anomaly = true;
        AnomalyEvent::from_result(&r).unwrap()
    }

    fn dispatcher(config: AlertingConfig, sink: &RecordingSink) -> AlertDispatcher {
        AlertDispatcher::with_sinks(&config, 2.0, "test", vec![
            Box::new(sink.clone()) as Box<dyn AnomalySink>,
            Box::new(FailingSink),
        ])
    }

    #[tokio::test]
    async fn repeated_device_alerts_are_deduplicated() {
        let sink = RecordingSink::default();
        let mut d = dispatcher(AlertingConfig::default(), &sink);

        assert_eq!(d.dispatch(event("a", 2.5)).await, DispatchOutcome::Sent);
        assert_eq!(d.dispatch(event("a", 2.6)).await, DispatchOutcome::Deduplicated);
        assert_eq!(d.dispatch(event("b", 2.5)).await, DispatchOutcome::Sent);
        // escalation is a distinct key
        assert_eq!(d.dispatch(event("a", 9.0)).await, DispatchOutcome::Sent);

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn critical_alerts_bypass_rate_limit() {
        let sink = RecordingSink::default();
        let config = AlertingConfig {
            rate_limit_per_minute: 0,
            ..AlertingConfig::default()
        };
        let mut d = dispatcher(config, &sink);

        assert_eq!(d.dispatch(event("a", 2.5)).await, DispatchOutcome::RateLimited);
        assert_eq!(d.dispatch(event("a", -5.0)).await, DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn run_drains_until_bus_closes() {
        let sink = RecordingSink::default();
        let d = dispatcher(AlertingConfig::default(), &sink);
        let (bus, sub) = EventBus::new(8);
        assert!(bus.emit(event("a", 3.0)));
        assert!(bus.emit(event("b", 3.0)));
        drop(bus);

        d.run(sub).await;
        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }
}
