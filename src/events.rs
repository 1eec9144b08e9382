use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::types::AnomalyEvent;

/// Bounded, lossy anomaly notification channel.
///
/// `emit` never waits: when the queue is full the event is dropped and the
/// caller is told so. Cloning shares the same queue and counters.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<AnomalyEvent>,
    counters: Arc<BusCounters>,
}

#[derive(Default)]
struct BusCounters {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

/// Consumer side of the bus
pub struct AnomalySubscription {
    rx: mpsc::Receiver<AnomalyEvent>,
}

impl EventBus {
    /// Create a bus holding at most `capacity` undelivered events.
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> (Self, AnomalySubscription) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            tx,
            counters: Arc::new(BusCounters::default()),
        };
        (bus, AnomalySubscription { rx })
    }

    /// Offer an event without blocking. Returns whether it was enqueued.
    pub fn emit(&self, event: AnomalyEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(device_id = %event.device_id(), "Anomaly queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(device_id = %event.device_id(), "No anomaly subscriber, event dropped");
                false
            }
        }
    }

    pub fn emitted(&self) -> u64 {
        self.counters.emitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl AnomalySubscription {
    /// Wait for the next event. `None` once every bus handle is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<AnomalyEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is queued.
    pub fn try_recv(&mut self) -> Option<AnomalyEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalyticsResult;
    use std::time::{Duration, Instant};

    fn event(device: &str) -> AnomalyEvent {
        let mut result = AnalyticsResult::empty(device);
        result.is_anomaly = true;
        result.z_score = 5.0;
        AnomalyEvent::from_result(&result).unwrap()
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (bus, mut sub) = EventBus::new(100);
        for i in 0..100 {
            assert!(bus.emit(event(&format!("d{i}"))));
        }

        let started = Instant::now();
        assert!(!bus.emit(event("overflow")));
        assert!(started.elapsed() < Duration::from_millis(50));

        assert_eq!(bus.emitted(), 100);
        assert_eq!(bus.dropped(), 1);

        // the first hundred are still delivered in order
        assert_eq!(sub.recv().await.unwrap().device_id(), "d0");
    }

    #[tokio::test]
    async fn subscription_ends_when_bus_dropped() {
        let (bus, mut sub) = EventBus::new(4);
        assert!(bus.emit(event("a")));
        drop(bus);
        assert_eq!(sub.recv().await.map(|e| e.result.device_id), Some("a".to_string()));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn emit_after_subscriber_gone_reports_undelivered() {
        let (bus, sub) = EventBus::new(4);
        drop(sub);
        assert!(!bus.emit(event("a")));
        assert_eq!(bus.dropped(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (bus, mut sub) = EventBus::new(0);
        assert_eq!(bus.capacity(), 1);
        assert!(bus.emit(event("a")));
        assert!(!bus.emit(event("b")));
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn only_anomalies_become_events() {
        let result = AnalyticsResult::empty("quiet");
        assert!(AnomalyEvent::from_result(&result).is_none());
    }
}
