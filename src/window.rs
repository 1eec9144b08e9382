use std::collections::{HashMap, VecDeque};

use crate::types::Sample;

/// Per-device bounded sample windows.
///
/// Not synchronised: the owner (`AnalyticsService`) wraps it in a lock and is
/// the only party that ever touches it.
pub struct WindowStore {
    windows: HashMap<String, VecDeque<Sample>>,
    capacity: usize,
}

impl WindowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample to its device's window, evicting the oldest entry
    /// when over capacity. Returns the post-eviction request-rate values in
    /// chronological order.
    pub fn append(&mut self, sample: Sample) -> Vec<f64> {
        let capacity = self.capacity;
        let window = self
            .windows
            .entry(sample.device_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity.min(1024)));
        window.push_back(sample);
        if window.len() > capacity {
            window.pop_front();
        }
        rps_values(window)
    }

    /// Current request-rate values for a device, oldest first.
    /// `None` if the device has never been seen.
    pub fn values(&self, device_id: &str) -> Option<Vec<f64>> {
        self.windows.get(device_id).map(rps_values)
    }

    /// Most recent sample for a device
    pub fn latest(&self, device_id: &str) -> Option<&Sample> {
        self.windows.get(device_id)?.back()
    }

    pub fn device_count(&self) -> usize {
        self.windows.len()
    }

    /// Total samples buffered across every device
    pub fn sample_count(&self) -> usize {
        self.windows.values().map(VecDeque::len).sum()
    }

    /// Iterate `(device_id, values)` for every known device.
    pub fn iter_values(&self) -> impl Iterator<Item = (&str, Vec<f64>)> + '_ {
        self.windows
            .iter()
            .map(|(id, window)| (id.as_str(), rps_values(window)))
    }
}

fn rps_values(window: &VecDeque<Sample>) -> Vec<f64> {
    window.iter().map(|s| s.rps).collect()
}
