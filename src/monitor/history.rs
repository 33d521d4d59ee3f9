//! Rolling per-device sample history
//!
//! Each device keeps at most `capacity` samples and none older than
//! `retention`. Both limits are applied on every append, count first, and
//! always evict from the oldest end. [`HistoryStore::prune`] applies the age
//! limit to devices that are no longer being sampled.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One sweep's result for one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub timestamp: DateTime<Utc>,
    pub latency: Option<f64>,
    pub online: bool,
}

impl HistorySample {
    pub fn new(timestamp: DateTime<Utc>, latency: Option<f64>) -> Self {
        Self {
            timestamp,
            latency,
            online: latency.is_some(),
        }
    }
}

/// Uptime over the retained history of one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UptimeSummary {
    /// Percentage of online samples, rounded to one decimal
    pub uptime_percent: f64,
    pub sample_count: usize,
}

/// Round to one decimal place.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    samples: BTreeMap<String, VecDeque<HistorySample>>,
    capacity: usize,
    retention: TimeDelta,
}

impl HistoryStore {
    pub fn new(capacity: usize, retention: TimeDelta) -> Self {
        Self {
            samples: BTreeMap::new(),
            capacity,
            retention,
        }
    }

    /// Append a sample and evict from the front until both limits hold.
    ///
    /// `now` is the wall-clock time of the append; ages are not rechecked
    /// later.
    pub fn record(&mut self, address: &str, sample: HistorySample, now: DateTime<Utc>) {
        let history = self
            .samples
            .entry(address.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(1024)));
        history.push_back(sample);

        while history.len() > self.capacity {
            history.pop_front();
        }

        let cutoff = now - self.retention;
        while history.front().is_some_and(|oldest| oldest.timestamp < cutoff) {
            history.pop_front();
        }
    }

    /// Drop every sample older than the retention window relative to `now`,
    /// for all devices, and forget devices left without samples.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.samples.retain(|_, history| {
            while history.front().is_some_and(|oldest| oldest.timestamp < cutoff) {
                history.pop_front();
            }
            !history.is_empty()
        });
    }

    /// The trailing `len` samples of a device, oldest first
    pub fn window(&self, address: &str, len: usize) -> Vec<HistorySample> {
        self.samples
            .get(address)
            .map(|history| {
                let skip = history.len().saturating_sub(len);
                history.iter().skip(skip).copied().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, address: &str) -> usize {
        self.samples.get(address).map_or(0, VecDeque::len)
    }

    /// Every device's samples, oldest first
    pub fn snapshot(&self) -> BTreeMap<String, Vec<HistorySample>> {
        self.samples
            .iter()
            .map(|(ip, history)| (ip.clone(), history.iter().copied().collect()))
            .collect()
    }

    /// Uptime per device; devices without samples are left out.
    pub fn summarize(&self) -> BTreeMap<String, UptimeSummary> {
        self.samples
            .iter()
            .filter_map(|(ip, history)| {
                let percent = Self::uptime(history)?;
                Some((
                    ip.clone(),
                    UptimeSummary {
                        uptime_percent: round_one_decimal(percent),
                        sample_count: history.len(),
                    },
                ))
            })
            .collect()
    }

    /// Device with the strictly lowest uptime.
    ///
    /// Ties go to the lexicographically smallest address.
    pub fn worst(&self) -> Option<(String, f64)> {
        let mut worst: Option<(&String, f64)> = None;

        for (ip, history) in &self.samples {
            let Some(percent) = Self::uptime(history) else {
                continue;
            };
            if worst.is_none_or(|(_, lowest)| percent < lowest) {
                worst = Some((ip, percent));
            }
        }

        worst.map(|(ip, percent)| (ip.clone(), round_one_decimal(percent)))
    }

    fn uptime(history: &VecDeque<HistorySample>) -> Option<f64> {
        if history.is_empty() {
            return None;
        }
        let online = history.iter().filter(|sample| sample.online).count();
        Some(online as f64 / history.len() as f64 * 100.0)
    }
}
