//! Bounded, time-ordered buffer of the most recent samples

use crate::domain::types::CrowdMetric;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Result of appending a sample
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Stored; carries the oldest sample if it had to be evicted
    Stored { evicted: Option<CrowdMetric> },
    /// Timestamp earlier than the newest stored sample; not stored
    OutOfOrder,
}

/// FIFO window over the latest `capacity` samples
#[derive(Debug, Clone)]
pub struct MetricWindow {
    samples: VecDeque<CrowdMetric>,
    capacity: usize,
}

impl MetricWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append a sample, evicting the oldest when full
    pub fn append(&mut self, sample: CrowdMetric) -> AppendOutcome {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                warn!(
                    newest = %newest.timestamp,
                    rejected = %sample.timestamp,
                    "metric_out_of_order"
                );
                return AppendOutcome::OutOfOrder;
            }
        }

        let evicted =
            if self.samples.len() == self.capacity { self.samples.pop_front() } else { None };
        if let Some(ref old) = evicted {
            debug!(evicted_ts = %old.timestamp, "metric_evicted");
        }
        self.samples.push_back(sample);
        AppendOutcome::Stored { evicted }
    }

    /// Copy of the most recent `k` samples in arrival order; `k` is clamped to capacity
    pub fn snapshot(&self, k: usize) -> Vec<CrowdMetric> {
        let k = k.min(self.capacity);
        let skip = self.samples.len().saturating_sub(k);
        self.samples.iter().skip(skip).cloned().collect()
    }

    /// Copy of the whole window
    pub fn all(&self) -> Vec<CrowdMetric> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&CrowdMetric> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
