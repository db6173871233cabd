//! Active alert list and operator acknowledgement
//!
//! Most-recent-first, bounded. New alerts go to the front and overflow drops
//! from the tail. Acknowledgement is the only removal path; alerts never
//! expire on their own.

use crate::domain::types::Alert;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ActiveAlerts {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl ActiveAlerts {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { alerts: VecDeque::with_capacity(capacity), capacity }
    }

    /// Insert at the front; returns the oldest alert if it was dropped
    pub fn push(&mut self, alert: Alert) -> Option<Alert> {
        self.alerts.push_front(alert);
        if self.alerts.len() > self.capacity {
            let dropped = self.alerts.pop_back();
            if let Some(ref old) = dropped {
                debug!(alert_id = %old.id, "alert_evicted");
            }
            dropped
        } else {
            None
        }
    }

    /// Remove exactly the alert with `id`; unknown ids are a no-op
    pub fn acknowledge(&mut self, id: &str) -> Option<Alert> {
        let idx = self.alerts.iter().position(|a| a.id == id)?;
        self.alerts.remove(idx)
    }

    /// Messages of the `k` most recent alerts
    pub fn recent_messages(&self, k: usize) -> Vec<String> {
        self.alerts.iter().take(k).map(|a| a.message.clone()).collect()
    }

    /// Copy of the list, most recent first
    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
