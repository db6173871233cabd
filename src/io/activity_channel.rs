//! Typed channel for activity log events
//!
//! Provides a non-blocking way to hand events to the activity writer.
//! Uses a bounded mpsc channel; when it is full the event is dropped and
//! counted, the caller never waits.

use crate::domain::activity::{ActivityEvent, ActivityKind};
use crate::domain::types::{Alert, CrowdAnalysisResult, CrowdMetric, RiskAnalysis};
use crate::infra::metrics::Metrics;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Sender handle for activity events
///
/// Clone this to share across producers.
#[derive(Clone)]
pub struct ActivitySender {
    tx: mpsc::Sender<ActivityEvent>,
    site_id: String,
    metrics: Arc<Metrics>,
}

impl ActivitySender {
    pub fn new(tx: mpsc::Sender<ActivityEvent>, site_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, site_id, metrics }
    }

    /// Send a prepared event; drops and counts it if the channel is full or closed
    pub fn send(&self, event: ActivityEvent) {
        if let Err(e) = self.tx.try_send(event) {
            self.metrics.record_activity_dropped();
            debug!(error = %e, "activity_event_dropped");
        }
    }

    pub fn log_metric(&self, metric: &CrowdMetric) {
        let data = serde_json::to_value(metric).unwrap_or_default();
        self.send(
            ActivityEvent::new(ActivityKind::Metric, &self.site_id, data)
                .with_location(metric.location.clone()),
        );
    }

    pub fn log_alert(&self, alert: &Alert) {
        let data = serde_json::to_value(alert).unwrap_or_default();
        self.send(
            ActivityEvent::new(ActivityKind::Alert, &self.site_id, data)
                .with_location(alert.location.clone())
                .with_severity(alert.severity),
        );
    }

    pub fn log_analysis(&self, analysis: &RiskAnalysis) {
        let data = serde_json::to_value(analysis).unwrap_or_default();
        self.send(
            ActivityEvent::new(ActivityKind::Analysis, &self.site_id, data)
                .with_severity(analysis.severity),
        );
    }

    pub fn log_video_result(&self, result: &CrowdAnalysisResult, fallback: bool) {
        let data = json!({
            "action": "VIDEO_ANALYSIS",
            "result": result,
            "fallback": fallback,
        });
        self.send(
            ActivityEvent::new(ActivityKind::Analysis, &self.site_id, data)
                .with_location(result.location().to_string()),
        );
    }

    pub fn log_system(&self, action: &str, data: serde_json::Value) {
        let data = json!({ "action": action, "details": data });
        self.send(ActivityEvent::new(ActivityKind::System, &self.site_id, data));
    }

    pub fn log_user_action(&self, action: &str, data: serde_json::Value) {
        let data = json!({ "action": action, "details": data });
        self.send(ActivityEvent::new(ActivityKind::UserAction, &self.site_id, data));
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }
}

/// Create a new activity channel pair
///
/// Returns (sender, receiver); the sender can be cloned and shared.
pub fn create_activity_channel(
    buffer_size: usize,
    site_id: String,
    metrics: Arc<Metrics>,
) -> (ActivitySender, mpsc::Receiver<ActivityEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (ActivitySender::new(tx, site_id, metrics), rx)
}
