//! Risk analysis orchestration
//!
//! Packages the most recent window samples and alert messages into a request
//! for the external risk scorer. Every failure mode (offline mode, transport
//! error, malformed payload, timeout) resolves to a fixed fallback analysis;
//! `analyze` never fails.

use crate::domain::types::{CrowdMetric, RiskAnalysis};
use crate::infra::config::Config;
use crate::services::alert_lifecycle::ActiveAlerts;
use crate::services::metric_window::MetricWindow;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Density above which the scorer is told conditions are dangerous (p/m²)
pub const DANGER_DENSITY: f64 = 4.0;

/// Input handed to the risk scorer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    pub metrics: Vec<CrowdMetric>,
    pub active_alerts: Vec<String>,
    pub danger_density: f64,
}

/// External risk-scoring capability
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score(&self, request: &RiskRequest) -> anyhow::Result<RiskAnalysis>;
}

/// Why a fallback replaced the scorer's answer
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Offline,
    Timeout,
    Failed(String),
}

impl FallbackReason {
    pub fn as_str(&self) -> &str {
        match self {
            FallbackReason::Offline => "offline",
            FallbackReason::Timeout => "timeout",
            FallbackReason::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The scorer's response, verbatim
    Scored { analysis: RiskAnalysis, latency: Duration },
    Fallback { analysis: RiskAnalysis, reason: FallbackReason },
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &RiskAnalysis {
        match self {
            AnalysisOutcome::Scored { analysis, .. } => analysis,
            AnalysisOutcome::Fallback { analysis, .. } => analysis,
        }
    }

    pub fn into_analysis(self) -> RiskAnalysis {
        match self {
            AnalysisOutcome::Scored { analysis, .. } => analysis,
            AnalysisOutcome::Fallback { analysis, .. } => analysis,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback { .. })
    }
}

pub struct RiskAnalysisOrchestrator {
    scorer: Arc<dyn RiskScorer>,
    offline_mode: bool,
    timeout: Duration,
    sample_count: usize,
    alert_count: usize,
}

impl RiskAnalysisOrchestrator {
    pub fn new(config: &Config, scorer: Arc<dyn RiskScorer>) -> Self {
        Self {
            scorer,
            offline_mode: config.offline_mode(),
            timeout: config.scorer_timeout(),
            sample_count: config.analysis_samples(),
            alert_count: config.analysis_alerts(),
        }
    }

    /// Build the scorer input from copies of the window and alert list.
    /// Returns `None` when the window is empty (no invocation this cycle).
    pub fn build_request(&self, window: &MetricWindow, alerts: &ActiveAlerts) -> Option<RiskRequest> {
        if window.is_empty() {
            return None;
        }
        Some(RiskRequest {
            metrics: window.snapshot(self.sample_count),
            active_alerts: alerts.recent_messages(self.alert_count),
            danger_density: DANGER_DENSITY,
        })
    }

    /// Score a request, substituting the fixed fallback on any failure
    pub async fn analyze(&self, request: &RiskRequest) -> AnalysisOutcome {
        if self.offline_mode {
            debug!("risk_scorer_skipped_offline");
            return AnalysisOutcome::Fallback {
                analysis: RiskAnalysis::offline(),
                reason: FallbackReason::Offline,
            };
        }

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.scorer.score(request)).await {
            Ok(Ok(analysis)) => {
                let latency = start.elapsed();
                info!(
                    risk_level = %analysis.severity,
                    recommendations = %analysis.recommendations.len(),
                    latency_ms = %latency.as_millis(),
                    "risk_analysis_scored"
                );
                AnalysisOutcome::Scored { analysis, latency }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "risk_scorer_failed");
                AnalysisOutcome::Fallback {
                    analysis: RiskAnalysis::unavailable(),
                    reason: FallbackReason::Failed(format!("{:#}", e)),
                }
            }
            Err(_) => {
                warn!(timeout_ms = %self.timeout.as_millis(), "risk_scorer_timeout");
                AnalysisOutcome::Fallback {
                    analysis: RiskAnalysis::unavailable(),
                    reason: FallbackReason::Timeout,
                }
            }
        }
    }

    pub fn offline_mode(&self) -> bool {
        self.offline_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Alert, AlertCategory, Severity};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedScorer {
        response: RiskAnalysis,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RiskScorer for FixedScorer {
        async fn score(&self, _request: &RiskRequest) -> anyhow::Result<RiskAnalysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl RiskScorer for FailingScorer {
        async fn score(&self, _request: &RiskRequest) -> anyhow::Result<RiskAnalysis> {
            anyhow::bail!("connection refused")
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl RiskScorer for SlowScorer {
        async fn score(&self, _request: &RiskRequest) -> anyhow::Result<RiskAnalysis> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(RiskAnalysis::initializing())
        }
    }

    fn scored_response() -> RiskAnalysis {
        RiskAnalysis {
            severity: Severity::Critical,
            prediction: "Crush conditions likely at the east corridor within 15 minutes".to_string(),
            recommendations: vec![
                "Open overflow gate 3".to_string(),
                "Halt entry at main gate".to_string(),
                "Dispatch stewards to corridor 4B".to_string(),
            ],
        }
    }

    fn metric(seq: i64) -> CrowdMetric {
        CrowdMetric {
            location: "MAIN_GATE".to_string(),
            density: 4.5,
            flow_rate: 60,
            velocity: 1.1,
            anomaly_score: 30.0,
            timestamp: Utc::now() + chrono::Duration::seconds(seq),
        }
    }

    fn request() -> RiskRequest {
        RiskRequest {
            metrics: vec![metric(0)],
            active_alerts: vec!["Bottleneck forming".to_string()],
            danger_density: DANGER_DENSITY,
        }
    }

    #[tokio::test]
    async fn test_success_is_returned_verbatim() {
        let scorer = Arc::new(FixedScorer { response: scored_response(), calls: AtomicUsize::new(0) });
        let orchestrator = RiskAnalysisOrchestrator::new(&Config::default(), scorer.clone());

        let outcome = orchestrator.analyze(&request()).await;
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.into_analysis(), scored_response());
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_yields_fixed_fallback() {
        let orchestrator = RiskAnalysisOrchestrator::new(&Config::default(), Arc::new(FailingScorer));

        let outcome = orchestrator.analyze(&request()).await;
        match &outcome {
            AnalysisOutcome::Fallback { reason: FallbackReason::Failed(msg), .. } => {
                assert!(msg.contains("connection refused"));
            }
            other => panic!("expected failure fallback, got {other:?}"),
        }
        let analysis = outcome.into_analysis();
        assert_eq!(analysis.severity, Severity::Low);
        assert_eq!(
            analysis.prediction,
            "Unable to process real-time AI prediction. Relying on manual thresholds."
        );
        assert_eq!(
            analysis.recommendations,
            vec!["Ensure all exit routes are clear.", "Deploy additional personnel to bottlenecks."]
        );
    }

    #[tokio::test]
    async fn test_timeout_yields_fallback() {
        let config = Config::default().with_scorer_timeout_ms(20);
        let orchestrator = RiskAnalysisOrchestrator::new(&config, Arc::new(SlowScorer));

        let outcome = orchestrator.analyze(&request()).await;
        assert_eq!(
            outcome,
            AnalysisOutcome::Fallback {
                analysis: RiskAnalysis::unavailable(),
                reason: FallbackReason::Timeout
            }
        );
    }

    #[tokio::test]
    async fn test_offline_mode_never_calls_scorer() {
        let scorer = Arc::new(FixedScorer { response: scored_response(), calls: AtomicUsize::new(0) });
        let config = Config::default().with_offline_mode(true);
        let orchestrator = RiskAnalysisOrchestrator::new(&config, scorer.clone());

        let outcome = orchestrator.analyze(&request()).await;
        assert_eq!(outcome.analysis(), &RiskAnalysis::offline());
        assert_eq!(outcome.analysis().severity, Severity::Low);
        assert!(outcome.analysis().prediction.contains("offline mode"));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_build_request_on_empty_window() {
        let orchestrator = RiskAnalysisOrchestrator::new(&Config::default(), Arc::new(FailingScorer));
        let window = MetricWindow::new(20);
        let alerts = ActiveAlerts::new(10);
        assert!(orchestrator.build_request(&window, &alerts).is_none());
    }

    #[test]
    fn test_build_request_takes_recent_context() {
        let orchestrator = RiskAnalysisOrchestrator::new(&Config::default(), Arc::new(FailingScorer));
        let mut window = MetricWindow::new(20);
        for seq in 0..8 {
            window.append(metric(seq));
        }
        let mut alerts = ActiveAlerts::new(10);
        for i in 0..4 {
            alerts.push(Alert::new("x", Severity::High, AlertCategory::HighDensity, format!("m{i}")));
        }

        let req = orchestrator.build_request(&window, &alerts).unwrap();
        assert_eq!(req.metrics, window.snapshot(5));
        assert_eq!(req.active_alerts, vec!["m3", "m2", "m1"]);

        let json = serde_json::to_value(&req).unwrap();
        assert!(json["activeAlerts"].is_array());
        assert_eq!(json["metrics"][0]["flowRate"], 60);
    }
}
