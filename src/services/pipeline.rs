//! Monitoring pipeline
//!
//! Owns the live state for one site (metric window, active alerts, current
//! risk analysis, video session) and publishes a `PipelineEvent` for every
//! change. Each structure has a single writer; readers get copies, and no
//! lock is held across an await.
//!
//! Three triggers drive it:
//! - the metric emitter ticks while monitoring is enabled
//! - the analysis cycle runs on first data and then on a fixed cadence
//! - video analysis runs on operator request, concurrently with both

use crate::domain::types::{Alert, CrowdAnalysisResult, CrowdMetric, RiskAnalysis};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::activity_channel::ActivitySender;
use crate::services::alert_evaluator::{AlertEvaluator, AlertPolicy};
use crate::services::alert_lifecycle::ActiveAlerts;
use crate::services::metric_source::MetricSource;
use crate::services::metric_window::{AppendOutcome, MetricWindow};
use crate::services::random::RandomSource;
use crate::services::risk_analysis::{AnalysisOutcome, RiskAnalysisOrchestrator, RiskScorer};
use crate::services::video::{
    ApplyOutcome, FrameExtractor, FrameInference, VideoAsset, VideoCrowdEstimator, VideoPhase,
    VideoSession, VideoTicket,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 256;

/// Change notifications for presentation layers
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    MetricAppended(CrowdMetric),
    AlertRaised(Alert),
    AlertAcknowledged { id: String },
    AnalysisUpdated { analysis: RiskAnalysis, fallback: bool },
    VideoPhaseChanged(VideoPhase),
    VideoCompleted(CrowdAnalysisResult),
    MonitoringChanged(bool),
}

/// External collaborators injected into the pipeline
pub struct PipelineDeps {
    pub rng: Arc<dyn RandomSource>,
    pub scorer: Arc<dyn RiskScorer>,
    pub extractor: Arc<dyn FrameExtractor>,
    pub inference: Arc<dyn FrameInference>,
    pub activity: ActivitySender,
    pub metrics: Arc<Metrics>,
}

/// Point-in-time copy of everything the presentation layer reads
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub site: String,
    pub monitoring: bool,
    pub window: Vec<CrowdMetric>,
    pub alerts: Vec<Alert>,
    pub analysis: RiskAnalysis,
    pub video: VideoSession,
}

pub struct Pipeline {
    site_id: String,
    emit_interval: Duration,
    analysis_interval: Duration,
    window: RwLock<MetricWindow>,
    alerts: RwLock<ActiveAlerts>,
    analysis: RwLock<RiskAnalysis>,
    video: RwLock<VideoSession>,
    source: MetricSource,
    evaluator: AlertEvaluator,
    orchestrator: RiskAnalysisOrchestrator,
    estimator: Arc<VideoCrowdEstimator>,
    activity: ActivitySender,
    metrics: Arc<Metrics>,
    events: broadcast::Sender<PipelineEvent>,
    monitoring: watch::Sender<bool>,
    first_data: Notify,
}

impl Pipeline {
    pub fn new(config: &Config, deps: PipelineDeps) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (monitoring, _) = watch::channel(config.monitor_enabled());
        let source = MetricSource::new(
            config.metric_location(),
            config.metric_ranges().clone(),
            Arc::clone(&deps.rng),
        );
        let evaluator = AlertEvaluator::new(AlertPolicy::from_config(config), deps.rng);
        let orchestrator = RiskAnalysisOrchestrator::new(config, deps.scorer);
        let estimator = Arc::new(VideoCrowdEstimator::new(
            deps.extractor,
            deps.inference,
            config.video_frames(),
        ));

        Arc::new(Self {
            site_id: config.site_id().to_string(),
            emit_interval: config.emit_interval(),
            analysis_interval: config.analysis_interval(),
            window: RwLock::new(MetricWindow::new(config.window_capacity())),
            alerts: RwLock::new(ActiveAlerts::new(config.alert_capacity())),
            analysis: RwLock::new(RiskAnalysis::initializing()),
            video: RwLock::new(VideoSession::new()),
            source,
            evaluator,
            orchestrator,
            estimator,
            activity: deps.activity,
            metrics: deps.metrics,
            events,
            monitoring,
            first_data: Notify::new(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append one sample and evaluate it. Returns the alert it raised, if any.
    pub fn ingest(&self, sample: CrowdMetric) -> Option<Alert> {
        let (outcome, was_empty) = {
            let mut window = self.window.write();
            let was_empty = window.is_empty();
            (window.append(sample.clone()), was_empty)
        };
        if outcome == AppendOutcome::OutOfOrder {
            self.metrics.record_sample_rejected();
            return None;
        }

        self.metrics.record_sample(sample.density);
        self.activity.log_metric(&sample);
        debug!(
            location = %sample.location,
            density = %sample.density,
            flow_rate = %sample.flow_rate,
            "metric_ingested"
        );
        if was_empty {
            self.first_data.notify_one();
        }

        let alert = self.evaluator.evaluate(&sample);
        self.publish(PipelineEvent::MetricAppended(sample));

        let alert = alert?;
        let (evicted, active) = {
            let mut alerts = self.alerts.write();
            let evicted = alerts.push(alert.clone());
            (evicted, alerts.len())
        };
        self.metrics.record_alert_raised(alert.category, evicted.is_some(), active);
        self.activity.log_alert(&alert);
        info!(
            alert_id = %alert.id,
            location = %alert.location,
            severity = %alert.severity,
            category = %alert.category.as_str(),
            active = %active,
            "alert_raised"
        );
        self.publish(PipelineEvent::AlertRaised(alert.clone()));
        Some(alert)
    }

    /// Draw one sample from the source and ingest it
    pub fn tick_metric(&self) -> Option<Alert> {
        let sample = self.source.sample();
        self.ingest(sample)
    }

    /// Operator acknowledgement; unknown ids are a no-op
    pub fn acknowledge(&self, alert_id: &str) -> Option<Alert> {
        let (removed, active) = {
            let mut alerts = self.alerts.write();
            let removed = alerts.acknowledge(alert_id);
            (removed, alerts.len())
        };
        self.activity.log_user_action(
            "ACKNOWLEDGE_ALERT",
            json!({ "alertId": alert_id, "found": removed.is_some() }),
        );

        match &removed {
            Some(alert) => {
                self.metrics.record_alert_acknowledged(active);
                info!(alert_id = %alert_id, location = %alert.location, active = %active, "alert_acknowledged");
                self.publish(PipelineEvent::AlertAcknowledged { id: alert_id.to_string() });
            }
            None => debug!(alert_id = %alert_id, "alert_acknowledge_unknown"),
        }
        removed
    }

    /// Run one analysis cycle. Returns `None` when the window is empty and the
    /// current analysis is left unchanged.
    pub async fn refresh_analysis(&self) -> Option<AnalysisOutcome> {
        let request = {
            let window = self.window.read();
            let alerts = self.alerts.read();
            self.orchestrator.build_request(&window, &alerts)
        };
        let Some(request) = request else {
            debug!("risk_analysis_skipped_no_data");
            return None;
        };

        let outcome = self.orchestrator.analyze(&request).await;
        let analysis = outcome.analysis().clone();
        *self.analysis.write() = analysis.clone();

        match &outcome {
            AnalysisOutcome::Scored { latency, .. } => {
                self.metrics.record_analysis(true, Some(latency.as_millis() as u64));
                self.activity.log_analysis(&analysis);
            }
            AnalysisOutcome::Fallback { reason, .. } => {
                self.metrics.record_analysis(false, None);
                self.activity.log_system(
                    "ANALYSIS_FALLBACK",
                    json!({ "reason": reason.as_str(), "riskLevel": analysis.severity }),
                );
            }
        }
        self.publish(PipelineEvent::AnalysisUpdated { analysis, fallback: outcome.is_fallback() });
        Some(outcome)
    }

    /// Enable or disable the live loops; in-flight work is unaffected
    pub fn set_monitoring(&self, enabled: bool) {
        let changed = self.monitoring.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
        if !changed {
            return;
        }

        self.activity.log_user_action("TOGGLE_MONITORING", json!({ "enabled": enabled }));
        self.activity.log_system(
            if enabled { "MONITORING_STARTED" } else { "MONITORING_STOPPED" },
            json!({ "site": self.site_id }),
        );
        info!(enabled = %enabled, "monitoring_changed");
        self.publish(PipelineEvent::MonitoringChanged(enabled));
    }

    pub fn monitoring_enabled(&self) -> bool {
        *self.monitoring.borrow()
    }

    /// Select a new asset; an analysis still in flight becomes stale
    pub fn select_video_asset(&self, asset: VideoAsset) {
        info!(path = %asset.path().display(), "video_asset_selected");
        self.activity.log_user_action(
            "SELECT_VIDEO",
            json!({ "path": asset.path().display().to_string() }),
        );
        self.video.write().select(asset);
        self.publish(PipelineEvent::VideoPhaseChanged(VideoPhase::FileSelected));
    }

    /// Select `asset` and start analysing it (last request wins)
    pub fn analyze_video(self: &Arc<Self>, asset: VideoAsset) -> Option<JoinHandle<()>> {
        self.select_video_asset(asset);
        self.start_video_analysis()
    }

    /// Analyse the currently selected asset; also retries after a failure
    pub fn start_video_analysis(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let started = self.video.write().begin();
        let Some((ticket, asset)) = started else {
            debug!("video_analysis_not_startable");
            return None;
        };
        self.publish(PipelineEvent::VideoPhaseChanged(VideoPhase::Analyzing));

        let pipeline = Arc::clone(self);
        Some(tokio::spawn(async move { pipeline.run_video_analysis(ticket, asset).await }))
    }

    async fn run_video_analysis(&self, ticket: VideoTicket, asset: VideoAsset) {
        let estimator = Arc::clone(&self.estimator);
        let job_asset = asset.clone();
        let joined = tokio::spawn(async move { estimator.estimate(&job_asset).await }).await;

        match joined {
            Ok(estimate) => {
                let applied = self.video.write().complete(ticket, estimate.result.clone());
                if applied == ApplyOutcome::Stale {
                    self.metrics.record_video_stale();
                    info!(path = %asset.path().display(), "video_result_stale");
                    return;
                }
                self.metrics.record_frames_failed(estimate.frames_failed as u64);
                self.metrics.record_video(estimate.fallback);
                self.activity.log_video_result(&estimate.result, estimate.fallback);
                self.publish(PipelineEvent::VideoCompleted(estimate.result));
                self.publish(PipelineEvent::VideoPhaseChanged(VideoPhase::Completed));
            }
            Err(e) => {
                warn!(path = %asset.path().display(), error = %e, "video_analysis_failed");
                let applied = self.video.write().fail(ticket, e.to_string());
                if applied == ApplyOutcome::Stale {
                    self.metrics.record_video_stale();
                    return;
                }
                self.activity.log_system(
                    "VIDEO_ANALYSIS_FAILED",
                    json!({ "path": asset.path().display().to_string(), "error": e.to_string() }),
                );
                self.publish(PipelineEvent::VideoPhaseChanged(VideoPhase::Failed));
                self.publish(PipelineEvent::VideoPhaseChanged(VideoPhase::FileSelected));
            }
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            site: self.site_id.clone(),
            monitoring: self.monitoring_enabled(),
            window: self.window.read().all(),
            alerts: self.alerts.read().snapshot(),
            analysis: self.analysis.read().clone(),
            video: self.video.read().clone(),
        }
    }

    /// Most recent `k` samples, in arrival order
    pub fn recent_metrics(&self, k: usize) -> Vec<CrowdMetric> {
        self.window.read().snapshot(k)
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.read().snapshot()
    }

    pub fn current_analysis(&self) -> RiskAnalysis {
        self.analysis.read().clone()
    }

    pub fn video_session(&self) -> VideoSession {
        self.video.read().clone()
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Spawn the emitter and analysis loops
    pub fn start(self: &Arc<Self>) -> PipelineHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        self.activity.log_system("PIPELINE_STARTED", json!({ "monitoring": self.monitoring_enabled() }));
        info!(
            site = %self.site_id,
            emit_interval_ms = %self.emit_interval.as_millis(),
            analysis_interval_secs = %self.analysis_interval.as_secs(),
            offline_mode = %self.orchestrator.offline_mode(),
            "pipeline_started"
        );

        let emitter = tokio::spawn(Arc::clone(self).emitter_loop(stop_rx.clone()));
        let analyzer = tokio::spawn(Arc::clone(self).analysis_loop(stop_rx));

        PipelineHandle { stop_tx, emitter, analyzer, pipeline: Arc::clone(self) }
    }

    async fn emitter_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.emit_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped handle also stops the loop
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.monitoring_enabled() {
                        self.tick_metric();
                    }
                }
            }
        }
        debug!("metric_emitter_stopped");
    }

    async fn analysis_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.analysis_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped handle also stops the loop
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.monitoring_enabled() {
                        self.refresh_analysis().await;
                    }
                }
                _ = self.first_data.notified() => {
                    debug!("risk_analysis_first_data");
                    self.refresh_analysis().await;
                }
            }
        }
        debug!("risk_analysis_loop_stopped");
    }
}

/// Running loops of a started pipeline
pub struct PipelineHandle {
    stop_tx: watch::Sender<bool>,
    emitter: JoinHandle<()>,
    analyzer: JoinHandle<()>,
    pipeline: Arc<Pipeline>,
}

impl PipelineHandle {
    /// Stop both loops and wait for them to exit. An analysis already in
    /// progress finishes before the analysis loop observes the stop.
    pub async fn teardown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.emitter.await {
            warn!(error = %e, "metric_emitter_join_failed");
        }
        if let Err(e) = self.analyzer.await {
            warn!(error = %e, "risk_analysis_loop_join_failed");
        }
        self.pipeline.activity.log_system("PIPELINE_STOPPED", json!({}));
        info!(site = %self.pipeline.site_id, "pipeline_stopped");
    }
}
