//! Crowd-watch - crowd safety monitoring daemon
//!
//! Emits crowd metrics, raises density alerts, asks a remote scorer for a
//! risk analysis and estimates crowd size from uploaded video clips.
//!
//! Module structure:
//! - `domain/` - Core types (metrics, alerts, analyses, activity events)
//! - `io/` - External interfaces (HTTP API, scorer/inference clients, ffmpeg, activity log)
//! - `services/` - Monitoring logic (window, alerts, orchestration, video)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use crowd_watch::infra::{Config, Metrics};
use crowd_watch::io::{
    create_activity_channel, start_http_server, ActivityLog, ActivityWriter, ApiState,
    FfmpegFrameExtractor, HttpFrameInference, HttpRiskScorer, MqttActivityPublisher,
};
use crowd_watch::services::{Pipeline, PipelineDeps, ThreadRandom};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Crowd-watch - crowd safety monitoring
#[derive(Parser, Debug)]
#[command(name = "crowd-watch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Never call the risk scorer; always report the offline analysis
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "crowd-watch starting");

    let args = Args::parse();
    let mut config = Config::load_from_path(&args.config);
    if args.offline {
        config = config.with_offline_mode(true);
    }

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        monitor_enabled = %config.monitor_enabled(),
        emit_interval_ms = %config.emit_interval().as_millis(),
        window_capacity = %config.window_capacity(),
        alert_capacity = %config.alert_capacity(),
        density_threshold = %config.density_threshold(),
        offline_mode = %config.offline_mode(),
        scorer_url = %config.scorer_url(),
        inference_url = %config.inference_url(),
        video_frames = %config.video_frames(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Activity log writer (JSONL, optionally mirrored to MQTT)
    let (activity, activity_rx) = create_activity_channel(
        config.activity_buffer(),
        config.site_id().to_string(),
        metrics.clone(),
    );
    let mqtt = config.mqtt_egress_enabled().then(|| MqttActivityPublisher::new(&config));
    let writer = ActivityWriter::new(activity_rx, ActivityLog::new(config.activity_file()), mqtt);
    let writer_shutdown = shutdown_rx.clone();
    let writer_task = tokio::spawn(async move {
        writer.run(writer_shutdown).await;
    });

    let deps = PipelineDeps {
        rng: Arc::new(ThreadRandom),
        scorer: Arc::new(HttpRiskScorer::new(&config)?),
        extractor: Arc::new(FfmpegFrameExtractor::new(&config)),
        inference: Arc::new(HttpFrameInference::new(&config)?),
        activity,
        metrics: metrics.clone(),
    };
    let pipeline = Pipeline::new(&config, deps);
    let handle = pipeline.start();
    info!("pipeline_started");

    // HTTP API (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let state = Arc::new(ApiState { pipeline: pipeline.clone(), metrics: metrics.clone() });
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(http_port, state, http_shutdown).await {
                tracing::error!(error = %e, "HTTP server error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");

    handle.teardown().await;
    let _ = shutdown_tx.send(true);
    let _ = writer_task.await;

    info!("crowd-watch shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn test_config_path_falls_back_to_env() {
        let cmd = Args::command();
        let config = cmd.get_arguments().find(|a| a.get_id() == "config").unwrap();
        assert_eq!(config.get_env(), Some(OsStr::new("CONFIG_FILE")));
        assert_eq!(config.get_default_values(), &[OsStr::new("config/dev.toml")]);
    }

    #[test]
    fn test_config_flag() {
        let args = Args::try_parse_from(["crowd-watch", "--config", "config/temple.toml", "--offline"])
            .unwrap();
        assert_eq!(args.config, "config/temple.toml");
        assert!(args.offline);
    }
}
