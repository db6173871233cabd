//! HTTP API for presentation layers
//!
//! - `GET /state` - pipeline snapshot (window, alerts, analysis, video)
//! - `POST /alerts/{id}/ack` - acknowledge an alert
//! - `POST /video` - select a clip (`{"path": ..., "contentType": ...}`) and analyse it
//! - `POST /video/retry` - re-run analysis of the selected clip
//! - `POST /monitoring` - enable/disable the live loops (`{"enabled": bool}`)
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /health`

use crate::domain::types::AlertCategory;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::pipeline::Pipeline;
use crate::services::video::VideoAsset;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared handler state
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoRequest {
    path: String,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MonitoringRequest {
    enabled: bool,
}

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.6}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_sample_metrics(&mut output, site_id, &summary);
    write_alert_metrics(&mut output, site_id, &summary, &metrics.alerts_by_category());
    write_analysis_metrics(&mut output, site_id, &summary);
    write_video_metrics(&mut output, site_id, &summary);

    output
}

fn write_sample_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "crowd_samples_total",
        "Metric samples stored in the window",
        MetricType::Counter,
        site,
        summary.samples_total,
    );
    write_metric(
        output,
        "crowd_samples_rejected_total",
        "Samples rejected for arriving out of order",
        MetricType::Counter,
        site,
        summary.samples_rejected,
    );
    write_gauge_f64(output, "crowd_samples_per_min", "Sample rate over the last period", site, summary.samples_per_min);
    write_gauge_f64(output, "crowd_density_peak", "Peak density over the last period (p/m2)", site, summary.peak_density);
    write_gauge_f64(output, "crowd_density_last", "Most recent density (p/m2)", site, summary.last_density);
}

fn write_alert_metrics(
    output: &mut String,
    site: &str,
    summary: &MetricsSummary,
    by_category: &[(AlertCategory, u64)],
) {
    write_metric(
        output,
        "crowd_alerts_raised_total",
        "Alerts raised",
        MetricType::Counter,
        site,
        summary.alerts_raised,
    );
    write_metric(
        output,
        "crowd_alerts_acknowledged_total",
        "Alerts acknowledged by an operator",
        MetricType::Counter,
        site,
        summary.alerts_acknowledged,
    );
    write_metric(
        output,
        "crowd_alerts_evicted_total",
        "Alerts dropped from a full active list",
        MetricType::Counter,
        site,
        summary.alerts_evicted,
    );
    write_metric(
        output,
        "crowd_active_alerts",
        "Alerts awaiting acknowledgement",
        MetricType::Gauge,
        site,
        summary.active_alerts,
    );

    let _ = writeln!(output, "# HELP crowd_alerts_by_type_total Alerts raised per category");
    let _ = writeln!(output, "# TYPE crowd_alerts_by_type_total counter");
    for (category, count) in by_category {
        let _ = writeln!(
            output,
            "crowd_alerts_by_type_total{{site=\"{site}\",type=\"{}\"}} {count}",
            category.as_str()
        );
    }
}

fn write_analysis_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "crowd_analyses_scored_total",
        "Risk analyses answered by the scorer",
        MetricType::Counter,
        site,
        summary.analyses_scored,
    );
    write_metric(
        output,
        "crowd_analyses_fallback_total",
        "Risk analyses replaced by the fallback",
        MetricType::Counter,
        site,
        summary.analyses_fallback,
    );
    write_histogram(
        output,
        "crowd_scorer_latency_ms",
        "Risk scorer latency in milliseconds",
        site,
        &summary.scorer_lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.scorer_lat_avg_ms,
    );
    write_metric(
        output,
        "crowd_scorer_latency_p99_ms",
        "99th percentile scorer latency",
        MetricType::Gauge,
        site,
        summary.scorer_lat_p99_ms,
    );
    write_metric(
        output,
        "crowd_scorer_latency_max_ms",
        "Maximum scorer latency",
        MetricType::Gauge,
        site,
        summary.scorer_lat_max_ms,
    );
}

fn write_video_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "crowd_video_analyses_total",
        "Video analyses applied from frame inference",
        MetricType::Counter,
        site,
        summary.videos_completed,
    );
    write_metric(
        output,
        "crowd_video_fallback_total",
        "Video analyses that used the fallback estimate",
        MetricType::Counter,
        site,
        summary.videos_fallback,
    );
    write_metric(
        output,
        "crowd_video_stale_total",
        "Video results discarded after a newer selection",
        MetricType::Counter,
        site,
        summary.videos_stale,
    );
    write_metric(
        output,
        "crowd_frames_failed_total",
        "Frames lost to capture or inference errors",
        MetricType::Counter,
        site,
        summary.frames_failed,
    );
    write_metric(
        output,
        "crowd_activity_dropped_total",
        "Activity events dropped on a full channel",
        MetricType::Counter,
        site,
        summary.activity_dropped,
    );
}

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    response(status, "application/json", body.to_string())
}

fn bad_request(error: impl std::fmt::Display) -> Response<Full<Bytes>> {
    json_response(StatusCode::BAD_REQUEST, json!({ "ok": false, "error": error.to_string() }))
}

async fn read_json<B, T>(body: B) -> anyhow::Result<T>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: serde::de::DeserializeOwned,
{
    let collected = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("failed to read request body: {e}"))?;
    let bytes = collected.to_bytes();
    serde_json::from_slice(&bytes).context("invalid JSON body")
}

/// Route one request
async fn handle_request<B>(req: Request<B>, state: Arc<ApiState>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    debug!(method = %method, path = %path, "http_request");

    let resp = match (&method, segments.as_slice()) {
        (&Method::GET, ["metrics"]) => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&state.metrics, state.pipeline.site_id()),
        ),
        (&Method::GET, ["health"]) => response(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, ["state"]) => match serde_json::to_value(state.pipeline.snapshot()) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                error!(error = %e, "state_serialize_failed");
                json_response(StatusCode::INTERNAL_SERVER_ERROR, json!({ "ok": false }))
            }
        },
        (&Method::POST, ["alerts", id, "ack"]) => {
            let removed = state.pipeline.acknowledge(id);
            json_response(StatusCode::OK, json!({ "ok": true, "removed": removed.is_some() }))
        }
        (&Method::POST, ["video"]) => match read_json::<_, VideoRequest>(req.into_body()).await {
            Ok(body) => {
                let asset = match body.content_type {
                    Some(ct) => VideoAsset::with_content_type(body.path, ct),
                    None => VideoAsset::from_path(body.path),
                };
                match asset {
                    Ok(asset) => {
                        let started = state.pipeline.analyze_video(asset).is_some();
                        json_response(StatusCode::ACCEPTED, json!({ "ok": true, "started": started }))
                    }
                    Err(e) => {
                        info!(error = %e, "video_asset_rejected");
                        bad_request(e)
                    }
                }
            }
            Err(e) => bad_request(format!("{e:#}")),
        },
        (&Method::POST, ["video", "retry"]) => {
            let started = state.pipeline.start_video_analysis().is_some();
            let status = if started { StatusCode::ACCEPTED } else { StatusCode::CONFLICT };
            json_response(status, json!({ "ok": started, "started": started }))
        }
        (&Method::POST, ["monitoring"]) => match read_json::<_, MonitoringRequest>(req.into_body()).await {
            Ok(body) => {
                state.pipeline.set_monitoring(body.enabled);
                json_response(StatusCode::OK, json!({ "ok": true, "enabled": body.enabled }))
            }
            Err(e) => bad_request(format!("{e:#}")),
        },
        (&Method::OPTIONS, _) => {
            let mut resp = response(StatusCode::OK, "text/plain", "");
            resp.headers_mut().insert(
                hyper::header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
            resp.headers_mut().insert(
                hyper::header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            );
            resp
        }
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(resp)
}

/// Start the HTTP server; returns when shutdown is signalled
pub async fn start_http_server(
    port: u16,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("failed to bind HTTP port {port}"))?;

    info!(port = %port, site = %state.pipeline.site_id(), "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
