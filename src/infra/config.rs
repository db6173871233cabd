//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Half-open `[min, max)` range a synthetic sample field is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Ranges for the synthetic metric source
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MetricRanges {
    #[serde(default = "default_density_range")]
    pub density: Range,
    #[serde(default = "default_flow_range")]
    pub flow_rate: Range,
    #[serde(default = "default_velocity_range")]
    pub velocity: Range,
    #[serde(default = "default_anomaly_range")]
    pub anomaly_score: Range,
}

impl Default for MetricRanges {
    fn default() -> Self {
        Self {
            density: default_density_range(),
            flow_rate: default_flow_range(),
            velocity: default_velocity_range(),
            anomaly_score: default_anomaly_range(),
        }
    }
}

fn default_density_range() -> Range {
    Range::new(2.0, 6.0)
}

fn default_flow_range() -> Range {
    Range::new(40.0, 100.0)
}

fn default_velocity_range() -> Range {
    Range::new(1.0, 1.8)
}

fn default_anomaly_range() -> Range {
    Range::new(0.0, 100.0)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "temple-north")
    #[serde(default = "default_site_id")]
    pub id: String,
    /// Location label stamped on emitted samples
    #[serde(default = "default_metric_location")]
    pub location: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id(), location: default_metric_location() }
    }
}

fn default_site_id() -> String {
    "crowd-watch".to_string()
}

fn default_metric_location() -> String {
    "MAIN_GATE".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default)]
    pub ranges: MetricRanges,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            emit_interval_ms: default_emit_interval_ms(),
            window_capacity: default_window_capacity(),
            ranges: MetricRanges::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_emit_interval_ms() -> u64 {
    3000
}

fn default_window_capacity() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_alert_capacity")]
    pub capacity: usize,
    /// Density (p/m²) above which an alert may be raised
    #[serde(default = "default_density_threshold")]
    pub density_threshold: f64,
    /// A uniform draw must exceed this for the alert to fire
    #[serde(default = "default_trigger_above")]
    pub trigger_above: f64,
    #[serde(default = "default_alert_location")]
    pub location: String,
    #[serde(default = "default_alert_message")]
    pub message: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            capacity: default_alert_capacity(),
            density_threshold: default_density_threshold(),
            trigger_above: default_trigger_above(),
            location: default_alert_location(),
            message: default_alert_message(),
        }
    }
}

fn default_alert_capacity() -> usize {
    10
}

fn default_density_threshold() -> f64 {
    5.0
}

fn default_trigger_above() -> f64 {
    0.7
}

fn default_alert_location() -> String {
    "East Corridor 4B".to_string()
}

fn default_alert_message() -> String {
    "Density exceeded safe threshold (5.2 p/m²). Bottleneck forming.".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_interval_secs")]
    pub interval_secs: u64,
    /// Most recent samples sent to the scorer
    #[serde(default = "default_analysis_samples")]
    pub samples: usize,
    /// Most recent alert messages sent to the scorer
    #[serde(default = "default_analysis_alerts")]
    pub alerts: usize,
    /// Skip the scorer entirely and use the offline fallback
    #[serde(default)]
    pub offline_mode: bool,
    #[serde(default = "default_scorer_url")]
    pub scorer_url: String,
    #[serde(default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_analysis_interval_secs(),
            samples: default_analysis_samples(),
            alerts: default_analysis_alerts(),
            offline_mode: false,
            scorer_url: default_scorer_url(),
            timeout_ms: default_scorer_timeout_ms(),
        }
    }
}

fn default_analysis_interval_secs() -> u64 {
    30
}

fn default_analysis_samples() -> usize {
    5
}

fn default_analysis_alerts() -> usize {
    3
}

fn default_scorer_url() -> String {
    "http://localhost:8090/v1/risk".to_string()
}

fn default_scorer_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    /// Representative frames sampled per asset
    #[serde(default = "default_frame_count")]
    pub frames: usize,
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
    #[serde(default = "default_inference_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    /// Deadline for one ffprobe or ffmpeg run; the child is killed when it passes
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frames: default_frame_count(),
            inference_url: default_inference_url(),
            timeout_ms: default_inference_timeout_ms(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

fn default_frame_count() -> usize {
    3
}

fn default_inference_url() -> String {
    "http://localhost:8090/v1/frame".to_string()
}

fn default_inference_timeout_ms() -> u64 {
    15_000
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_capture_timeout_ms() -> u64 {
    20_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// File path for the activity log (JSONL format, empty to disable)
    #[serde(default = "default_activity_file")]
    pub file: String,
    #[serde(default = "default_activity_buffer")]
    pub buffer: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { file: default_activity_file(), buffer: default_activity_buffer() }
    }
}

fn default_activity_file() -> String {
    "activity.jsonl".to_string()
}

fn default_activity_buffer() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topic for activity events (QoS 0)
    #[serde(default = "default_activity_topic")]
    pub topic: String,
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            topic: default_activity_topic(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_activity_topic() -> String {
    "crowd/activity".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Dashboard/metrics HTTP port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_http_port(), metrics_interval_secs: default_metrics_interval_secs() }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub mqtt_egress: MqttEgressConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    metric_location: String,
    monitor_enabled: bool,
    emit_interval_ms: u64,
    window_capacity: usize,
    metric_ranges: MetricRanges,
    alert_capacity: usize,
    density_threshold: f64,
    alert_trigger_above: f64,
    alert_location: String,
    alert_message: String,
    analysis_interval_secs: u64,
    analysis_samples: usize,
    analysis_alerts: usize,
    offline_mode: bool,
    scorer_url: String,
    scorer_timeout_ms: u64,
    video_frames: usize,
    inference_url: String,
    inference_timeout_ms: u64,
    ffmpeg_bin: String,
    ffprobe_bin: String,
    capture_timeout_ms: u64,
    activity_file: String,
    activity_buffer: usize,
    mqtt_egress_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_activity_topic: String,
    http_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            metric_location: toml_config.site.location,
            monitor_enabled: toml_config.monitor.enabled,
            emit_interval_ms: toml_config.monitor.emit_interval_ms,
            // Zero-sized buffers would drop every sample
            window_capacity: toml_config.monitor.window_capacity.max(1),
            metric_ranges: toml_config.monitor.ranges,
            alert_capacity: toml_config.alerts.capacity.max(1),
            density_threshold: toml_config.alerts.density_threshold,
            alert_trigger_above: toml_config.alerts.trigger_above,
            alert_location: toml_config.alerts.location,
            alert_message: toml_config.alerts.message,
            analysis_interval_secs: toml_config.analysis.interval_secs.max(1),
            analysis_samples: toml_config.analysis.samples,
            analysis_alerts: toml_config.analysis.alerts,
            offline_mode: toml_config.analysis.offline_mode,
            scorer_url: toml_config.analysis.scorer_url,
            scorer_timeout_ms: toml_config.analysis.timeout_ms,
            video_frames: toml_config.video.frames.max(1),
            inference_url: toml_config.video.inference_url,
            inference_timeout_ms: toml_config.video.timeout_ms,
            ffmpeg_bin: toml_config.video.ffmpeg,
            ffprobe_bin: toml_config.video.ffprobe,
            capture_timeout_ms: toml_config.video.capture_timeout_ms.max(1),
            activity_file: toml_config.activity.file,
            activity_buffer: toml_config.activity.buffer.max(1),
            mqtt_egress_enabled: toml_config.mqtt_egress.enabled,
            mqtt_host: toml_config.mqtt_egress.host,
            mqtt_port: toml_config.mqtt_egress.port,
            mqtt_username: toml_config.mqtt_egress.username,
            mqtt_password: toml_config.mqtt_egress.password,
            mqtt_activity_topic: toml_config.mqtt_egress.topic,
            http_port: toml_config.http.port,
            metrics_interval_secs: toml_config.http.metrics_interval_secs.max(1),
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn metric_location(&self) -> &str {
        &self.metric_location
    }

    pub fn monitor_enabled(&self) -> bool {
        self.monitor_enabled
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms.max(1))
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    pub fn metric_ranges(&self) -> &MetricRanges {
        &self.metric_ranges
    }

    pub fn alert_capacity(&self) -> usize {
        self.alert_capacity
    }

    pub fn density_threshold(&self) -> f64 {
        self.density_threshold
    }

    pub fn alert_trigger_above(&self) -> f64 {
        self.alert_trigger_above
    }

    pub fn alert_location(&self) -> &str {
        &self.alert_location
    }

    pub fn alert_message(&self) -> &str {
        &self.alert_message
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs)
    }

    pub fn analysis_samples(&self) -> usize {
        self.analysis_samples
    }

    pub fn analysis_alerts(&self) -> usize {
        self.analysis_alerts
    }

    pub fn offline_mode(&self) -> bool {
        self.offline_mode
    }

    pub fn scorer_url(&self) -> &str {
        &self.scorer_url
    }

    pub fn scorer_timeout(&self) -> Duration {
        Duration::from_millis(self.scorer_timeout_ms)
    }

    pub fn video_frames(&self) -> usize {
        self.video_frames
    }

    pub fn inference_url(&self) -> &str {
        &self.inference_url
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn ffmpeg_bin(&self) -> &str {
        &self.ffmpeg_bin
    }

    pub fn ffprobe_bin(&self) -> &str {
        &self.ffprobe_bin
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn activity_file(&self) -> &str {
        &self.activity_file
    }

    pub fn activity_buffer(&self) -> usize {
        self.activity_buffer
    }

    pub fn mqtt_egress_enabled(&self) -> bool {
        self.mqtt_egress_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_activity_topic(&self) -> &str {
        &self.mqtt_activity_topic
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder for tests and tools that need offline analysis
    pub fn with_offline_mode(mut self, offline: bool) -> Self {
        self.offline_mode = offline;
        self
    }

    /// Builder for tests that need fast ticks
    pub fn with_emit_interval_ms(mut self, ms: u64) -> Self {
        self.emit_interval_ms = ms;
        self
    }

    /// Builder for tests that need a small window or alert list
    pub fn with_capacities(mut self, window: usize, alerts: usize) -> Self {
        self.window_capacity = window.max(1);
        self.alert_capacity = alerts.max(1);
        self
    }

    /// Builder for tests that bound the scorer call
    pub fn with_scorer_timeout_ms(mut self, ms: u64) -> Self {
        self.scorer_timeout_ms = ms;
        self
    }

    pub fn with_scorer_url(mut self, url: &str) -> Self {
        self.scorer_url = url.to_string();
        self
    }

    pub fn with_inference_url(mut self, url: &str) -> Self {
        self.inference_url = url.to_string();
        self
    }

    pub fn with_ffmpeg_bins(mut self, ffmpeg: &str, ffprobe: &str) -> Self {
        self.ffmpeg_bin = ffmpeg.to_string();
        self.ffprobe_bin = ffprobe.to_string();
        self
    }

    pub fn with_capture_timeout_ms(mut self, ms: u64) -> Self {
        self.capture_timeout_ms = ms.max(1);
        self
    }

    /// Override the frame count from the command line
    pub fn with_video_frames(mut self, frames: usize) -> Self {
        self.video_frames = frames.max(1);
        self
    }
}
