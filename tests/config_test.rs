//! Integration tests for configuration loading

use crowd_watch::infra::{Config, Range};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "temple-north"
location = "NORTH_GATE"

[monitor]
enabled = false
emit_interval_ms = 1500
window_capacity = 50

[monitor.ranges]
density = { min = 1.0, max = 8.0 }

[alerts]
capacity = 5
density_threshold = 4.5
trigger_above = 0.5
location = "Inner Sanctum"

[analysis]
interval_secs = 10
samples = 8
offline_mode = true
scorer_url = "http://scorer.local/v1/risk"
timeout_ms = 2500

[video]
frames = 6
inference_url = "http://vision.local/v1/frame"
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
capture_timeout_ms = 4000

[activity]
file = "/var/log/crowd/activity.jsonl"

[mqtt_egress]
enabled = true
host = "broker.local"
topic = "temple/activity"

[http]
port = 9091
metrics_interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "temple-north");
    assert_eq!(config.metric_location(), "NORTH_GATE");
    assert!(!config.monitor_enabled());
    assert_eq!(config.emit_interval(), Duration::from_millis(1500));
    assert_eq!(config.window_capacity(), 50);
    assert_eq!(config.metric_ranges().density, Range::new(1.0, 8.0));
    // Unspecified ranges keep their defaults
    assert_eq!(config.metric_ranges().flow_rate, Range::new(40.0, 100.0));
    assert_eq!(config.alert_capacity(), 5);
    assert_eq!(config.density_threshold(), 4.5);
    assert_eq!(config.alert_trigger_above(), 0.5);
    assert_eq!(config.alert_location(), "Inner Sanctum");
    assert_eq!(config.analysis_interval(), Duration::from_secs(10));
    assert_eq!(config.analysis_samples(), 8);
    assert_eq!(config.analysis_alerts(), 3);
    assert!(config.offline_mode());
    assert_eq!(config.scorer_url(), "http://scorer.local/v1/risk");
    assert_eq!(config.scorer_timeout(), Duration::from_millis(2500));
    assert_eq!(config.video_frames(), 6);
    assert_eq!(config.inference_url(), "http://vision.local/v1/frame");
    assert_eq!(config.ffmpeg_bin(), "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(config.ffprobe_bin(), "ffprobe");
    assert_eq!(config.capture_timeout(), Duration::from_millis(4000));
    assert_eq!(config.activity_file(), "/var/log/crowd/activity.jsonl");
    assert!(config.mqtt_egress_enabled());
    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.mqtt_activity_topic(), "temple/activity");
    assert_eq!(config.http_port(), 9091);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "crowd-watch");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.window_capacity(), 20);
    assert_eq!(config.alert_capacity(), 10);
    assert_eq!(config.http_port(), 8080);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[monitor]\nwindow_capacity = \"lots\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());

    // load_from_path swallows the error and uses defaults
    let config = Config::load_from_path(&temp_file.path().display().to_string());
    assert_eq!(config.window_capacity(), 20);
}

#[test]
fn test_zero_values_are_clamped() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(
            b"[monitor]\nemit_interval_ms = 0\nwindow_capacity = 0\n\n[alerts]\ncapacity = 0\n\n[video]\nframes = 0\ncapture_timeout_ms = 0\n",
        )
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.emit_interval(), Duration::from_millis(1));
    assert_eq!(config.window_capacity(), 1);
    assert_eq!(config.alert_capacity(), 1);
    assert_eq!(config.video_frames(), 1);
    assert_eq!(config.capture_timeout(), Duration::from_millis(1));
}
