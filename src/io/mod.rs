//! IO modules - external system interfaces
//!
//! - `activity_channel` - Typed channel for activity log events
//! - `activity_log` - JSONL activity writer
//! - `mqtt_egress` - MQTT mirror of activity events
//! - `risk_client` - HTTP client for the risk scorer
//! - `inference_client` - HTTP client for per-frame inference
//! - `frame_extractor` - ffmpeg/ffprobe frame capture
//! - `http_api` - State, command and Prometheus HTTP endpoint

pub mod activity_channel;
pub mod activity_log;
pub mod frame_extractor;
pub mod http_api;
pub mod inference_client;
pub mod mqtt_egress;
pub mod risk_client;

// Re-export commonly used types
pub use activity_channel::{create_activity_channel, ActivitySender};
pub use activity_log::{ActivityLog, ActivityWriter};
pub use frame_extractor::FfmpegFrameExtractor;
pub use http_api::{start_http_server, ApiState};
pub use inference_client::HttpFrameInference;
pub use mqtt_egress::MqttActivityPublisher;
pub use risk_client::HttpRiskScorer;
