//! Video Analysis - one-shot crowd estimate for a video clip
//!
//! Samples evenly spaced frames with ffmpeg, sends each to the inference
//! service and prints the aggregated result as JSON on stdout.
//!
//! Usage:
//!   video-analysis clips/gate-a.mp4
//!   video-analysis --config config/dev.toml --frames 5 clips/gate-a.mp4

use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use crowd_watch::infra::Config;
use crowd_watch::io::{FfmpegFrameExtractor, HttpFrameInference};
use crowd_watch::services::{VideoAsset, VideoCrowdEstimator};

/// Video Analysis - crowd size estimate from sampled frames
#[derive(Parser, Debug)]
#[command(name = "video-analysis", version, about, long_about = None)]
struct Args {
    /// Video file to analyze (mp4, mov, avi, mkv, webm, m4v)
    path: String,

    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Number of frames to sample (overrides [video] frames)
    #[arg(short, long)]
    frames: Option<usize>,

    /// Inference endpoint (overrides [video] inference_url)
    #[arg(long)]
    inference_url: Option<String>,

    /// Print the frame counters alongside the result
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(git_hash = %env!("GIT_HASH"), path = %args.path, "video-analysis starting");

    let mut config = Config::load_from_path(&args.config);
    if let Some(frames) = args.frames {
        config = config.with_video_frames(frames);
    }
    if let Some(url) = &args.inference_url {
        config = config.with_inference_url(url);
    }

    let asset = VideoAsset::from_path(&args.path)?;
    let estimator = VideoCrowdEstimator::new(
        Arc::new(FfmpegFrameExtractor::new(&config)),
        Arc::new(HttpFrameInference::new(&config)?),
        config.video_frames(),
    );

    let estimate = estimator.estimate(&asset).await;
    if estimate.fallback {
        warn!(
            path = %args.path,
            frames_captured = %estimate.frames_captured,
            frames_failed = %estimate.frames_failed,
            "video_fallback_estimate"
        );
    }

    let output = if args.verbose {
        serde_json::to_string_pretty(&serde_json::json!({
            "result": estimate.result,
            "framesCaptured": estimate.frames_captured,
            "framesFailed": estimate.frames_failed,
            "fallback": estimate.fallback,
        }))?
    } else {
        serde_json::to_string_pretty(&estimate.result)?
    };
    println!("{output}");
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
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "video-analysis",
            "--config=config/temple.toml",
            "--frames",
            "5",
            "clips/gate-a.mp4",
        ])
        .unwrap();
        assert_eq!(args.config, "config/temple.toml");
        assert_eq!(args.frames, Some(5));
        assert_eq!(args.path, "clips/gate-a.mp4");
    }
}
