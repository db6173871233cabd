//! Frame capture with ffmpeg/ffprobe
//!
//! Runs the binaries as child processes (tokio::process) so capture never
//! blocks the runtime. Every run has a deadline; a child still running when
//! it passes is killed and the call fails.

use crate::infra::config::Config;
use crate::services::video::FrameExtractor;
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// JPEG quality passed to `-q:v` (2 best, 31 worst)
const JPEG_QUALITY: u32 = 3;

pub struct FfmpegFrameExtractor {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl FfmpegFrameExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.ffmpeg_bin().to_string(),
            ffprobe: config.ffprobe_bin().to_string(),
            timeout: config.capture_timeout(),
        }
    }

    /// Run `cmd` to completion within the capture deadline
    async fn run(&self, mut cmd: Command, bin: &str) -> anyhow::Result<Output> {
        cmd.kill_on_drop(true);
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.with_context(|| format!("failed to execute {bin}")),
            Err(_) => anyhow::bail!("{bin} timed out after {}ms", self.timeout.as_millis()),
        }
    }
}

/// Parse ffprobe's `format=duration` output
pub fn parse_duration(stdout: &str) -> anyhow::Result<f64> {
    let trimmed = stdout.trim();
    let duration: f64 =
        trimmed.parse().with_context(|| format!("unexpected ffprobe output: {trimmed:?}"))?;
    if !duration.is_finite() || duration <= 0.0 {
        anyhow::bail!("video has no usable duration ({duration})");
    }
    Ok(duration)
}

/// Arguments for grabbing one JPEG at `at_secs`
fn capture_args(path: &Path, at_secs: f64) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        // Input-side seek, then a single frame
        "-ss".to_string(),
        format!("{at_secs:.3}"),
        "-i".to_string(),
        path.display().to_string(),
        "-vframes".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-vcodec".to_string(),
        "mjpeg".to_string(),
        "-q:v".to_string(),
        JPEG_QUALITY.to_string(),
        "pipe:1".to_string(),
    ]
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn probe_duration(&self, path: &Path) -> anyhow::Result<f64> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(path)
            .stdin(Stdio::null());
        let output = self.run(cmd, &self.ffprobe).await?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;
        let duration = parse_duration(&stdout)?;
        debug!(path = %path.display(), duration = %duration, "video_probed");
        Ok(duration)
    }

    async fn capture_frame(&self, path: &Path, at_secs: f64) -> anyhow::Result<Vec<u8>> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(capture_args(path, at_secs))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = self.run(cmd, &self.ffmpeg).await?;

        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg exited with {} at {at_secs:.3}s: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout.is_empty() {
            anyhow::bail!("ffmpeg returned no frame data at {at_secs:.3}s");
        }

        debug!(
            path = %path.display(),
            at_secs = %at_secs,
            size_bytes = %output.stdout.len(),
            "frame_captured"
        );
        Ok(output.stdout)
    }
}
