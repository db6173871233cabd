//! Video crowd estimation
//!
//! Samples K frames evenly across a clip, runs per-frame inference, and
//! aggregates the observations. Individual frame failures are tolerated;
//! losing every frame degrades to the fixed fallback estimate.

pub mod aggregate;
pub mod session;

pub use aggregate::{aggregate_frames, fallback_result, time_points, TimePoints};
pub use session::{ApplyOutcome, VideoPhase, VideoSession, VideoTicket};

use crate::domain::types::{CrowdAnalysisResult, FrameObservation};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const VIDEO_EXTENSIONS: &[&str] =
    &["mp4", "m4v", "mov", "avi", "mkv", "webm", "mpeg", "mpg", "wmv", "flv", "3gp", "ts"];

/// Captures still frames from a video file
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Clip duration in seconds
    async fn probe_duration(&self, path: &Path) -> anyhow::Result<f64>;

    /// One JPEG frame at `at_secs`
    async fn capture_frame(&self, path: &Path, at_secs: f64) -> anyhow::Result<Vec<u8>>;
}

/// Per-frame person and subgroup counting
#[async_trait]
pub trait FrameInference: Send + Sync {
    async fn infer(&self, jpeg: &[u8]) -> anyhow::Result<FrameObservation>;
}

/// An operator-selected clip; only video files are accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

impl VideoAsset {
    /// Accept a path with a known video extension
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !is_video {
            anyhow::bail!("not a video asset: {}", path.display());
        }
        Ok(Self { path, content_type: None })
    }

    /// Accept any path whose declared content type is `video/*`
    pub fn with_content_type(
        path: impl Into<PathBuf>,
        content_type: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let content_type = content_type.into();
        if !content_type.to_ascii_lowercase().starts_with("video/") {
            anyhow::bail!("unsupported content type: {content_type}");
        }
        Ok(Self { path: path.into(), content_type: Some(content_type) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// Outcome of one estimation run
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEstimate {
    pub result: CrowdAnalysisResult,
    pub frames_captured: usize,
    pub frames_failed: usize,
    pub fallback: bool,
}

impl VideoEstimate {
    fn fallback(frames_captured: usize, frames_failed: usize) -> Self {
        Self { result: fallback_result(), frames_captured, frames_failed, fallback: true }
    }
}

pub struct VideoCrowdEstimator {
    extractor: Arc<dyn FrameExtractor>,
    inference: Arc<dyn FrameInference>,
    frame_count: usize,
}

impl VideoCrowdEstimator {
    pub fn new(
        extractor: Arc<dyn FrameExtractor>,
        inference: Arc<dyn FrameInference>,
        frame_count: usize,
    ) -> Self {
        Self { extractor, inference, frame_count: frame_count.max(1) }
    }

    /// Estimate the crowd in `asset`. Never fails: total loss of frames or
    /// inference yields the fallback estimate.
    pub async fn estimate(&self, asset: &VideoAsset) -> VideoEstimate {
        let path = asset.path();

        let duration = match self.extractor.probe_duration(path).await {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "video_probe_failed");
                return VideoEstimate::fallback(0, 0);
            }
        };

        let points = time_points(duration, self.frame_count);
        if points.is_empty() {
            warn!(path = %path.display(), duration = %duration, "video_duration_unusable");
            return VideoEstimate::fallback(0, 0);
        }

        // Captures run in time order
        let mut frames = Vec::with_capacity(points.len());
        let mut capture_failed = 0usize;
        for at in &points {
            match self.extractor.capture_frame(path, *at).await {
                Ok(jpeg) => frames.push(jpeg),
                Err(e) => {
                    capture_failed += 1;
                    warn!(path = %path.display(), at_secs = %at, error = %e, "frame_capture_failed");
                }
            }
        }
        if frames.is_empty() {
            return VideoEstimate::fallback(0, capture_failed);
        }

        let captured = frames.len();
        let mut tasks = JoinSet::new();
        for jpeg in frames {
            let inference = Arc::clone(&self.inference);
            tasks.spawn(async move { inference.infer(&jpeg).await });
        }

        // Aggregation is order-independent, so results are taken as they finish
        let mut observations = Vec::with_capacity(captured);
        let mut inference_failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(obs)) => {
                    debug!(people = %obs.people, boys = %obs.boys, girls = %obs.girls, "frame_inferred");
                    observations.push(obs);
                }
                Ok(Err(e)) => {
                    inference_failed += 1;
                    warn!(error = %e, "frame_inference_failed");
                    observations.push(FrameObservation::zero());
                }
                Err(e) => {
                    inference_failed += 1;
                    warn!(error = %e, "frame_inference_aborted");
                    observations.push(FrameObservation::zero());
                }
            }
        }

        let frames_failed = capture_failed + inference_failed;
        if inference_failed == captured {
            warn!(path = %path.display(), frames = %captured, "frame_inference_unreachable");
            return VideoEstimate::fallback(captured, frames_failed);
        }

        let Some(result) = aggregate_frames(&observations) else {
            return VideoEstimate::fallback(captured, frames_failed);
        };
        info!(
            path = %path.display(),
            total_people = %result.total_people(),
            category = %result.category().as_str(),
            frames = %captured,
            frames_failed = %frames_failed,
            "video_estimated"
        );
        VideoEstimate { result, frames_captured: captured, frames_failed, fallback: false }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

#[cfg(test)]
mod tests;
