//! Operator-facing video analysis state
//!
//! Idle -> FileSelected -> Analyzing -> Completed | Failed
//!
//! Failed is transient: the error is recorded and the session drops back to
//! FileSelected with the asset kept, so the same asset can be retried.
//!
//! Every selection or analysis start bumps the generation. A result carrying
//! an older ticket is stale and discarded, so the latest request always wins.

use super::VideoAsset;
use crate::domain::types::CrowdAnalysisResult;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoPhase {
    Idle,
    FileSelected,
    Analyzing,
    Completed,
    Failed,
}

impl VideoPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoPhase::Idle => "IDLE",
            VideoPhase::FileSelected => "FILE_SELECTED",
            VideoPhase::Analyzing => "ANALYZING",
            VideoPhase::Completed => "COMPLETED",
            VideoPhase::Failed => "FAILED",
        }
    }
}

/// Identifies one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Stale,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSession {
    phase: VideoPhase,
    asset: Option<VideoAsset>,
    result: Option<CrowdAnalysisResult>,
    error: Option<String>,
    generation: u64,
}

impl Default for VideoSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSession {
    pub fn new() -> Self {
        Self { phase: VideoPhase::Idle, asset: None, result: None, error: None, generation: 0 }
    }

    /// Select a new asset from any phase; any in-flight run becomes stale
    pub fn select(&mut self, asset: VideoAsset) {
        self.generation += 1;
        self.phase = VideoPhase::FileSelected;
        self.asset = Some(asset);
        self.result = None;
        self.error = None;
    }

    /// Start analysing the selected asset; also the retry after a failure
    pub fn begin(&mut self) -> Option<(VideoTicket, VideoAsset)> {
        if self.phase != VideoPhase::FileSelected {
            return None;
        }
        let asset = self.asset.clone()?;
        self.generation += 1;
        self.phase = VideoPhase::Analyzing;
        self.error = None;
        Some((VideoTicket(self.generation), asset))
    }

    pub fn complete(&mut self, ticket: VideoTicket, result: CrowdAnalysisResult) -> ApplyOutcome {
        if !self.is_current(ticket) {
            return ApplyOutcome::Stale;
        }
        self.phase = VideoPhase::Completed;
        self.result = Some(result);
        ApplyOutcome::Applied
    }

    /// Record the failure and return to FileSelected with the asset kept
    pub fn fail(&mut self, ticket: VideoTicket, reason: impl Into<String>) -> ApplyOutcome {
        if !self.is_current(ticket) {
            return ApplyOutcome::Stale;
        }
        self.phase = VideoPhase::FileSelected;
        self.error = Some(reason.into());
        ApplyOutcome::Applied
    }

    fn is_current(&self, ticket: VideoTicket) -> bool {
        self.phase == VideoPhase::Analyzing && ticket.0 == self.generation
    }

    pub fn phase(&self) -> VideoPhase {
        self.phase
    }

    pub fn asset(&self) -> Option<&VideoAsset> {
        self.asset.as_ref()
    }

    pub fn result(&self) -> Option<&CrowdAnalysisResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
