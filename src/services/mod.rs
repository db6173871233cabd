//! Services - monitoring logic and state management
//!
//! - `metric_source` - Synthetic per-site sample generator
//! - `metric_window` - Bounded, time-ordered sample buffer
//! - `alert_evaluator` - Density/random alert trigger
//! - `alert_lifecycle` - Active alert list and acknowledgement
//! - `risk_analysis` - Risk scorer orchestration with fallback
//! - `video` - Frame sampling, inference and aggregation for video clips
//! - `pipeline` - Event-emitting state container driving all of the above
//! - `random` - Injectable random source

pub mod alert_evaluator;
pub mod alert_lifecycle;
pub mod metric_source;
pub mod metric_window;
pub mod pipeline;
pub mod random;
pub mod risk_analysis;
pub mod video;

// Re-export commonly used types
pub use alert_evaluator::{AlertEvaluator, AlertPolicy};
pub use alert_lifecycle::ActiveAlerts;
pub use metric_source::MetricSource;
pub use metric_window::{AppendOutcome, MetricWindow};
pub use pipeline::{Pipeline, PipelineDeps, PipelineEvent, PipelineHandle, PipelineSnapshot};
pub use random::{RandomSource, ScriptedRandom, SeededRandom, ThreadRandom};
pub use risk_analysis::{AnalysisOutcome, RiskAnalysisOrchestrator, RiskRequest, RiskScorer};
pub use video::{FrameExtractor, FrameInference, VideoAsset, VideoCrowdEstimator};
