//! Domain models - core crowd monitoring types
//!
//! This module contains the canonical data types used throughout the system:
//! - `CrowdMetric` - one density/flow observation at a site
//! - `Alert` - a raised danger condition awaiting acknowledgement
//! - `RiskAnalysis` - the current risk narrative
//! - `CrowdAnalysisResult` - head count estimate for a video asset
//! - `ActivityEvent` - records handed to the activity logger

pub mod activity;
pub mod types;

// Re-export commonly used types at module level
pub use activity::{ActivityEvent, ActivityKind};
pub use types::{
    Alert, AlertCategory, CrowdAnalysisResult, CrowdCategory, CrowdMetric, FrameObservation,
    GenderCount, RiskAnalysis, Severity,
};
