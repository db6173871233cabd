//! Frame aggregation for video crowd estimates
//!
//! Combines per-frame observations into one conservative estimate:
//! - total is the busiest frame's head count, raised to the sum of the
//!   rounded subgroup means when those exceed it
//! - subgroup means are rescaled to the total preserving their ratio
//! - an all-zero subgroup split divides the total evenly, remainder to boys

use crate::domain::types::{CrowdAnalysisResult, FrameObservation};
use smallvec::SmallVec;

/// Total used when no frame could be analysed
pub const FALLBACK_TOTAL: u32 = 13;

/// Frame sample times; K is small, so they stay inline
pub type TimePoints = SmallVec<[f64; 8]>;

/// Sample points `duration * i / (k + 1)` for `i = 1..=k`, skipping both ends
pub fn time_points(duration_secs: f64, k: usize) -> TimePoints {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || k == 0 {
        return TimePoints::new();
    }
    let step = duration_secs / (k + 1) as f64;
    (1..=k).map(|i| step * i as f64).collect()
}

/// Aggregate per-frame observations; `None` when there are no frames
pub fn aggregate_frames(frames: &[FrameObservation]) -> Option<CrowdAnalysisResult> {
    if frames.is_empty() {
        return None;
    }

    // Widened so large subgroup counts cannot overflow the sum
    let n = frames.len() as f64;
    let max_people = frames.iter().map(|f| u64::from(f.people)).max().unwrap_or(0);
    let mean_boys = (frames.iter().map(|f| f.boys as f64).sum::<f64>() / n).round() as u64;
    let mean_girls = (frames.iter().map(|f| f.girls as f64).sum::<f64>() / n).round() as u64;
    let subgroup_sum = mean_boys.saturating_add(mean_girls);

    let total = max_people.max(subgroup_sum).min(u64::from(u32::MAX));
    let boys = if subgroup_sum == 0 {
        total.div_ceil(2)
    } else {
        (mean_boys as f64 * total as f64 / subgroup_sum as f64).round() as u64
    };

    let total = u32::try_from(total).unwrap_or(u32::MAX);
    let boys = u32::try_from(boys.min(u64::from(total))).unwrap_or(total);
    Some(CrowdAnalysisResult::new(total, boys))
}

/// Fixed estimate returned when extraction or inference fails entirely
pub fn fallback_result() -> CrowdAnalysisResult {
    CrowdAnalysisResult::new(FALLBACK_TOTAL, FALLBACK_TOTAL / 2)
}
