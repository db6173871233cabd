//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Counter updates are lock-free; reporting swaps the per-period counters.
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical counters
//! only. Do NOT use them for coordination or logic decisions.

use crate::domain::types::AlertCategory;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for external call latency (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Density is stored as f64 bits; non-negative floats order the same as their bits
#[inline]
fn density_bits(density: f64) -> u64 {
    if density.is_finite() && density > 0.0 {
        density.to_bits()
    } else {
        0
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Samples appended to the window (monotonic)
    samples_total: AtomicU64,
    /// Samples since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Out-of-order samples rejected by the window (monotonic)
    samples_rejected: AtomicU64,
    /// Peak density seen since last report, as f64 bits (reset on report)
    peak_density_bits: AtomicU64,
    /// Latest density, as f64 bits
    last_density_bits: AtomicU64,
    /// Alerts raised (monotonic)
    alerts_raised: AtomicU64,
    /// Alerts removed by acknowledgement (monotonic)
    alerts_acknowledged: AtomicU64,
    /// Alerts pushed off the tail of the active list (monotonic)
    alerts_evicted: AtomicU64,
    /// Current active alert count
    active_alerts: AtomicU64,
    /// Alerts raised per category (monotonic)
    alerts_by_category: RwLock<FxHashMap<AlertCategory, u64>>,
    /// Risk analyses taken verbatim from the scorer (monotonic)
    analyses_scored: AtomicU64,
    /// Risk analyses replaced by a fallback (monotonic)
    analyses_fallback: AtomicU64,
    /// Scorer call latency histogram buckets (reset on report)
    scorer_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of scorer latencies in ms (reset on report)
    scorer_latency_sum_ms: AtomicU64,
    /// Max scorer latency in ms (reset on report)
    scorer_latency_max_ms: AtomicU64,
    /// Video estimates completed from real frames (monotonic)
    videos_completed: AtomicU64,
    /// Video estimates replaced by the fixed fallback (monotonic)
    videos_fallback: AtomicU64,
    /// Video results discarded because a newer asset was selected (monotonic)
    videos_stale: AtomicU64,
    /// Frames lost to capture or inference errors (monotonic)
    frames_failed: AtomicU64,
    /// Activity events dropped due to channel full (monotonic)
    activity_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            peak_density_bits: AtomicU64::new(0),
            last_density_bits: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            alerts_acknowledged: AtomicU64::new(0),
            alerts_evicted: AtomicU64::new(0),
            active_alerts: AtomicU64::new(0),
            alerts_by_category: RwLock::new(FxHashMap::default()),
            analyses_scored: AtomicU64::new(0),
            analyses_fallback: AtomicU64::new(0),
            scorer_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            scorer_latency_sum_ms: AtomicU64::new(0),
            scorer_latency_max_ms: AtomicU64::new(0),
            videos_completed: AtomicU64::new(0),
            videos_fallback: AtomicU64::new(0),
            videos_stale: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            activity_dropped: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record a sample appended to the window (lock-free)
    #[inline]
    pub fn record_sample(&self, density: f64) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
        let bits = density_bits(density);
        self.last_density_bits.store(bits, Ordering::Relaxed);
        update_atomic_max(&self.peak_density_bits, bits);
    }

    #[inline]
    pub fn record_sample_rejected(&self) {
        self.samples_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a raised alert; `evicted` when the list was already full
    pub fn record_alert_raised(&self, category: AlertCategory, evicted: bool, active: usize) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.alerts_evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.active_alerts.store(active as u64, Ordering::Relaxed);
        *self.alerts_by_category.write().entry(category).or_insert(0) += 1;
    }

    #[inline]
    pub fn record_alert_acknowledged(&self, active: usize) {
        self.alerts_acknowledged.fetch_add(1, Ordering::Relaxed);
        self.active_alerts.store(active as u64, Ordering::Relaxed);
    }

    /// Record a scorer call and whether its answer was used
    pub fn record_analysis(&self, scored: bool, latency_ms: Option<u64>) {
        if scored {
            self.analyses_scored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.analyses_fallback.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(latency_ms) = latency_ms {
            self.scorer_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
            self.scorer_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
            update_atomic_max(&self.scorer_latency_max_ms, latency_ms);
        }
    }

    #[inline]
    pub fn record_video(&self, fallback: bool) {
        if fallback {
            self.videos_fallback.fetch_add(1, Ordering::Relaxed);
        } else {
            self.videos_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_video_stale(&self) {
        self.videos_stale.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frames_failed(&self, count: u64) {
        self.frames_failed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_activity_dropped(&self) {
        self.activity_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn analyses_fallback(&self) -> u64 {
        self.analyses_fallback.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn videos_stale(&self) -> u64 {
        self.videos_stale.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_failed(&self) -> u64 {
        self.frames_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn activity_dropped(&self) -> u64 {
        self.activity_dropped.load(Ordering::Relaxed)
    }

    /// Per-category alert totals in a stable order
    pub fn alerts_by_category(&self) -> Vec<(AlertCategory, u64)> {
        let counts = self.alerts_by_category.read();
        AlertCategory::ALL
            .iter()
            .map(|category| (*category, counts.get(category).copied().unwrap_or(0)))
            .collect()
    }

    /// Generate a report and reset the per-period counters
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let samples_since = self.samples_since_report.swap(0, Ordering::Relaxed);
        let samples_per_min =
            if elapsed_secs > 0.0 { samples_since as f64 * 60.0 / elapsed_secs } else { 0.0 };

        let peak_density = f64::from_bits(self.peak_density_bits.swap(0, Ordering::Relaxed));
        let last_density = f64::from_bits(self.last_density_bits.load(Ordering::Relaxed));

        let scorer_lat_buckets = swap_buckets(&self.scorer_latency_buckets);
        let scorer_lat_sum = self.scorer_latency_sum_ms.swap(0, Ordering::Relaxed);
        let scorer_lat_max = self.scorer_latency_max_ms.swap(0, Ordering::Relaxed);
        let scorer_lat_count: u64 = scorer_lat_buckets.iter().sum();
        let scorer_lat_avg_ms =
            if scorer_lat_count > 0 { scorer_lat_sum / scorer_lat_count } else { 0 };
        let scorer_lat_p99_ms = percentile_from_buckets(&scorer_lat_buckets, 0.99);

        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_per_min,
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            peak_density,
            last_density,
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            alerts_acknowledged: self.alerts_acknowledged.load(Ordering::Relaxed),
            alerts_evicted: self.alerts_evicted.load(Ordering::Relaxed),
            active_alerts: self.active_alerts.load(Ordering::Relaxed),
            analyses_scored: self.analyses_scored.load(Ordering::Relaxed),
            analyses_fallback: self.analyses_fallback.load(Ordering::Relaxed),
            scorer_lat_buckets,
            scorer_lat_avg_ms,
            scorer_lat_max_ms: scorer_lat_max,
            scorer_lat_p99_ms,
            videos_completed: self.videos_completed.load(Ordering::Relaxed),
            videos_fallback: self.videos_fallback.load(Ordering::Relaxed),
            videos_stale: self.videos_stale.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            activity_dropped: self.activity_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for the HTTP exposition)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_per_min: f64,
    pub samples_rejected: u64,
    /// Highest density seen during the period (p/m²)
    pub peak_density: f64,
    pub last_density: f64,
    pub alerts_raised: u64,
    pub alerts_acknowledged: u64,
    pub alerts_evicted: u64,
    pub active_alerts: u64,
    pub analyses_scored: u64,
    pub analyses_fallback: u64,
    /// Scorer latency histogram buckets
    /// Bounds: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600 ms
    pub scorer_lat_buckets: [u64; NUM_BUCKETS],
    pub scorer_lat_avg_ms: u64,
    pub scorer_lat_max_ms: u64,
    pub scorer_lat_p99_ms: u64,
    pub videos_completed: u64,
    pub videos_fallback: u64,
    pub videos_stale: u64,
    pub frames_failed: u64,
    pub activity_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_per_min = format!("{:.1}", self.samples_per_min),
            peak_density = format!("{:.2}", self.peak_density),
            active_alerts = %self.active_alerts,
            alerts_raised = %self.alerts_raised,
            alerts_acked = %self.alerts_acknowledged,
            analyses_scored = %self.analyses_scored,
            analyses_fallback = %self.analyses_fallback,
            scorer_p99_ms = %self.scorer_lat_p99_ms,
            videos = %self.videos_completed,
            videos_fallback = %self.videos_fallback,
            activity_dropped = %self.activity_dropped,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.samples_total(), 0);
        assert_eq!(metrics.alerts_raised(), 0);
    }

    #[test]
    fn test_record_sample_tracks_peak_density() {
        let metrics = Metrics::new();
        metrics.record_sample(3.5);
        metrics.record_sample(5.75);
        metrics.record_sample(4.0);

        let summary = metrics.report();
        assert_eq!(summary.samples_total, 3);
        assert_eq!(summary.peak_density, 5.75);
        assert_eq!(summary.last_density, 4.0);

        // Peak resets per period, totals do not
        let next = metrics.report();
        assert_eq!(next.peak_density, 0.0);
        assert_eq!(next.samples_total, 3);
    }

    #[test]
    fn test_alert_counters() {
        let metrics = Metrics::new();
        metrics.record_alert_raised(AlertCategory::HighDensity, false, 1);
        metrics.record_alert_raised(AlertCategory::HighDensity, true, 1);
        metrics.record_alert_acknowledged(0);

        let summary = metrics.report();
        assert_eq!(summary.alerts_raised, 2);
        assert_eq!(summary.alerts_evicted, 1);
        assert_eq!(summary.alerts_acknowledged, 1);
        assert_eq!(summary.active_alerts, 0);

        let by_category = metrics.alerts_by_category();
        assert!(by_category.contains(&(AlertCategory::HighDensity, 2)));
        assert!(by_category.contains(&(AlertCategory::ReverseFlow, 0)));
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(25600), 9);
        assert_eq!(bucket_index(25601), 10);
    }

    #[test]
    fn test_scorer_latency_tracking() {
        let metrics = Metrics::new();
        metrics.record_analysis(true, Some(100));
        metrics.record_analysis(true, Some(500));
        metrics.record_analysis(false, Some(300));
        metrics.record_analysis(false, None);

        let summary = metrics.report();
        assert_eq!(summary.analyses_scored, 2);
        assert_eq!(summary.analyses_fallback, 2);
        assert_eq!(summary.scorer_lat_avg_ms, 300);
        assert_eq!(summary.scorer_lat_max_ms, 500);
        assert!(summary.scorer_lat_p99_ms <= 800);
    }
}
