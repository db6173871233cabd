//! Synthetic crowd metric source
//!
//! Stands in for a camera-analytics feed: each call draws one sample from the
//! configured ranges. The emitter loop in the pipeline calls it once per tick
//! while monitoring is enabled.

use crate::domain::types::CrowdMetric;
use crate::infra::config::MetricRanges;
use crate::services::random::RandomSource;
use chrono::Utc;
use std::sync::Arc;

pub struct MetricSource {
    location: String,
    ranges: MetricRanges,
    rng: Arc<dyn RandomSource>,
}

impl MetricSource {
    pub fn new(location: impl Into<String>, ranges: MetricRanges, rng: Arc<dyn RandomSource>) -> Self {
        Self { location: location.into(), ranges, rng }
    }

    /// Draw the next sample, stamped now
    pub fn sample(&self) -> CrowdMetric {
        let density = self.rng.in_range(self.ranges.density.min, self.ranges.density.max);
        let flow = self.rng.in_range(self.ranges.flow_rate.min, self.ranges.flow_rate.max);
        let velocity = self.rng.in_range(self.ranges.velocity.min, self.ranges.velocity.max);
        let anomaly =
            self.rng.in_range(self.ranges.anomaly_score.min, self.ranges.anomaly_score.max);

        CrowdMetric {
            location: self.location.clone(),
            density: density.max(0.0),
            // Integer people/minute, floored like the draw range
            flow_rate: flow.max(0.0).floor() as u32,
            velocity,
            anomaly_score: anomaly.clamp(0.0, 100.0),
            timestamp: Utc::now(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::random::{ScriptedRandom, SeededRandom};

    #[test]
    fn test_sample_maps_draws_onto_ranges() {
        let rng = Arc::new(ScriptedRandom::new([0.5, 0.999, 0.0, 0.25], 0.0));
        let source = MetricSource::new("MAIN_GATE", MetricRanges::default(), rng);

        let metric = source.sample();
        assert_eq!(metric.location, "MAIN_GATE");
        assert_eq!(metric.density, 4.0);
        assert_eq!(metric.flow_rate, 99);
        assert_eq!(metric.velocity, 1.0);
        assert_eq!(metric.anomaly_score, 25.0);
    }

    #[test]
    fn test_samples_stay_in_bounds() {
        let source =
            MetricSource::new("MAIN_GATE", MetricRanges::default(), Arc::new(SeededRandom::new(7)));
        for _ in 0..5_000 {
            let m = source.sample();
            assert!((2.0..6.0).contains(&m.density));
            assert!((40..100).contains(&m.flow_rate));
            assert!((1.0..1.8).contains(&m.velocity));
            assert!((0.0..100.0).contains(&m.anomaly_score));
        }
    }
}
