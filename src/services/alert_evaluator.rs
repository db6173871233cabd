//! Alert evaluation for incoming samples
//!
//! Policy: when density exceeds the threshold, a uniform draw must also
//! exceed `trigger_above` (≈30% of crossings with the defaults). The draw is
//! only taken when the density condition holds.

use crate::domain::types::{Alert, AlertCategory, CrowdMetric, Severity};
use crate::infra::config::Config;
use crate::services::random::RandomSource;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    pub density_threshold: f64,
    pub trigger_above: f64,
    pub location: String,
    pub message: String,
}

impl AlertPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            density_threshold: config.density_threshold(),
            trigger_above: config.alert_trigger_above(),
            location: config.alert_location().to_string(),
            message: config.alert_message().to_string(),
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct AlertEvaluator {
    policy: AlertPolicy,
    rng: Arc<dyn RandomSource>,
}

impl AlertEvaluator {
    pub fn new(policy: AlertPolicy, rng: Arc<dyn RandomSource>) -> Self {
        Self { policy, rng }
    }

    /// Decide whether `sample` raises an alert
    pub fn evaluate(&self, sample: &CrowdMetric) -> Option<Alert> {
        if sample.density <= self.policy.density_threshold {
            return None;
        }

        let draw = self.rng.next_f64();
        if draw <= self.policy.trigger_above {
            debug!(density = %sample.density, draw = %draw, "alert_not_triggered");
            return None;
        }

        Some(Alert::new(
            self.policy.location.clone(),
            Severity::High,
            AlertCategory::HighDensity,
            self.policy.message.clone(),
        ))
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::random::{ScriptedRandom, SeededRandom};
    use chrono::Utc;

    fn metric(density: f64) -> CrowdMetric {
        CrowdMetric {
            location: "MAIN_GATE".to_string(),
            density,
            flow_rate: 70,
            velocity: 1.3,
            anomaly_score: 40.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_triggers_on_high_draw() {
        let evaluator =
            AlertEvaluator::new(AlertPolicy::default(), Arc::new(ScriptedRandom::constant(0.71)));
        let alert = evaluator.evaluate(&metric(5.5)).expect("alert expected");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.category, AlertCategory::HighDensity);
        assert_eq!(alert.location, "East Corridor 4B");
        assert!(alert.message.contains("Bottleneck"));
    }

    #[test]
    fn test_no_trigger_on_low_draw() {
        let evaluator =
            AlertEvaluator::new(AlertPolicy::default(), Arc::new(ScriptedRandom::constant(0.69)));
        assert!(evaluator.evaluate(&metric(5.5)).is_none());
    }

    #[test]
    fn test_draw_equal_to_threshold_does_not_trigger() {
        let evaluator =
            AlertEvaluator::new(AlertPolicy::default(), Arc::new(ScriptedRandom::constant(0.7)));
        assert!(evaluator.evaluate(&metric(5.5)).is_none());
    }

    #[test]
    fn test_density_at_threshold_never_draws() {
        let rng = Arc::new(ScriptedRandom::new([0.99], 0.99));
        let evaluator = AlertEvaluator::new(AlertPolicy::default(), rng.clone());
        assert!(evaluator.evaluate(&metric(5.0)).is_none());
        assert!(evaluator.evaluate(&metric(2.0)).is_none());
        assert_eq!(rng.remaining(), 1, "random source must not be consumed");
    }

    #[test]
    fn test_alert_ids_are_distinct() {
        let evaluator =
            AlertEvaluator::new(AlertPolicy::default(), Arc::new(ScriptedRandom::constant(0.9)));
        let a = evaluator.evaluate(&metric(5.9)).unwrap();
        let b = evaluator.evaluate(&metric(5.9)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_trigger_rate_converges_to_thirty_percent() {
        let evaluator =
            AlertEvaluator::new(AlertPolicy::default(), Arc::new(SeededRandom::new(0xC0FFEE)));
        let n = 20_000;
        let triggered = (0..n).filter(|_| evaluator.evaluate(&metric(5.5)).is_some()).count();
        let rate = triggered as f64 / n as f64;

        // Binomial sd at p=0.3, n=20000 is ~0.0032; allow ~6 sd
        assert!((rate - 0.3).abs() < 0.02, "empirical rate {rate} too far from 0.3");
    }
}
