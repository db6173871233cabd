//! Shared types for crowd monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Ordered risk level, LOW < MEDIUM < HIGH < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert category tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCategory {
    Bottleneck,
    HighDensity,
    ReverseFlow,
    AbnormalSpeed,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 4] = [
        AlertCategory::Bottleneck,
        AlertCategory::HighDensity,
        AlertCategory::ReverseFlow,
        AlertCategory::AbnormalSpeed,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Bottleneck => "BOTTLENECK",
            AlertCategory::HighDensity => "HIGH_DENSITY",
            AlertCategory::ReverseFlow => "REVERSE_FLOW",
            AlertCategory::AbnormalSpeed => "ABNORMAL_SPEED",
        }
    }
}

/// One crowd observation at a monitored site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdMetric {
    /// Site identifier (e.g. "MAIN_GATE")
    pub location: String,
    /// People per square metre
    pub density: f64,
    /// People per minute
    pub flow_rate: u32,
    /// Average speed in m/s
    pub velocity: f64,
    /// 0-100
    pub anomaly_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// A raised alert, alive until acknowledged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub severity: Severity,
    pub message: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
}

impl Alert {
    /// Create an alert with a fresh time-ordered id
    pub fn new(
        location: impl Into<String>,
        severity: Severity,
        category: AlertCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: new_uuid_v7(),
            timestamp: Utc::now(),
            location: location.into(),
            severity,
            message: message.into(),
            category,
        }
    }
}

const INITIAL_PREDICTION: &str = "System initializing. Monitoring crowd baseline...";
const OFFLINE_PREDICTION: &str = "System operating in offline mode. Manual monitoring active.";
const UNAVAILABLE_PREDICTION: &str =
    "Unable to process real-time AI prediction. Relying on manual thresholds.";

/// Current risk narrative for a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    #[serde(rename = "riskLevel", alias = "severity")]
    pub severity: Severity,
    pub prediction: String,
    pub recommendations: Vec<String>,
}

impl RiskAnalysis {
    /// Placeholder shown before the first analysis cycle completes
    pub fn initializing() -> Self {
        Self {
            severity: Severity::Low,
            prediction: INITIAL_PREDICTION.to_string(),
            recommendations: vec![
                "Ensure all camera feeds are active.".to_string(),
                "Verify personnel station assignments.".to_string(),
            ],
        }
    }

    /// Substitute used when external scoring is switched off
    pub fn offline() -> Self {
        Self {
            severity: Severity::Low,
            prediction: OFFLINE_PREDICTION.to_string(),
            recommendations: vec![
                "Monitor crowd density manually.".to_string(),
                "Ensure emergency protocols are ready.".to_string(),
            ],
        }
    }

    /// Substitute used when the scoring capability fails or times out
    pub fn unavailable() -> Self {
        Self {
            severity: Severity::Low,
            prediction: UNAVAILABLE_PREDICTION.to_string(),
            recommendations: vec![
                "Ensure all exit routes are clear.".to_string(),
                "Deploy additional personnel to bottlenecks.".to_string(),
            ],
        }
    }
}

/// Crowd size band derived from a head count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrowdCategory {
    Good,
    Average,
    High,
}

impl CrowdCategory {
    /// GOOD up to 5 people (counts below 4 included), AVERAGE up to 25, HIGH above
    pub fn from_total(total_people: u32) -> Self {
        match total_people {
            0..=5 => CrowdCategory::Good,
            6..=25 => CrowdCategory::Average,
            _ => CrowdCategory::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdCategory::Good => "GOOD",
            CrowdCategory::Average => "AVERAGE",
            CrowdCategory::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenderCount {
    pub boys: u32,
    pub girls: u32,
}

/// Location tag stamped on every video estimate
pub const VIDEO_ANALYSIS_LOCATION: &str = "VIDEO_ANALYSIS";

/// Crowd estimate for one video asset
///
/// Fields are private: the breakdown always sums to the total and the
/// category is always derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdAnalysisResult {
    total_people: u32,
    category: CrowdCategory,
    gender_breakdown: GenderCount,
    timestamp: DateTime<Utc>,
    location: String,
}

impl CrowdAnalysisResult {
    /// Build a result from a total and the first subgroup; the second subgroup
    /// takes the remainder. `boys` is clamped to the total.
    pub fn new(total_people: u32, boys: u32) -> Self {
        let boys = boys.min(total_people);
        Self {
            total_people,
            category: CrowdCategory::from_total(total_people),
            gender_breakdown: GenderCount { boys, girls: total_people - boys },
            timestamp: Utc::now(),
            location: VIDEO_ANALYSIS_LOCATION.to_string(),
        }
    }

    pub fn total_people(&self) -> u32 {
        self.total_people
    }

    pub fn category(&self) -> CrowdCategory {
        self.category
    }

    pub fn gender_breakdown(&self) -> GenderCount {
        self.gender_breakdown
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

/// Per-frame inference output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameObservation {
    #[serde(default, alias = "peopleCount")]
    pub people: u32,
    #[serde(default, alias = "subgroupA")]
    pub boys: u32,
    #[serde(default, alias = "subgroupB")]
    pub girls: u32,
}

impl FrameObservation {
    pub const fn new(people: u32, boys: u32, girls: u32) -> Self {
        Self { people, boys, girls }
    }

    /// Contribution of a frame whose inference failed
    pub const fn zero() -> Self {
        Self { people: 0, boys: 0, girls: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(CrowdCategory::from_total(0), CrowdCategory::Good);
        assert_eq!(CrowdCategory::from_total(3), CrowdCategory::Good);
        assert_eq!(CrowdCategory::from_total(4), CrowdCategory::Good);
        assert_eq!(CrowdCategory::from_total(5), CrowdCategory::Good);
        assert_eq!(CrowdCategory::from_total(6), CrowdCategory::Average);
        assert_eq!(CrowdCategory::from_total(25), CrowdCategory::Average);
        assert_eq!(CrowdCategory::from_total(26), CrowdCategory::High);
    }

    #[test]
    fn test_result_breakdown_sums_to_total() {
        let result = CrowdAnalysisResult::new(15, 7);
        assert_eq!(result.gender_breakdown(), GenderCount { boys: 7, girls: 8 });
        assert_eq!(result.category(), CrowdCategory::Average);

        // Oversized subgroup is clamped rather than underflowing
        let clamped = CrowdAnalysisResult::new(3, 9);
        assert_eq!(clamped.gender_breakdown(), GenderCount { boys: 3, girls: 0 });
    }

    #[test]
    fn test_alert_serializes_category_as_type() {
        let alert = Alert::new("East Corridor 4B", Severity::High, AlertCategory::HighDensity, "x");
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "HIGH_DENSITY");
        assert_eq!(json["severity"], "HIGH");
    }

    #[test]
    fn test_risk_analysis_parses_scorer_payload() {
        let payload = r#"{"riskLevel":"CRITICAL","prediction":"Crush risk at gate","recommendations":["Close gate 2"]}"#;
        let analysis: RiskAnalysis = serde_json::from_str(payload).unwrap();
        assert_eq!(analysis.severity, Severity::Critical);
        assert_eq!(analysis.recommendations, vec!["Close gate 2".to_string()]);

        // Unknown severity is a malformed payload
        let bad = r#"{"riskLevel":"EXTREME","prediction":"","recommendations":[]}"#;
        assert!(serde_json::from_str::<RiskAnalysis>(bad).is_err());
    }

    #[test]
    fn test_frame_observation_accepts_both_field_styles() {
        let a: FrameObservation = serde_json::from_str(r#"{"people":4,"boys":1,"girls":3}"#).unwrap();
        let b: FrameObservation =
            serde_json::from_str(r#"{"peopleCount":4,"subgroupA":1,"subgroupB":3}"#).unwrap();
        assert_eq!(a, b);
    }
}
