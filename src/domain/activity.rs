//! Activity log records
//!
//! Discrete events handed to the activity logger. The core never waits on
//! the logger; records are built here and sent fire-and-forget.

use crate::domain::types::{new_uuid_v7, Severity};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Metric,
    Alert,
    Analysis,
    System,
    UserAction,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Metric => "METRIC",
            ActivityKind::Alert => "ALERT",
            ActivityKind::Analysis => "ANALYSIS",
            ActivityKind::System => "SYSTEM",
            ActivityKind::UserAction => "USER_ACTION",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub id: String,
    /// RFC 3339 capture time
    pub ts: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub site: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub data: serde_json::Value,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, site: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: new_uuid_v7(),
            ts: Utc::now().to_rfc3339(),
            kind,
            site: site.into(),
            location: None,
            severity: None,
            data,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}
