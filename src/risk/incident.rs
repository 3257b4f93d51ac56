//! Incident audit records

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentCategory {
    KillSwitch,
    DailyDrawdown,
    ConsecutiveLosses,
    Persistence,
    System,
}

/// One governor action or operational failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub timestamp: i64,
    pub severity: Severity,
    pub category: IncidentCategory,
    pub message: String,
    pub auto_action: Option<String>,
    pub resolved: bool,
}

impl Incident {
    pub fn new(severity: Severity, category: IncidentCategory, message: impl Into<String>, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now,
            severity,
            category,
            message: message.into(),
            auto_action: None,
            resolved: false,
        }
    }

    pub fn with_auto_action(mut self, action: impl Into<String>) -> Self {
        self.auto_action = Some(action.into());
        self
    }

    pub fn resolved(mut self) -> Self {
        self.resolved = true;
        self
    }
}
