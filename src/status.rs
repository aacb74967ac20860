use serde::Serialize;
use std::fmt;

use crate::model::PublishOutcome;

/// Tri-state label derived from the last publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Idle,
    Ok,
    Error,
}

impl PublishStatus {
    /// An error wins over everything else; nothing published yet is idle.
    pub fn from_outcome(outcome: &PublishOutcome) -> Self {
        if outcome.last_publish_error.is_some() {
            PublishStatus::Error
        } else if outcome.last_published_entity.is_none() {
            PublishStatus::Idle
        } else {
            PublishStatus::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Idle => "idle",
            PublishStatus::Ok => "ok",
            PublishStatus::Error => "error",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            PublishStatus::Idle => "mdi:information",
            PublishStatus::Ok => "mdi:check-circle",
            PublishStatus::Error => "mdi:alert-circle",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status entity view of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub unique_id: String,
    pub state: PublishStatus,
    pub icon: &'static str,
    pub last_published_entity: Option<String>,
    pub last_published_time: Option<String>,
    pub last_publish_error: Option<String>,
}

impl StatusReport {
    pub fn new(instance_id: &str, outcome: &PublishOutcome) -> Self {
        let state = PublishStatus::from_outcome(outcome);
        Self {
            unique_id: format!("{instance_id}_wp_publisher_status"),
            state,
            icon: state.icon(),
            last_published_entity: outcome.last_published_entity.clone(),
            last_published_time: outcome.last_published_time.map(|t| t.to_rfc3339()),
            last_publish_error: outcome.last_publish_error.clone(),
        }
    }
}
