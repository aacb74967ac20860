use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// How an instance decides when to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Publish every time a tracked entity changes.
    Realtime,
    /// Publish all tracked entities on a fixed period.
    Polling(Duration),
}

impl PublishMode {
    /// Zero or negative intervals select real-time publishing.
    pub fn from_interval_seconds(seconds: i64) -> Self {
        match u64::try_from(seconds) {
            Ok(secs) if secs > 0 => PublishMode::Polling(Duration::from_secs(secs)),
            _ => PublishMode::Realtime,
        }
    }
}

/// Immutable settings of one publisher instance.
#[derive(Clone, PartialEq)]
pub struct PublisherConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub post_type: String,
    pub custom_fields: Map<String, Value>,
    pub mode: PublishMode,
    pub entities: BTreeSet<String>,
}

impl fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("post_type", &self.post_type)
            .field("custom_fields", &self.custom_fields)
            .field("mode", &self.mode)
            .field("entities", &self.entities)
            .finish_non_exhaustive()
    }
}

impl PublisherConfig {
    pub fn tracks(&self, entity_id: &str) -> bool {
        self.entities.contains(entity_id)
    }
}

/// Parse the custom-fields setting, a JSON object encoded as a string.
///
/// Anything that is not a JSON object degrades to an empty mapping.
pub fn parse_custom_fields(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            warn!(kind = json_kind(&other), "custom_fields is not a JSON object; using no custom fields");
            Map::new()
        }
        Err(err) => {
            warn!(%err, "failed to parse custom_fields as JSON; using no custom fields");
            Map::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of the most recent publish attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub last_published_entity: Option<String>,
    pub last_published_time: Option<DateTime<Utc>>,
    pub last_publish_error: Option<String>,
    /// Bumped on every recorded attempt; later writes always carry a larger value.
    pub revision: u64,
}

impl PublishOutcome {
    pub fn record_success(&mut self, entity_id: &str, at: DateTime<Utc>) {
        self.last_published_entity = Some(entity_id.to_string());
        self.last_published_time = Some(at);
        self.last_publish_error = None;
        self.revision += 1;
    }

    /// Keeps the previous success timestamp and entity.
    pub fn record_failure(&mut self, description: String) {
        self.last_publish_error = Some(description);
        self.revision += 1;
    }
}

/// A state-change notification. `new_state` is `None` when the entity was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<String>,
}
