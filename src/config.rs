//! Configuration loader and validator for the WordPress publisher.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{parse_custom_fields, PublishMode, PublisherConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub instances: Vec<EntryConfig>,
}

/// Service-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
}

impl Default for App {
    fn default() -> Self {
        Self {
            status_interval_seconds: default_status_interval(),
        }
    }
}

fn default_status_interval() -> u64 {
    300
}

/// One publisher instance, keyed the same way the integration stores its entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryConfig {
    pub wp_url: String,
    pub wp_user: String,
    pub wp_password: String,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    /// JSON object encoded as a string, e.g. `{"source": "home"}`.
    #[serde(default)]
    pub custom_fields: String,
    /// Seconds between scheduled publishes; zero or negative means real-time.
    #[serde(default)]
    pub publish_interval: i64,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Longest accepted polling period: one year.
pub const MAX_PUBLISH_INTERVAL_SECONDS: i64 = 365 * 24 * 60 * 60;

fn default_post_type() -> String {
    "posts".to_string()
}

impl EntryConfig {
    /// Identity used to refuse configuring the same site and account twice.
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.wp_url, self.wp_user)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wp_url.trim().is_empty() {
            return Err(ConfigError::Invalid("wp_url must be non-empty"));
        }
        match Url::parse(&self.wp_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::Invalid("wp_url must be an http or https URL")),
        }
        if self.wp_user.trim().is_empty() {
            return Err(ConfigError::Invalid("wp_user must be non-empty"));
        }
        if self.wp_password.is_empty() {
            return Err(ConfigError::Invalid("wp_password must be non-empty"));
        }
        if self.post_type.trim().trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("post_type must be non-empty"));
        }
        if self.publish_interval > MAX_PUBLISH_INTERVAL_SECONDS {
            return Err(ConfigError::Invalid("publish_interval must be at most one year"));
        }
        if self.entities.iter().any(|e| e.trim().is_empty()) {
            return Err(ConfigError::Invalid("entities must not contain empty ids"));
        }
        Ok(())
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            base_url: self.wp_url.clone(),
            username: self.wp_user.clone(),
            password: self.wp_password.clone(),
            post_type: self.post_type.clone(),
            custom_fields: parse_custom_fields(&self.custom_fields),
            mode: PublishMode::from_interval_seconds(self.publish_interval),
            entities: self.entities.iter().cloned().collect(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.status_interval_seconds == 0 {
        return Err(ConfigError::Invalid("app.status_interval_seconds must be > 0"));
    }
    if cfg.instances.is_empty() {
        return Err(ConfigError::Invalid("instances must contain at least one entry"));
    }
    for entry in &cfg.instances {
        entry.validate()?;
    }
    Ok(())
}

/// Example configuration covering both publishing modes.
pub fn example() -> &'static str {
    r#"app:
  status_interval_seconds: 300

instances:
  # Real-time: publish on every state change.
  - wp_url: "https://blog.example.com"
    wp_user: "publisher"
    wp_password: "APPLICATION_PASSWORD"
    post_type: "posts"
    custom_fields: '{"source": "home-assistant", "room": "living"}'
    publish_interval: 0
    entities:
      - sensor.temperature
      - sensor.humidity

  # Polling: publish every tracked entity once a minute.
  - wp_url: "https://data.example.com/"
    wp_user: "collector"
    wp_password: "APPLICATION_PASSWORD"
    post_type: "/sensor_data/"
    publish_interval: 60
    entities:
      - sensor.power
"#
}
