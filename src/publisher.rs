use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::model::{PublishOutcome, PublisherConfig};
use crate::states::StateRegistry;
use crate::status::PublishStatus;
use crate::wordpress::{PublishError, PublishRequest, WordPressClient, WordPressService};

/// Publishes entity states to one WordPress site and remembers the last outcome.
pub struct Publisher {
    config: PublisherConfig,
    service: Arc<dyn WordPressService>,
    outcome: Mutex<PublishOutcome>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("config", &self.config)
            .field("outcome", &*self.outcome.lock())
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(config: PublisherConfig, service: Arc<dyn WordPressService>) -> Self {
        Self {
            config,
            service,
            outcome: Mutex::new(PublishOutcome::default()),
        }
    }

    /// Publisher backed by a real HTTP client.
    pub fn from_config(config: PublisherConfig) -> Result<Self, PublishError> {
        let client = WordPressClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn tracks(&self, entity_id: &str) -> bool {
        self.config.tracks(entity_id)
    }

    pub fn outcome(&self) -> PublishOutcome {
        self.outcome.lock().clone()
    }

    pub fn status(&self) -> PublishStatus {
        PublishStatus::from_outcome(&self.outcome.lock())
    }

    /// Make exactly one delivery attempt for `entity_id` and record its outcome.
    #[instrument(skip(self, new_state), fields(post_type = %self.config.post_type))]
    pub async fn publish(&self, entity_id: &str, new_state: &str) -> Result<(), PublishError> {
        let request = PublishRequest::build(entity_id, new_state, &self.config.custom_fields);
        match self.service.create_post(&request).await {
            Ok(post_id) => {
                info!(?post_id, "published state to WordPress");
                self.outcome.lock().record_success(entity_id, Utc::now());
                Ok(())
            }
            Err(err) => {
                error!(%err, "error publishing state to WordPress");
                self.outcome.lock().record_failure(err.to_string());
                Err(err)
            }
        }
    }

    /// Publish the current value of every tracked entity, one after another.
    ///
    /// Entities missing from `states` are skipped. The first failed delivery
    /// ends the batch.
    #[instrument(skip_all, fields(post_type = %self.config.post_type))]
    pub async fn publish_batch(
        &self,
        states: &dyn StateRegistry,
    ) -> Result<BTreeMap<String, String>, PublishError> {
        debug!("scheduled publishing triggered");
        let mut snapshot = BTreeMap::new();
        for entity_id in &self.config.entities {
            match states.state(entity_id) {
                Some(state) => {
                    snapshot.insert(entity_id.clone(), state);
                }
                None => warn!(%entity_id, "entity not found in state registry"),
            }
        }

        for (entity_id, state) in &snapshot {
            self.publish(entity_id, state).await?;
        }
        Ok(snapshot)
    }
}
