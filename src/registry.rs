//! Owns every configured publisher instance and its trigger.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ConfigError, EntryConfig};
use crate::dispatch::{spawn_polling, Dispatch, RealtimeDispatcher};
use crate::model::{PublishMode, PublisherConfig};
use crate::publisher::Publisher;
use crate::states::{StateRegistry, StateStore};
use crate::status::StatusReport;
use crate::wordpress::{PublishError, WordPressClient, WordPressService};

pub type InstanceId = Uuid;

pub type ServiceFactory =
    Box<dyn Fn(&PublisherConfig) -> Result<Arc<dyn WordPressService>, PublishError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("already configured: {0}")]
    AlreadyConfigured(String),
    #[error("failed to create WordPress client: {0}")]
    Client(#[from] PublishError),
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
}

#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    entry: EntryConfig,
    publisher: Arc<Publisher>,
    dispatch: Dispatch,
}

impl Instance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn entry(&self) -> &EntryConfig {
        &self.entry
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::new(&self.id.to_string(), &self.publisher.outcome())
    }
}

pub struct Registry {
    states: Arc<StateStore>,
    factory: ServiceFactory,
    instances: HashMap<InstanceId, Instance>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("states", &self.states)
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Registry whose instances talk to WordPress over HTTP.
    pub fn new(states: Arc<StateStore>) -> Self {
        Self::with_service_factory(
            states,
            Box::new(
                |cfg: &PublisherConfig| -> Result<Arc<dyn WordPressService>, PublishError> {
                    let client = WordPressClient::from_config(cfg)?;
                    Ok(Arc::new(client))
                },
            ),
        )
    }

    pub fn with_service_factory(states: Arc<StateStore>, factory: ServiceFactory) -> Self {
        Self {
            states,
            factory,
            instances: HashMap::new(),
        }
    }

    pub fn get(&self, id: &InstanceId) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn status_reports(&self) -> Vec<StatusReport> {
        self.instances.values().map(Instance::status_report).collect()
    }

    /// Validate `entry`, publish every tracked entity once, then start its trigger.
    ///
    /// A failed initial publish does not fail setup: it is recorded in the
    /// instance's outcome and the next trigger tries again.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn setup(&mut self, entry: EntryConfig) -> Result<InstanceId, SetupError> {
        let id = Uuid::new_v4();
        self.setup_as(id, entry).await?;
        Ok(id)
    }

    #[instrument(skip(self, entry), fields(post_type = %entry.post_type))]
    async fn setup_as(&mut self, id: InstanceId, entry: EntryConfig) -> Result<(), SetupError> {
        entry.validate()?;
        let unique_id = entry.unique_id();
        if self
            .instances
            .values()
            .any(|i| i.id != id && i.entry.unique_id() == unique_id)
        {
            return Err(SetupError::AlreadyConfigured(unique_id));
        }

        let config = entry.publisher_config();
        let mode = config.mode;
        let service = (self.factory)(&config)?;
        let publisher = Arc::new(Publisher::new(config, service));

        // Failures here are recorded in the outcome; the instance still starts.
        if let Err(err) = publisher.publish_batch(&*self.states).await {
            warn!(%err, "initial publish failed");
        }

        let dispatch = match mode {
            PublishMode::Realtime => {
                debug!("publish interval is 0, listening for state changes");
                let dispatcher = RealtimeDispatcher::new(Arc::clone(&publisher));
                Dispatch::Realtime(self.states.subscribe(Arc::new(dispatcher)))
            }
            PublishMode::Polling(period) => {
                let states: Arc<dyn StateRegistry> = self.states.clone();
                Dispatch::Polling(spawn_polling(Arc::clone(&publisher), states, period))
            }
        };

        info!(%id, ?mode, "instance set up");
        self.instances.insert(
            id,
            Instance {
                id,
                entry,
                publisher,
                dispatch,
            },
        );
        Ok(())
    }

    /// Stop the instance's trigger and forget it. Returns false for unknown ids.
    pub fn unload(&mut self, id: &InstanceId) -> bool {
        let Some(instance) = self.instances.remove(id) else {
            return false;
        };
        match instance.dispatch {
            Dispatch::Realtime(subscription) => {
                self.states.unsubscribe(subscription);
            }
            Dispatch::Polling(handle) => handle.abort(),
        }
        debug!(%id, "instance unloaded");
        true
    }

    pub fn unload_all(&mut self) {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        for id in ids {
            self.unload(&id);
        }
    }

    /// Replace an instance's configuration wholesale, keeping its id.
    ///
    /// On failure the instance is left unloaded.
    pub async fn update_options(
        &mut self,
        id: &InstanceId,
        entry: EntryConfig,
    ) -> Result<(), SetupError> {
        entry.validate()?;
        if !self.unload(id) {
            return Err(SetupError::UnknownInstance(*id));
        }
        self.setup_as(*id, entry).await
    }
}
