//! Trigger dispatch: real-time change forwarding and scheduled batches.
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::publisher::Publisher;
use crate::states::{StateRegistry, StateSubscriber, SubscriptionId};

/// Forwards changes of tracked entities to the publisher without blocking the feed.
pub struct RealtimeDispatcher {
    publisher: Arc<Publisher>,
    runtime: Handle,
}

impl RealtimeDispatcher {
    /// Must be called from within a tokio runtime.
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self {
            publisher,
            runtime: Handle::current(),
        }
    }
}

impl StateSubscriber for RealtimeDispatcher {
    fn on_state_changed(&self, entity_id: &str, new_state: Option<&str>) {
        let Some(new_state) = new_state else {
            return;
        };
        if !self.publisher.tracks(entity_id) {
            return;
        }
        let publisher = Arc::clone(&self.publisher);
        let entity_id = entity_id.to_string();
        let new_state = new_state.to_string();
        self.runtime.spawn(async move {
            // Failure is already logged and recorded in the outcome.
            let _ = publisher.publish(&entity_id, &new_state).await;
        });
    }
}

/// Run `publish_batch` every `period`, starting one period from now.
pub fn spawn_polling(
    publisher: Arc<Publisher>,
    states: Arc<dyn StateRegistry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let now = Instant::now();
        // Periods too large for the clock never fire.
        let Some(start) = now.checked_add(period) else {
            warn!(?period, "polling period out of range; scheduled publishing disabled");
            return;
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, "scheduled publishing started");
        loop {
            ticker.tick().await;
            match publisher.publish_batch(states.as_ref()).await {
                Ok(published) => debug!(count = published.len(), "scheduled publish finished"),
                Err(err) => warn!(%err, "scheduled publish failed"),
            }
        }
    })
}

/// Live trigger of one instance; released on teardown.
#[derive(Debug)]
pub enum Dispatch {
    Realtime(SubscriptionId),
    Polling(JoinHandle<()>),
}
