//! Built-in [`EventHandler`] implementations wired up by `sidecar start`.
//!
//! Grounded on the C4 internal pipeline diagram (`HTTP handler → Sampler →
//! Observer → worker pool → Handlers → Persistence`): the only handler
//! `crossbridge` ships by default forwards every drained event to the
//! persistence façade, matching `offload`'s own pattern of thin adapter
//! structs around an already-narrow trait (`cache::ImageCache`).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::persistence::Persistence;

use super::events::ObservedEvent;
use super::worker::EventHandler;

/// Forwards each observed event to [`Persistence::save_event_batch`] as a
/// single-element batch. Persistence failures are swallowed at the call
/// site (spool replay is the backend's job, per C6); this handler only
/// reports them upward so the worker can count them toward error rate.
pub struct PersistenceEventHandler {
    persistence: Arc<dyn Persistence>,
}

impl PersistenceEventHandler {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl EventHandler for PersistenceEventHandler {
    async fn handle(&self, event: &ObservedEvent) -> Result<(), anyhow::Error> {
        let value = serde_json::to_value(event)?;
        self.persistence.save_event_batch(&[value]).await.map_err(|e| {
            warn!(error = %e, "failed to persist sidecar event");
            anyhow::anyhow!(e)
        })
    }
}
