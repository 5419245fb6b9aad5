//! Concurrency-safe registry of active and completed runs.
//!
//! The registry tables are the only state touched by more than one task:
//! lookups from request handlers race with inserts from run starts, so both
//! maps sit behind async locks. Everything inside one `RunContext` is
//! single-writer during the automatic phases and review mutations serialize
//! on the per-run lock afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::EventChannel;
use crate::models::RunContext;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),
}

/// Shared table of run contexts and their event channels, keyed by run id.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, Arc<RwLock<RunContext>>>>,
    channels: RwLock<HashMap<Uuid, Arc<EventChannel>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run and its channel, returning shared handles.
    pub async fn insert(
        &self,
        context: RunContext,
        channel: EventChannel,
    ) -> (Arc<RwLock<RunContext>>, Arc<EventChannel>) {
        let run_id = context.run_id;
        let context = Arc::new(RwLock::new(context));
        let channel = Arc::new(channel);
        self.runs
            .write()
            .await
            .insert(run_id, Arc::clone(&context));
        self.channels
            .write()
            .await
            .insert(run_id, Arc::clone(&channel));
        (context, channel)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Arc<RwLock<RunContext>>, RegistryError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(RegistryError::RunNotFound(run_id))
    }

    pub async fn channel(&self, run_id: Uuid) -> Result<Arc<EventChannel>, RegistryError> {
        self.channels
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(RegistryError::RunNotFound(run_id))
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}
