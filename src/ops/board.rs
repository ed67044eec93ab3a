use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::io::transport::{Transport, TransportError};
use crate::model::query::{QueryKey, Selection};
use crate::model::task::{NewTask, Task, TaskPatch, ToggleField, ToggleIntent};
use crate::ops::cache::{CacheEvent, CacheStore};
use crate::ops::mutation::{MutationCoordinator, MutationError};
use crate::ops::selection::SelectionState;

/// The task board a front end drives: one cache, the active selection, the
/// mutation coordinator, and the latest-error slot.
///
/// Every read and write issued through the board settles into the error
/// slot: a failure stores its message, a success clears it.
pub struct Board {
    cache: Arc<CacheStore>,
    selection: SelectionState,
    mutations: MutationCoordinator,
    error: watch::Sender<Option<String>>,
}

impl Board {
    pub fn new(transport: Arc<dyn Transport>, initial: Selection) -> Self {
        let cache = Arc::new(CacheStore::new());
        Board {
            selection: SelectionState::new(Arc::clone(&cache), Arc::clone(&transport), initial),
            mutations: MutationCoordinator::new(Arc::clone(&cache), transport),
            cache,
            error: watch::Sender::new(None),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn selection(&self) -> Selection {
        self.selection.selection()
    }

    pub fn key(&self) -> QueryKey {
        self.selection.key()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    /// What the active view shows right now, without touching the network
    pub fn tasks(&self) -> Arc<Vec<Task>> {
        self.cache.get(&self.key()).unwrap_or_default()
    }

    /// Edit the selection. Returns true if the active key changed.
    pub fn select(&self, edit: impl FnOnce(&mut Selection)) -> bool {
        self.selection.update(edit)
    }

    /// Load the active view, fetching it when absent or stale.
    pub async fn list(&self) -> Result<Arc<Vec<Task>>, TransportError> {
        let result = self.selection.load().await;
        self.record(&result);
        Ok(result?.unwrap_or_else(|| self.tasks()))
    }

    /// Fetch the active view even if the cached entry is fresh.
    pub async fn refresh(&self) -> Result<Arc<Vec<Task>>, TransportError> {
        let result = self.selection.refresh().await;
        self.record(&result);
        Ok(result?.unwrap_or_else(|| self.tasks()))
    }

    /// Refetch the active view if an invalidation left it stale.
    /// Returns true if a fetch was made.
    pub async fn refresh_if_stale(&self) -> Result<bool, TransportError> {
        if !self.cache.needs_fetch(&self.key()) {
            return Ok(false);
        }
        self.list().await?;
        Ok(true)
    }

    pub async fn create(&self, input: NewTask) -> Result<Task, MutationError> {
        let result = self.mutations.create(&self.key(), input).await;
        self.record(&result);
        result
    }

    pub async fn toggle(
        &self,
        id: &str,
        field: ToggleField,
        intent: ToggleIntent,
    ) -> Result<Task, MutationError> {
        let result = self.mutations.toggle(&self.key(), id, field, intent).await;
        self.record(&result);
        result
    }

    pub async fn remove(&self, id: &str) -> Result<(), MutationError> {
        let result = self.mutations.remove(&self.key(), id).await;
        self.record(&result);
        result
    }

    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, MutationError> {
        let result = self.mutations.update(id, patch).await;
        self.record(&result);
        result
    }

    pub fn in_flight(&self) -> usize {
        self.mutations.in_flight()
    }

    /// Watch the latest-error slot
    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    fn record<T, E: Display>(&self, result: &Result<T, E>) {
        let next = result.as_ref().err().map(|e| e.to_string());
        if let Some(message) = &next {
            debug!(error = %message, "latest error replaced");
        }
        self.error.send_replace(next);
    }
}
