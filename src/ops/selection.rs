//! The active filter/sort selection and the read path for its task list.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::io::transport::{Transport, TransportError};
use crate::model::query::{QueryKey, Selection, derive_key};
use crate::model::task::Task;
use crate::ops::cache::{CacheStore, FetchTicket};

pub struct SelectionState {
    cache: Arc<CacheStore>,
    transport: Arc<dyn Transport>,
    selection: watch::Sender<Selection>,
    key: watch::Sender<QueryKey>,
}

impl SelectionState {
    pub fn new(cache: Arc<CacheStore>, transport: Arc<dyn Transport>, initial: Selection) -> Self {
        let key = derive_key(&initial);
        SelectionState {
            cache,
            transport,
            selection: watch::Sender::new(initial),
            key: watch::Sender::new(key),
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection.borrow().clone()
    }

    /// Key of the active selection
    pub fn key(&self) -> QueryKey {
        self.key.borrow().clone()
    }

    /// Watch the active key. Only changes of the derived key are published,
    /// so an edit that normalises to the same key is silent.
    pub fn subscribe(&self) -> watch::Receiver<QueryKey> {
        self.key.subscribe()
    }

    /// Edit the selection in place. Returns true if the active key changed.
    pub fn update(&self, edit: impl FnOnce(&mut Selection)) -> bool {
        self.selection.send_modify(edit);
        let next = derive_key(&self.selection.borrow());
        let changed = self.key.send_if_modified(|key| {
            if *key == next {
                return false;
            }
            *key = next;
            true
        });
        if changed {
            debug!(key = %*self.key.borrow(), "active selection changed");
        }
        changed
    }

    pub fn set(&self, selection: Selection) -> bool {
        self.update(|current| *current = selection)
    }

    /// Tasks for the active key: the cached list when fresh, otherwise a
    /// fetch. `Ok(None)` means the response arrived after the selection moved
    /// on, or after a newer fetch or local write, and was dropped.
    pub async fn load(&self) -> Result<Option<Arc<Vec<Task>>>, TransportError> {
        let key = self.key();
        if !self.cache.needs_fetch(&key) {
            return Ok(self.cache.get(&key));
        }
        self.fetch(self.cache.begin_fetch(&key)).await
    }

    /// Fetch the active key even if the cached entry is fresh.
    pub async fn refresh(&self) -> Result<Option<Arc<Vec<Task>>>, TransportError> {
        let key = self.key();
        self.fetch(self.cache.begin_fetch(&key)).await
    }

    async fn fetch(
        &self,
        ticket: FetchTicket,
    ) -> Result<Option<Arc<Vec<Task>>>, TransportError> {
        let key = ticket.key().clone();
        debug!(key = %key, "fetching task list");
        let tasks = self.transport.list(key.list_params()).await?;

        if *self.key.borrow() != key {
            debug!(key = %key, "discarding list for inactive selection");
            return Ok(None);
        }
        if !self.cache.complete_fetch(ticket, tasks) {
            return Ok(None);
        }
        Ok(self.cache.get(&key))
    }
}
