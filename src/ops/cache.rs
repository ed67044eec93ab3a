//! In-memory cache of task lists, one entry per [`QueryKey`].
//!
//! Entries are only ever replaced whole. Readers get an `Arc` to an immutable
//! list, so a replacement is atomic from their point of view.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::model::query::QueryKey;
use crate::model::task::Task;

const EVENT_CAPACITY: usize = 64;

/// Change notification for cache subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// The entry for this key was replaced
    Updated(QueryKey),
    /// Every entry under this tag was marked stale
    Invalidated(&'static str),
}

/// Proof that a fetch for `key` was started at a given point in time
#[derive(Debug, Clone)]
pub struct FetchTicket {
    key: QueryKey,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug)]
struct Entry {
    tasks: Arc<Vec<Task>>,
    stale: bool,
    /// Clock value of the last write
    written_at: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    /// Clock value of the newest fetch started per key
    fetches: HashMap<QueryKey, u64>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn store(&mut self, key: &QueryKey, tasks: Arc<Vec<Task>>, stale: bool) {
        let written_at = self.tick();
        self.entries.insert(
            key.clone(),
            Entry {
                tasks,
                stale,
                written_at,
            },
        );
    }
}

#[derive(Debug)]
pub struct CacheStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        CacheStore {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    // Entries are replaced whole, so a poisoned lock still guards consistent data
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, event: CacheEvent) {
        trace!(?event, "cache event");
        // No receivers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Last known list for `key`, stale or not
    pub fn get(&self, key: &QueryKey) -> Option<Arc<Vec<Task>>> {
        self.read().entries.get(key).map(|e| Arc::clone(&e.tasks))
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.read().entries.get(key).is_some_and(|e| e.stale)
    }

    /// True when a read of `key` has to go to the server
    pub fn needs_fetch(&self, key: &QueryKey) -> bool {
        self.read().entries.get(key).is_none_or(|e| e.stale)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole entry for `key`.
    ///
    /// Freshness is kept as it was: writing optimistic data into a stale
    /// entry does not make it fresh. A new entry starts fresh. Any fetch for
    /// `key` started before this write will be dropped on arrival.
    pub fn set(&self, key: &QueryKey, tasks: impl Into<Arc<Vec<Task>>>) {
        {
            let mut inner = self.write();
            let stale = inner.entries.get(key).is_some_and(|e| e.stale);
            inner.store(key, tasks.into(), stale);
        }
        debug!(key = %key, "cache entry replaced");
        self.notify(CacheEvent::Updated(key.clone()));
    }

    /// Drop the entry for `key`, so the next read has to fetch it.
    pub fn remove(&self, key: &QueryKey) {
        let removed = self.write().entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "cache entry removed");
            self.notify(CacheEvent::Updated(key.clone()));
        }
    }

    /// Mark every entry whose key carries `tag` as stale.
    pub fn invalidate(&self, tag: &'static str) {
        let count = {
            let mut inner = self.write();
            let mut count = 0;
            for (key, entry) in inner.entries.iter_mut() {
                if key.tag() == tag {
                    entry.stale = true;
                    count += 1;
                }
            }
            count
        };
        debug!(tag, entries = count, "cache invalidated");
        self.notify(CacheEvent::Invalidated(tag));
    }

    /// Register a fetch for `key`. Starting a fetch supersedes any earlier
    /// one still in flight for the same key.
    pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
        let mut inner = self.write();
        let generation = inner.tick();
        inner.fetches.insert(key.clone(), generation);
        FetchTicket {
            key: key.clone(),
            generation,
        }
    }

    /// Store a fetch result as the fresh entry for its key.
    ///
    /// Returns false, and leaves the cache alone, when a newer fetch for the
    /// key has started or the entry was written after the ticket was issued.
    pub fn complete_fetch(&self, ticket: FetchTicket, tasks: Vec<Task>) -> bool {
        {
            let mut inner = self.write();
            if inner.fetches.get(&ticket.key) != Some(&ticket.generation) {
                debug!(key = %ticket.key, "dropping superseded fetch");
                return false;
            }
            inner.fetches.remove(&ticket.key);
            if inner
                .entries
                .get(&ticket.key)
                .is_some_and(|e| e.written_at > ticket.generation)
            {
                debug!(key = %ticket.key, "dropping fetch overtaken by a local write");
                return false;
            }
            inner.store(&ticket.key, Arc::new(tasks), false);
        }
        debug!(key = %ticket.key, "cache entry fetched");
        self.notify(CacheEvent::Updated(ticket.key));
        true
    }
}
