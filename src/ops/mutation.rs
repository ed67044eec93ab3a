//! Write path: every create, toggle, delete and edit goes through the
//! [`MutationCoordinator`].
//!
//! Optimistic mutations run through
//! `Idle → Applying → InFlight → {Committed | RolledBack} → Settled`:
//! the active entry is snapshotted and speculatively rewritten before the
//! request goes out, then either kept (commit) or restored from the snapshot
//! (rollback). Each mutation owns its own snapshot, so with two in flight
//! on one key the last one to settle decides the entry until the following
//! invalidation brings back server truth.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::io::transport::{Transport, TransportError};
use crate::model::query::{QueryKey, TASKS_TAG};
use crate::model::task::{NewTask, Task, TaskPatch, ToggleField, ToggleIntent};
use crate::ops::cache::CacheStore;
use crate::ops::task_ops::{
    ValidationError, ensure_persisted, prepend, validate_new_task, validate_patch, with_toggled,
    without,
};

/// How a mutation failed. The cache is already settled when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Toggle(ToggleField),
    Delete,
    Update,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Toggle(field) => write!(f, "toggle {}", field.as_str()),
            MutationKind::Delete => write!(f, "delete"),
            MutationKind::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Applying,
    InFlight,
    Committed,
    RolledBack,
    Settled,
}

/// Counts a mutation as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Snapshot and bookkeeping for one optimistic mutation, alive until settle
struct PendingMutation<'a> {
    cache: &'a CacheStore,
    key: QueryKey,
    /// Entry as it was before `apply`; `None` when the key was never loaded
    snapshot: Option<Arc<Vec<Task>>>,
    kind: MutationKind,
    phase: MutationPhase,
    _in_flight: InFlight<'a>,
}

impl<'a> PendingMutation<'a> {
    fn begin(
        cache: &'a CacheStore,
        counter: &'a AtomicUsize,
        key: &QueryKey,
        kind: MutationKind,
    ) -> Self {
        PendingMutation {
            cache,
            key: key.clone(),
            snapshot: cache.get(key),
            kind,
            phase: MutationPhase::Idle,
            _in_flight: InFlight::enter(counter),
        }
    }

    fn base(&self) -> &[Task] {
        self.snapshot.as_deref().map(Vec::as_slice).unwrap_or_default()
    }

    fn advance(&mut self, phase: MutationPhase) {
        debug!(kind = %self.kind, key = %self.key, from = ?self.phase, to = ?phase, "mutation phase");
        self.phase = phase;
    }

    /// Write the speculative entry derived from the snapshot.
    fn apply(&mut self, transform: impl FnOnce(&[Task]) -> Vec<Task>) {
        self.advance(MutationPhase::Applying);
        let next = transform(self.base());
        self.cache.set(&self.key, next);
        self.advance(MutationPhase::InFlight);
    }

    /// Keep the current entry, or replace it with `entry`, and settle.
    fn commit(mut self, entry: Option<Vec<Task>>) {
        self.advance(MutationPhase::Committed);
        if let Some(entry) = entry {
            self.cache.set(&self.key, entry);
        }
        info!(kind = %self.kind, key = %self.key, "mutation committed");
        self.advance(MutationPhase::Settled);
    }

    /// Restore the snapshot exactly and settle. A key that had no entry
    /// loses the speculative one, so the next read goes to the server.
    fn rollback(mut self, error: &TransportError) {
        self.advance(MutationPhase::RolledBack);
        match &self.snapshot {
            Some(snapshot) => self.cache.set(&self.key, Arc::clone(snapshot)),
            None => self.cache.remove(&self.key),
        }
        warn!(kind = %self.kind, key = %self.key, error = %error, "mutation rolled back");
        self.advance(MutationPhase::Settled);
    }
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        // Dropped mid-flight: the server outcome is unknown, refetch to find out
        if self.phase != MutationPhase::Settled {
            warn!(kind = %self.kind, key = %self.key, "mutation abandoned before settling");
            self.cache.invalidate(self.key.tag());
        }
    }
}

pub struct MutationCoordinator {
    cache: Arc<CacheStore>,
    transport: Arc<dyn Transport>,
    in_flight: AtomicUsize,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<CacheStore>, transport: Arc<dyn Transport>) -> Self {
        MutationCoordinator {
            cache,
            transport,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Mutations issued but not yet settled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self, key: &QueryKey, kind: MutationKind) -> PendingMutation<'_> {
        PendingMutation::begin(&self.cache, &self.in_flight, key, kind)
    }

    /// Create a task. A placeholder heads the `key` entry until the server
    /// answers; on success the server's task is prepended to the snapshot
    /// taken before the placeholder went in.
    pub async fn create(&self, key: &QueryKey, input: NewTask) -> Result<Task, MutationError> {
        let input = validate_new_task(input)?;
        let mut pending = self.begin(key, MutationKind::Create);
        let placeholder = Task::placeholder(&input);
        pending.apply(|tasks| prepend(tasks, placeholder));

        match self.transport.create(input).await {
            Ok(created) => {
                let entry = prepend(pending.base(), created.clone());
                pending.commit(Some(entry));
                self.cache.invalidate(TASKS_TAG);
                Ok(created)
            }
            Err(e) => {
                pending.rollback(&e);
                Err(e.into())
            }
        }
    }

    /// Flip or set a boolean field. Every task-list view is invalidated once
    /// the request settles, whatever the outcome.
    pub async fn toggle(
        &self,
        key: &QueryKey,
        id: &str,
        field: ToggleField,
        intent: ToggleIntent,
    ) -> Result<Task, MutationError> {
        ensure_persisted(id)?;
        let mut pending = self.begin(key, MutationKind::Toggle(field));
        pending.apply(|tasks| with_toggled(tasks, id, field, intent));

        let outcome = match self.transport.toggle(id, field, intent).await {
            Ok(task) => {
                pending.commit(None);
                Ok(task)
            }
            Err(e) => {
                pending.rollback(&e);
                Err(e.into())
            }
        };
        self.cache.invalidate(TASKS_TAG);
        outcome
    }

    /// Delete a task. A failed delete puts it back where it was.
    pub async fn remove(&self, key: &QueryKey, id: &str) -> Result<(), MutationError> {
        ensure_persisted(id)?;
        let mut pending = self.begin(key, MutationKind::Delete);
        pending.apply(|tasks| without(tasks, id));

        match self.transport.remove(id).await {
            Ok(()) => {
                pending.commit(None);
                self.cache.invalidate(TASKS_TAG);
                Ok(())
            }
            Err(e) => {
                pending.rollback(&e);
                Err(e.into())
            }
        }
    }

    /// Edit a task. Not optimistic: the cache is only invalidated after the
    /// server has confirmed the patch.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, MutationError> {
        let patch = validate_patch(patch)?;
        ensure_persisted(id)?;
        let _in_flight = InFlight::enter(&self.in_flight);
        debug!(kind = %MutationKind::Update, id, "mutation phase InFlight");

        match self.transport.update(id, patch).await {
            Ok(task) => {
                info!(kind = %MutationKind::Update, id, "mutation committed");
                self.cache.invalidate(TASKS_TAG);
                Ok(task)
            }
            Err(e) => {
                warn!(kind = %MutationKind::Update, id, error = %e, "mutation failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{MockTransport, done_task, task};
    use crate::io::transport::{Operation, Reply};
    use crate::model::query::{DoneFilter, Selection, derive_key};
    use pretty_assertions::assert_eq;

    /// Echoing server: creates get id "b1", toggles and updates return the
    /// task with the change applied, deletes acknowledge.
    fn echo_server() -> MockTransport {
        MockTransport::new(|op| match op {
            Operation::List(_) => Ok(Reply::Tasks(Vec::new())),
            Operation::Create(input) => Ok(Reply::Task(Task {
                category: input.category.clone(),
                ..task("b1", &input.title)
            })),
            Operation::Toggle { id, field, intent } => {
                let mut t = task(id, "toggled");
                field.set(&mut t, intent.resolve(false));
                Ok(Reply::Task(t))
            }
            Operation::Update { id, patch } => Ok(Reply::Task(task(
                id,
                patch.title.as_deref().unwrap_or("untitled"),
            ))),
            Operation::Remove { .. } => Ok(Reply::Ack),
        })
    }

    fn setup(transport: MockTransport) -> (Arc<MutationCoordinator>, Arc<CacheStore>, Arc<MockTransport>) {
        let cache = Arc::new(CacheStore::new());
        let transport = Arc::new(transport);
        let coordinator = Arc::new(MutationCoordinator::new(
            Arc::clone(&cache),
            transport.clone() as Arc<dyn Transport>,
        ));
        (coordinator, cache, transport)
    }

    fn key() -> QueryKey {
        QueryKey::default()
    }

    fn entry(cache: &CacheStore, key: &QueryKey) -> Vec<Task> {
        cache.get(key).map(|t| t.to_vec()).unwrap_or_default()
    }

    // --- Create ---

    #[tokio::test]
    async fn create_shows_placeholder_while_in_flight() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "Existing")]);

        let mut held = transport.hold_next();
        let c = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move { c.create(&key(), NewTask::new("Buy milk")).await });

        held.arrived().await;
        let during = entry(&cache, &key());
        assert_eq!(during.len(), 2);
        assert_eq!(during[0].title, "Buy milk");
        assert!(during[0].is_placeholder());
        assert!(!during[0].done && !during[0].archived);
        assert_eq!(coordinator.in_flight(), 1);

        held.release();
        handle.await.unwrap().unwrap();
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn create_success_replaces_placeholder() {
        let (coordinator, cache, _) = setup(echo_server());
        cache.set(&key(), vec![task("a", "Existing")]);

        let created = coordinator
            .create(&key(), NewTask::new("Buy milk"))
            .await
            .unwrap();

        assert_eq!(created.id, "b1");
        assert_eq!(
            entry(&cache, &key()),
            vec![task("b1", "Buy milk"), task("a", "Existing")]
        );
        let matching = entry(&cache, &key())
            .iter()
            .filter(|t| t.title == "Buy milk")
            .count();
        assert_eq!(matching, 1);
    }

    #[tokio::test]
    async fn create_failure_restores_snapshot() {
        let (coordinator, cache, _) = setup(MockTransport::failing("title taken"));
        let before = vec![task("a", "Existing"), done_task("c", "Other")];
        cache.set(&key(), before.clone());

        let err = coordinator
            .create(&key(), NewTask::new("Buy milk"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "title taken");
        assert_eq!(entry(&cache, &key()), before);
        assert!(!cache.is_stale(&key()));
    }

    #[tokio::test]
    async fn failures_on_unloaded_key_leave_it_unloaded() {
        let (coordinator, cache, _) = setup(MockTransport::failing("offline"));

        coordinator.remove(&key(), "a").await.unwrap_err();
        assert!(cache.get(&key()).is_none());
        assert!(cache.needs_fetch(&key()));

        coordinator
            .create(&key(), NewTask::new("Buy milk"))
            .await
            .unwrap_err();
        assert!(cache.get(&key()).is_none());
        assert!(cache.needs_fetch(&key()));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn create_rejects_blank_title_without_request() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "Existing")]);

        let err = coordinator.create(&key(), NewTask::new("   ")).await.unwrap_err();

        assert!(matches!(err, MutationError::Validation(ValidationError::EmptyTitle)));
        assert!(transport.calls().is_empty());
        assert_eq!(entry(&cache, &key()), vec![task("a", "Existing")]);
    }

    #[tokio::test]
    async fn create_sends_trimmed_title() {
        let (coordinator, _, transport) = setup(echo_server());
        coordinator
            .create(&key(), NewTask::new("  Buy milk  "))
            .await
            .unwrap();
        assert_eq!(
            transport.calls(),
            vec![Operation::Create(NewTask::new("Buy milk"))]
        );
    }

    // --- Toggle ---

    #[tokio::test]
    async fn toggle_applies_before_request_settles() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "A"), task("b", "B")]);

        let mut held = transport.hold_next();
        let c = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move {
            c.toggle(&key(), "a", ToggleField::Done, ToggleIntent::Flip).await
        });

        held.arrived().await;
        let during = entry(&cache, &key());
        assert!(during[0].done);
        assert_eq!(during[1], task("b", "B"));

        held.release();
        handle.await.unwrap().unwrap();
        assert!(entry(&cache, &key())[0].done);
    }

    #[tokio::test]
    async fn toggle_failure_restores_prior_value() {
        let (coordinator, cache, _) = setup(MockTransport::failing("boom"));
        cache.set(&key(), vec![task("a", "A")]);

        let err = coordinator
            .toggle(&key(), "a", ToggleField::Done, ToggleIntent::Flip)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(entry(&cache, &key()), vec![task("a", "A")]);
    }

    #[tokio::test]
    async fn toggle_set_to_rollback_restores_exact_value() {
        // Setting an already-true field to true and failing must leave it
        // true, not flipped.
        let (coordinator, cache, _) = setup(MockTransport::failing("boom"));
        cache.set(&key(), vec![done_task("a", "A")]);

        coordinator
            .toggle(&key(), "a", ToggleField::Done, ToggleIntent::SetTo(true))
            .await
            .unwrap_err();

        assert!(entry(&cache, &key())[0].done);
    }

    #[tokio::test]
    async fn toggle_invalidates_on_success_and_failure() {
        for transport in [echo_server(), MockTransport::failing("boom")] {
            let (coordinator, cache, _) = setup(transport);
            cache.set(&key(), vec![task("a", "A")]);
            let _ = coordinator
                .toggle(&key(), "a", ToggleField::Archived, ToggleIntent::Flip)
                .await;
            assert!(cache.is_stale(&key()));
        }
    }

    #[tokio::test]
    async fn toggle_sends_intent_value() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "A")]);
        coordinator
            .toggle(&key(), "a", ToggleField::Archived, ToggleIntent::SetTo(true))
            .await
            .unwrap();
        assert_eq!(
            transport.calls(),
            vec![Operation::Toggle {
                id: "a".into(),
                field: ToggleField::Archived,
                intent: ToggleIntent::SetTo(true),
            }]
        );
    }

    #[tokio::test]
    async fn toggle_placeholder_is_rejected() {
        let (coordinator, _, transport) = setup(echo_server());
        let err = coordinator
            .toggle(&key(), "temp-123", ToggleField::Done, ToggleIntent::Flip)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MutationError::Validation(ValidationError::PendingTask(_))
        ));
        assert!(transport.calls().is_empty());
    }

    // --- Delete ---

    #[tokio::test]
    async fn delete_removes_immediately() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "A"), task("b", "B")]);

        let mut held = transport.hold_next();
        let c = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move { c.remove(&key(), "a").await });

        held.arrived().await;
        assert_eq!(entry(&cache, &key()), vec![task("b", "B")]);

        held.release();
        handle.await.unwrap().unwrap();
        assert_eq!(entry(&cache, &key()), vec![task("b", "B")]);
        assert!(cache.is_stale(&key()));
    }

    #[tokio::test]
    async fn delete_failure_restores_original_index() {
        let (coordinator, cache, _) = setup(MockTransport::failing("locked"));
        let before = vec![task("a", "A"), task("b", "B"), task("c", "C")];
        cache.set(&key(), before.clone());

        coordinator.remove(&key(), "b").await.unwrap_err();

        let after = entry(&cache, &key());
        assert_eq!(after, before);
        assert_eq!(after[1].id, "b");
    }

    // --- Update ---

    #[tokio::test]
    async fn update_is_not_optimistic() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "Old")]);

        let mut held = transport.hold_next();
        let c = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move {
            let patch = TaskPatch {
                title: Some("New".into()),
                ..Default::default()
            };
            c.update("a", patch).await
        });

        held.arrived().await;
        assert_eq!(entry(&cache, &key()), vec![task("a", "Old")]);
        assert!(!cache.is_stale(&key()));
        assert_eq!(coordinator.in_flight(), 1);

        held.release();
        let updated = handle.await.unwrap().unwrap();
        assert_eq!(updated.title, "New");
        assert!(cache.is_stale(&key()));
    }

    #[tokio::test]
    async fn update_failure_leaves_cache_fresh() {
        let (coordinator, cache, _) = setup(MockTransport::failing("nope"));
        cache.set(&key(), vec![task("a", "Old")]);
        let patch = TaskPatch {
            done: Some(true),
            ..Default::default()
        };
        assert!(coordinator.update("a", patch).await.is_err());
        assert!(!cache.is_stale(&key()));
        assert_eq!(coordinator.in_flight(), 0);
    }

    // --- Cross-view behaviour ---

    #[tokio::test]
    async fn mutation_marks_every_view_stale() {
        let (coordinator, cache, _) = setup(echo_server());
        let open = derive_key(&Selection {
            done: DoneFilter::Open,
            ..Default::default()
        });
        cache.set(&key(), vec![task("a", "A")]);
        cache.set(&open, vec![task("a", "A")]);

        coordinator
            .create(&key(), NewTask::new("Another"))
            .await
            .unwrap();

        assert!(cache.is_stale(&key()));
        assert!(cache.is_stale(&open));
        // Only the active view was rewritten
        assert_eq!(entry(&cache, &open), vec![task("a", "A")]);
    }

    #[tokio::test]
    async fn last_settled_rollback_wins() {
        // toggle(a) and remove(b) overlap; the remove succeeds first, then the
        // toggle fails and restores its own snapshot, which still holds b.
        let (coordinator, cache, transport) = setup(MockTransport::new(|op| match op {
            Operation::Toggle { .. } => Err(TransportError::Network("offline".into())),
            _ => Ok(Reply::Ack),
        }));
        cache.set(&key(), vec![task("a", "A"), task("b", "B")]);

        let mut toggle_held = transport.hold_next();
        let c = Arc::clone(&coordinator);
        let toggle = tokio::spawn(async move {
            c.toggle(&key(), "a", ToggleField::Done, ToggleIntent::Flip).await
        });
        toggle_held.arrived().await;

        coordinator.remove(&key(), "b").await.unwrap();
        assert_eq!(entry(&cache, &key()).len(), 1);
        assert!(entry(&cache, &key())[0].done);

        toggle_held.release();
        toggle.await.unwrap().unwrap_err();
        assert_eq!(entry(&cache, &key()), vec![task("a", "A"), task("b", "B")]);
        assert!(cache.is_stale(&key()));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn abandoned_mutation_invalidates() {
        let (coordinator, cache, transport) = setup(echo_server());
        cache.set(&key(), vec![task("a", "A")]);

        let mut held = transport.hold_next();
        let c = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move { c.remove(&key(), "a").await });
        held.arrived().await;

        handle.abort();
        let _ = handle.await;
        assert!(cache.is_stale(&key()));
        assert_eq!(coordinator.in_flight(), 0);
        drop(held);
    }
}
