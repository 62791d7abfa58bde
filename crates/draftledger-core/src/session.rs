//! Draft editing session.
//!
//! A [`DraftSession`] owns one logical draft, identified by its stable
//! external key. It publishes exactly one immutable snapshot at a time
//! through a `watch` channel, funnels local edits through a debounced
//! [`ChangeSet`], merges externally observed changes field-by-field, and
//! pushes full-document saves to the write queue.
//!
//! Lifecycle is `Loading → Ready → Destroyed`. All state mutation happens
//! under one lock that is never held across an await; the suspension
//! points are the initial load, ticket awaits, and the debounce sleep.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use draftledger_model::{
    BodyCodec, DraftDocument, DraftPatch, HeaderMessageId, PlainTextCodec, PluginId,
};

use crate::changeset::{ChangeSet, CommitToken, DebouncePolicy, TimerAction};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SessionError};
use crate::queue::WriteQueue;
use crate::reassign::{ReassignOutcome, ReassignmentCoordinator};
use crate::store::{AccountDirectory, DraftStore, StoreEvent};

/// The latest published snapshot; `None` until the session is ready.
pub type SnapshotRef = Option<Arc<DraftDocument>>;

/// Collaborators and tunables a session is built over.
#[derive(Clone)]
pub struct SessionContext {
    queue: Arc<dyn WriteQueue>,
    store: Arc<dyn DraftStore>,
    directory: Arc<dyn AccountDirectory>,
    codec: Arc<dyn BodyCodec>,
    clock: Arc<dyn Clock>,
    policy: DebouncePolicy,
}

impl SessionContext {
    /// Creates a context with the plain-text codec, the system clock, and
    /// the default debounce policy.
    #[must_use]
    pub fn new(
        queue: Arc<dyn WriteQueue>,
        store: Arc<dyn DraftStore>,
        directory: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            queue,
            store,
            directory,
            codec: Arc::new(PlainTextCodec),
            clock: Arc::new(SystemClock),
            policy: DebouncePolicy::default(),
        }
    }

    /// Replaces the body codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn BodyCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the debounce policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DebouncePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Loading,
    Ready,
    Destroyed,
}

struct Inner {
    lifecycle: Lifecycle,
    changeset: ChangeSet,
    provided: Option<DraftDocument>,
    debounce_task: Option<JoinHandle<()>>,
    // Bumped whenever the debounce timer is rearmed or the session is
    // torn down. A fired timer task re-validates against it under the
    // lock and no-ops when superseded; stale timers are never aborted,
    // since an abort landing between begin_commit and finish_commit
    // would leak the in-flight flag.
    timer_epoch: u64,
    pump_task: Option<JoinHandle<()>>,
}

struct Shared {
    key: HeaderMessageId,
    ctx: SessionContext,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<SnapshotRef>,
}

impl Shared {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ingests one change notification. Synchronous: merging is pure and
    /// publication happens under the state lock, so an event can never
    /// interleave with a half-applied local edit.
    fn handle_event(&self, event: &StoreEvent) {
        let inner = self.lock_inner();
        if inner.lifecycle != Lifecycle::Ready {
            return;
        }

        match &event.payload {
            None => {
                // Status-only signal: wake observers, same snapshot instance.
                let current = self.snapshot_tx.borrow().clone();
                self.snapshot_tx.send_replace(current);
            }
            Some(records) => {
                for record in records.iter().filter(|r| r.header_message_id == self.key) {
                    // Re-read at merge time; a commit may be in flight.
                    let current = self.snapshot_tx.borrow().clone();
                    let Some(current) = current else { continue };
                    if let Some(next) = current.merged(record, self.ctx.codec.as_ref()) {
                        tracing::debug!(key = %self.key, "merged external change");
                        self.snapshot_tx.send_replace(Some(Arc::new(next)));
                    }
                }
            }
        }
        drop(inner);
    }
}

/// Holds the in-flight commit slot for one commit attempt.
///
/// The commit future can be dropped at any await point; the slot must
/// come back regardless, with the dirty flag untouched, or the session
/// could never commit again.
struct InFlightGuard {
    shared: Arc<Shared>,
    token: Option<CommitToken>,
}

impl InFlightGuard {
    fn finish(mut self, success: bool) {
        if let Some(token) = self.token.take() {
            self.shared.lock_inner().changeset.finish_commit(token, success);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.shared.lock_inner().changeset.finish_commit(token, false);
        }
    }
}

/// An editing session for one draft.
///
/// Cheap to clone; clones share the same session. Must live on a tokio
/// runtime (edits schedule their debounced commit as a task).
#[derive(Clone)]
pub struct DraftSession {
    shared: Arc<Shared>,
}

impl DraftSession {
    /// Creates a session that will load its draft by external key.
    #[must_use]
    pub fn new(ctx: SessionContext, key: HeaderMessageId) -> Self {
        Self::build(ctx, key, None)
    }

    /// Creates a session over a draft already in hand.
    ///
    /// The draft still only becomes visible once [`Self::prepare`]
    /// resolves.
    #[must_use]
    pub fn with_draft(ctx: SessionContext, draft: DraftDocument) -> Self {
        let key = draft.header_message_id.clone();
        Self::build(ctx, key, Some(draft))
    }

    fn build(ctx: SessionContext, key: HeaderMessageId, provided: Option<DraftDocument>) -> Self {
        let changeset = ChangeSet::new(Arc::clone(&ctx.clock), ctx.policy);
        let (snapshot_tx, _rx) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                key,
                ctx,
                inner: Mutex::new(Inner {
                    lifecycle: Lifecycle::Loading,
                    changeset,
                    provided,
                    debounce_task: None,
                    timer_epoch: 0,
                    pump_task: None,
                }),
                snapshot_tx,
            }),
        }
    }

    /// Returns the session's external key.
    #[must_use]
    pub fn key(&self) -> &HeaderMessageId {
        &self.shared.key
    }

    /// Returns the latest published snapshot, or `None` before the
    /// session is ready. Never blocks.
    #[must_use]
    pub fn snapshot(&self) -> SnapshotRef {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Subscribes to snapshot publications.
    ///
    /// The receiver wakes for every new snapshot instance and for
    /// status-only external events (same instance re-sent).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SnapshotRef> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Returns `true` iff uncommitted changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.lock_inner().changeset.is_dirty()
    }

    /// Returns `true` once the session has been torn down.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.shared.lock_inner().lifecycle == Lifecycle::Destroyed
    }

    /// Resolves the initial snapshot.
    ///
    /// Loads the draft by external key unless one was provided at
    /// construction. Idempotent once ready.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] when the load query resolves nothing,
    /// [`SessionError::MalformedDraft`] when the loaded record lacks
    /// required fields, [`SessionError::Destroyed`] when the session was
    /// torn down (including a teardown racing the in-flight load, in
    /// which case nothing is published).
    pub async fn prepare(&self) -> Result<Arc<DraftDocument>> {
        let provided = {
            let mut inner = self.shared.lock_inner();
            match inner.lifecycle {
                Lifecycle::Destroyed => return Err(SessionError::Destroyed),
                Lifecycle::Ready => {
                    return self
                        .snapshot()
                        .ok_or(SessionError::Destroyed);
                }
                Lifecycle::Loading => {}
            }
            inner.provided.take()
        };

        let document = match provided {
            Some(draft) => draft,
            None => {
                let record = self
                    .shared
                    .ctx
                    .store
                    .find_draft(&self.shared.key)
                    .await?
                    .ok_or(SessionError::NotFound)?;
                record.into_document(self.shared.ctx.codec.as_ref())?
            }
        };

        let mut inner = self.shared.lock_inner();
        if inner.lifecycle == Lifecycle::Destroyed {
            return Err(SessionError::Destroyed);
        }
        inner.lifecycle = Lifecycle::Ready;
        let snapshot = Arc::new(document);
        // Published under the guard: a teardown cannot interleave between
        // the lifecycle flip and the first publication.
        self.shared.snapshot_tx.send_replace(Some(Arc::clone(&snapshot)));
        drop(inner);

        tracing::debug!(key = %self.shared.key, "session ready");
        Ok(snapshot)
    }

    /// Applies a set of field edits.
    ///
    /// The edit is visible to [`Self::snapshot`] immediately, as exactly
    /// one new snapshot instance per call. The debounce only delays its
    /// persistence.
    ///
    /// # Errors
    ///
    /// [`SessionError::ModifiedBeforeReady`] before [`Self::prepare`]
    /// resolves, [`SessionError::Destroyed`] after teardown.
    pub fn apply_changes(&self, patch: DraftPatch) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        match inner.lifecycle {
            Lifecycle::Loading => return Err(SessionError::ModifiedBeforeReady),
            Lifecycle::Destroyed => return Err(SessionError::Destroyed),
            Lifecycle::Ready => {}
        }

        let current = self
            .shared
            .snapshot_tx
            .borrow()
            .clone()
            .ok_or(SessionError::ModifiedBeforeReady)?;
        let next = current.with_patch(&patch, self.shared.ctx.codec.as_ref());
        self.shared.snapshot_tx.send_replace(Some(Arc::new(next)));

        match inner.changeset.add(patch) {
            TimerAction::Arm(deadline) => {
                inner.timer_epoch += 1;
                let epoch = inner.timer_epoch;
                let weak = Arc::downgrade(&self.shared);
                // The superseded timer is invalidated by the epoch bump
                // and left to fire as a no-op.
                inner.debounce_task = Some(tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    let Some(shared) = weak.upgrade() else { return };
                    {
                        let mut inner = shared.lock_inner();
                        if inner.timer_epoch != epoch {
                            return;
                        }
                        inner.debounce_task = None;
                    }
                    if let Err(error) = Self::commit_shared(&shared).await {
                        tracing::warn!(%error, "debounced commit failed; changes stay pending");
                    }
                }));
            }
            TimerAction::AlreadyArmed => {}
        }
        Ok(())
    }

    /// Attaches plugin metadata under the plugin's namespaced key.
    ///
    /// # Errors
    ///
    /// Same as [`Self::apply_changes`].
    pub fn apply_metadata(&self, plugin_id: PluginId, value: serde_json::Value) -> Result<()> {
        self.apply_changes(DraftPatch::new().metadata(plugin_id, value))
    }

    /// Flushes pending edits to the write queue now.
    ///
    /// Pushes the entire current snapshot (the writer always receives a
    /// full document) and waits for that request's local-completion
    /// signal. No-op when clean, not yet ready, torn down, or while a
    /// commit is already in flight; the dirty flag is only cleared once
    /// the in-flight payload is accepted.
    ///
    /// # Errors
    ///
    /// [`SessionError::Queue`] when the queue rejects the save or its
    /// local application fails; the changes stay pending for a later
    /// retry.
    pub async fn commit(&self) -> Result<()> {
        Self::commit_shared(&self.shared).await
    }

    async fn commit_shared(shared: &Arc<Shared>) -> Result<()> {
        let (token, draft) = {
            let mut inner = shared.lock_inner();
            if inner.lifecycle != Lifecycle::Ready {
                return Ok(());
            }
            let Some(token) = inner.changeset.begin_commit() else {
                return Ok(());
            };
            let Some(snapshot) = shared.snapshot_tx.borrow().clone() else {
                inner.changeset.finish_commit(token, false);
                return Ok(());
            };
            (token, snapshot)
        };
        // Built outside the critical section; its Drop relocks the state.
        let guard = InFlightGuard {
            shared: Arc::clone(shared),
            token: Some(token),
        };

        tracing::debug!(key = %shared.key, "committing draft");
        let outcome = match shared.ctx.queue.enqueue_save((*draft).clone()).await {
            Ok(ticket) => ticket.applied().await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(()) => {
                guard.finish(true);
                Ok(())
            }
            Err(error) => {
                guard.finish(false);
                Err(SessionError::Queue(error))
            }
        }
    }

    /// Ingests one change notification.
    ///
    /// Ignored unless the session is ready. Payload-less events re-notify
    /// observers without touching the snapshot; records for other keys
    /// are filtered out; matching records are merged field-by-field, with
    /// one publication per record that actually changed something.
    pub fn handle_store_event(&self, event: &StoreEvent) {
        self.shared.handle_event(event);
    }

    /// Observes a change-notification stream until teardown.
    ///
    /// Replaces any previously observed stream.
    pub fn observe_events(&self, mut events: broadcast::Receiver<StoreEvent>) {
        let weak = Arc::downgrade(&self.shared);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(shared) = weak.upgrade() else { break };
                        shared.handle_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change notifications lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut inner = self.shared.lock_inner();
        if inner.lifecycle == Lifecycle::Destroyed {
            handle.abort();
            return;
        }
        if let Some(old) = inner.pump_task.replace(handle) {
            old.abort();
        }
    }

    /// Guarantees the draft's owning account matches its from-address,
    /// reassigning it through the create+destroy protocol if needed.
    ///
    /// # Errors
    ///
    /// [`SessionError::ModifiedBeforeReady`] before the session is ready,
    /// [`SessionError::Destroyed`] after teardown, plus the coordinator's
    /// errors (see [`ReassignmentCoordinator::ensure_correct_account`]).
    pub async fn ensure_correct_account(&self) -> Result<ReassignOutcome> {
        let draft = {
            let inner = self.shared.lock_inner();
            match inner.lifecycle {
                Lifecycle::Loading => return Err(SessionError::ModifiedBeforeReady),
                Lifecycle::Destroyed => return Err(SessionError::Destroyed),
                Lifecycle::Ready => {}
            }
            drop(inner);
            self.snapshot().ok_or(SessionError::ModifiedBeforeReady)?
        };

        let coordinator = ReassignmentCoordinator::new(
            Arc::clone(&self.shared.ctx.queue),
            Arc::clone(&self.shared.ctx.directory),
        );
        coordinator.ensure_correct_account(&draft).await
    }

    /// Tears the session down. Idempotent and terminal.
    ///
    /// Cancels the pending commit timer and stops observing change
    /// notifications. Pending edits are dropped; callers that need them
    /// persisted must [`Self::commit`] before tearing down. An already
    /// in-flight write runs to completion or failure on its own.
    pub fn teardown(&self) {
        let mut inner = self.shared.lock_inner();
        if inner.lifecycle == Lifecycle::Destroyed {
            return;
        }
        inner.lifecycle = Lifecycle::Destroyed;
        inner.changeset.cancel_commit();
        inner.timer_epoch += 1;
        if let Some(task) = inner.debounce_task.take() {
            task.abort();
        }
        if let Some(task) = inner.pump_task.take() {
            task.abort();
        }
        drop(inner);
        tracing::debug!(key = %self.shared.key, "session torn down");
    }
}
