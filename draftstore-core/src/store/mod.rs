//! Store
//!
//! The store is the central coordinator that connects the draft manager, the
//! selector registry, and the batch scheduler.
//!
//! # How It Works
//!
//! 1. Actions mutate the live draft through a [`DraftHandle`].
//!
//! 2. The first synchronous action of a batch schedules one commit task with
//!    the configured [`CommitScheduler`]. Later actions in the batch only
//!    mutate.
//!
//! 3. When the task runs, the store:
//!    a. Finalizes the draft into a new snapshot and publishes it
//!    b. Derives a fresh draft from it
//!    c. Re-evaluates every registered selector against the new snapshot
//!    d. Delivers the projections that changed
//!
//! 4. An async action commits on its own when its future resolves, whether
//!    or not a batch is pending. It neither claims nor cancels a pending
//!    batch: the scheduled task still runs and commits whatever was written
//!    after the async commit.
//!
//! # Thread Safety
//!
//! Stores are `Clone + Send + Sync` when the state is. Mutators run one at a
//! time because the draft cell is locked for the duration of each closure.

mod action;

pub use action::{Action, AsyncAction};

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::batch::{Batch, BatchState, CommitScheduler, TokioScheduler};
use crate::config::StoreConfig;
use crate::draft::{DraftHandle, DraftManager, MutationContext};
use crate::error::{Result, SelectorEvaluationError, StoreError};
use crate::reactive::{SelectorRegistry, SelectorSlot, SubscriberId};

/// Outcome of a commit.
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    /// Version of the snapshot current after the commit.
    pub version: u64,

    /// Whether a new snapshot was published.
    pub changed: bool,

    /// Number of selectors re-evaluated.
    pub evaluated: usize,

    /// Number of deliveries made.
    pub delivered: usize,

    /// Selectors that failed during notification.
    pub errors: Vec<SelectorEvaluationError>,
}

struct StoreInner<S> {
    config: StoreConfig,
    manager: DraftManager<S>,
    registry: SelectorRegistry<S>,
    batch: Mutex<Batch>,
    scheduler: Arc<dyn CommitScheduler>,
}

/// A reactive state container.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new(State::default());
///
/// let add_color = store.create_action(|state: &mut State, color: String| {
///     Arc::make_mut(&mut state.colors).push(color);
/// });
///
/// let (_subscription, colors) = store.subscribe(
///     |state| state.colors.clone(),
///     |colors| println!("colors: {colors:?}"),
/// );
///
/// add_color.call("blue".into());
/// // Prints at the end of the tick: colors: ["green", "white", "red", "blue"]
/// ```
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Store<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a store with the default configuration and the tokio scheduler.
    pub fn new(initial: S) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a store with the given configuration and the tokio scheduler.
    pub fn with_config(initial: S, config: StoreConfig) -> Self {
        Self::with_scheduler(initial, config, Arc::new(TokioScheduler::new()))
    }

    /// Create a store that schedules its commits on `scheduler`.
    pub fn with_scheduler(
        initial: S,
        config: StoreConfig,
        scheduler: Arc<dyn CommitScheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                manager: DraftManager::new(initial),
                registry: SelectorRegistry::new(),
                batch: Mutex::new(Batch::new()),
                scheduler,
            }),
        }
    }

    /// Get the current snapshot.
    ///
    /// Reflects the last completed commit, never the draft.
    pub fn snapshot(&self) -> Arc<S> {
        self.inner.manager.snapshot()
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.inner.manager.version()
    }

    /// Read a projection of the current snapshot without subscribing.
    pub fn select<R, F>(&self, selector: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        selector(&self.snapshot())
    }

    /// Get a handle to the live draft.
    pub fn draft(&self) -> DraftHandle<S> {
        self.inner.manager.handle()
    }

    /// Check if the live draft holds uncommitted writes.
    pub fn has_pending_changes(&self) -> bool {
        self.inner.manager.has_pending_changes()
    }

    /// Throw away uncommitted writes.
    pub fn discard(&self) {
        self.inner.manager.reset();
    }

    /// Subscribe `deliver` to changes of `selector`'s projection.
    ///
    /// Returns the subscription, which unsubscribes when dropped, and the
    /// current projection.
    pub fn subscribe<R, F, D>(&self, selector: F, deliver: D) -> (Subscription<S>, R)
    where
        R: Clone + PartialEq + Send + 'static,
        F: Fn(&S) -> R + Send + Sync + 'static,
        D: Fn(R) + Send + Sync + 'static,
    {
        let (id, value) = self.register(selector, deliver);
        let subscription = Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        };
        (subscription, value)
    }

    /// Create a subscription slot for a rendering component.
    ///
    /// `rerender` runs whenever a delivery changes the slot's value.
    pub fn slot<R, D>(&self, rerender: impl Fn() + Send + Sync + 'static) -> SelectorSlot<S, R, D>
    where
        R: Clone + PartialEq + Send + 'static,
        D: PartialEq,
    {
        SelectorSlot::new(self.clone(), rerender)
    }

    /// Wrap a synchronous mutator into an action.
    pub fn create_action<A, R, F>(&self, mutator: F) -> Action<S, A, R>
    where
        F: Fn(&mut S, A) -> R + Send + Sync + 'static,
    {
        Action::new(self.clone(), mutator)
    }

    /// Wrap an asynchronous mutator into an action.
    pub fn create_async_action<A, F, Fut>(&self, mutator: F) -> AsyncAction<S, A, F>
    where
        F: Fn(DraftHandle<S>, A) -> Fut,
        Fut: Future,
    {
        AsyncAction::new(self.clone(), mutator)
    }

    /// Commit the live draft now, absorbing any pending batch.
    ///
    /// Fails with `ReentrantCommit` from inside a mutator of this store or
    /// from a delivery; the pending batch is left untouched.
    pub fn commit(&self) -> Result<CommitReport> {
        if MutationContext::is_active(self.inner.manager.id()) {
            return Err(StoreError::ReentrantCommit);
        }
        self.inner.batch.lock().begin_manual()?;
        let _finish = FinishCommit(self);
        self.run_commit()
    }

    /// Register a selector and catch it up if a commit slipped in between.
    pub(crate) fn register<R, F, D>(&self, selector: F, deliver: D) -> (SubscriberId, R)
    where
        R: Clone + PartialEq + Send + 'static,
        F: Fn(&S) -> R + Send + Sync + 'static,
        D: Fn(R) + Send + Sync + 'static,
    {
        let (snapshot, version) = self.inner.manager.snapshot_with_version();
        let (id, value) = self.inner.registry.register(&snapshot, selector, deliver);

        let (latest, latest_version) = self.inner.manager.snapshot_with_version();
        if latest_version != version {
            self.inner.registry.refresh(id, &latest, latest_version);
        }

        (id, value)
    }

    /// Open a batch if none is pending.
    pub(crate) fn schedule_commit(&self) {
        let opened = self.inner.batch.lock().request();
        if let Some(batch) = opened {
            self.schedule_batch(batch);
        }
    }

    /// Terminal commit of an async action.
    pub(crate) fn commit_after_async(&self) {
        if MutationContext::is_active(self.inner.manager.id()) {
            // Resolved inside one of our own mutators; let a batch pick it up
            self.schedule_commit();
            return;
        }

        let begun = self.inner.batch.lock().begin_async();
        match begun {
            Ok(()) => {
                let _finish = FinishCommit(self);
                if let Err(err) = self.run_commit() {
                    error!(store = self.inner.config.label(), %err, "async action commit failed");
                    panic!("async action commit failed: {err}");
                }
            }
            // Another commit is running; fold into its follow-up
            Err(_) => self.schedule_commit(),
        }
    }

    fn schedule_batch(&self, batch: u64) {
        trace!(store = self.inner.config.label(), batch, "commit scheduled");

        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule(
            self.inner.config.batch,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Store { inner }.run_scheduled(batch);
                }
            }),
        );
    }

    fn run_scheduled(&self, batch: u64) {
        if !self.inner.batch.lock().begin_scheduled(batch) {
            trace!(store = self.inner.config.label(), batch, "stale batch skipped");
            return;
        }

        let _finish = FinishCommit(self);
        if let Err(err) = self.run_commit() {
            error!(store = self.inner.config.label(), batch, %err, "scheduled commit failed");
            panic!("scheduled commit failed: {err}");
        }
    }

    fn run_commit(&self) -> Result<CommitReport> {
        let commit = self.inner.manager.commit()?;

        let mut report = CommitReport {
            version: commit.version,
            changed: commit.changed,
            ..CommitReport::default()
        };

        if commit.changed {
            let notified = self.inner.registry.notify_all(&commit.snapshot, commit.version);
            report.evaluated = notified.evaluated;
            report.delivered = notified.delivered;
            report.errors = notified.errors;
        }

        debug!(
            store = self.inner.config.label(),
            version = report.version,
            changed = report.changed,
            delivered = report.delivered,
            failed = report.errors.len(),
            "commit"
        );

        Ok(report)
    }

    fn finish_commit(&self) {
        let follow_up = self.inner.batch.lock().finish();
        if let Some(batch) = follow_up {
            self.schedule_batch(batch);
        }
    }
}

impl<S> Store<S> {
    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Remove a selector registration. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.registry.unregister(id)
    }

    /// Number of registered selectors.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Check if a batch commit is scheduled and has not run yet.
    pub fn is_commit_pending(&self) -> bool {
        self.inner.batch.lock().is_pending()
    }

    /// Current batch state.
    pub fn batch_state(&self) -> BatchState {
        self.inner.batch.lock().state()
    }
}

/// Finishes the running commit, even when a delivery panics.
struct FinishCommit<'a, S>(&'a Store<S>)
where
    S: Clone + Send + Sync + 'static;

impl<S> Drop for FinishCommit<'_, S>
where
    S: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.0.finish_commit();
    }
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.inner.config.label())
            .field("subscribers", &self.subscriber_count())
            .field("batch", &self.batch_state())
            .finish()
    }
}

/// A registry entry owned by the caller of [`Store::subscribe`].
///
/// Dropping the subscription removes the entry.
pub struct Subscription<S> {
    id: SubscriberId,
    store: Weak<StoreInner<S>>,
}

impl<S> Subscription<S> {
    /// Token of the registry entry.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Check if the entry is still registered.
    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .map(|inner| inner.registry.contains(self.id))
            .unwrap_or(false)
    }

    /// Remove the entry now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.registry.unregister(self.id);
        }
    }
}

impl<S> std::fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
