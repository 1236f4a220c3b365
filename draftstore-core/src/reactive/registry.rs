//! Selector Registry
//!
//! The registry maps subscriber tokens to a selector, the value last
//! delivered for it, and the callback deliveries go to.
//!
//! # How Notification Works
//!
//! 1. After a commit publishes a new snapshot, `notify_all` re-runs every
//!    selector against it.
//!
//! 2. Each projection is compared with the last delivered one using
//!    `PartialEq`. Vectors, maps and derived structs compare structurally,
//!    so a selector that builds a fresh but equal value does not deliver.
//!
//! 3. Changed projections are recorded as the new last-delivered value and
//!    queued for delivery.
//!
//! 4. Deliveries run after the registry lock is released, in registration
//!    order, so a callback may subscribe or unsubscribe freely.
//!
//! A selector that panics is isolated: the panic is caught, the entry keeps
//! its previous value, and the pass continues with the next entry.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::subscriber::SubscriberId;
use crate::error::SelectorEvaluationError;

/// A queued call to a delivery callback.
type Delivery = Box<dyn FnOnce() + Send>;

/// Type-erased registry entry.
///
/// The registry holds selectors of many projection types; this trait hides
/// the projection type behind the re-evaluation step.
trait Entry<S>: Send {
    /// Re-run the selector. Returns a delivery if the projection changed.
    fn reevaluate(&mut self, snapshot: &S) -> Option<Delivery>;
}

struct TypedEntry<S, R> {
    selector: Box<dyn Fn(&S) -> R + Send + Sync>,
    last: R,
    deliver: Arc<dyn Fn(R) + Send + Sync>,
}

impl<S, R> Entry<S> for TypedEntry<S, R>
where
    R: Clone + PartialEq + Send + 'static,
{
    fn reevaluate(&mut self, snapshot: &S) -> Option<Delivery> {
        let next = (self.selector)(snapshot);
        if next == self.last {
            return None;
        }

        self.last = next.clone();
        let deliver = Arc::clone(&self.deliver);
        Some(Box::new(move || deliver(next)))
    }
}

/// Outcome of a notification pass.
#[derive(Debug, Default)]
pub struct NotifyReport {
    /// Number of selectors evaluated.
    pub evaluated: usize,

    /// Number of delivery callbacks invoked.
    pub delivered: usize,

    /// Selectors that panicked during the pass.
    pub errors: Vec<SelectorEvaluationError>,
}

/// Registry of selector subscriptions for one store.
pub struct SelectorRegistry<S> {
    entries: Mutex<IndexMap<SubscriberId, Box<dyn Entry<S>>>>,
}

impl<S> SelectorRegistry<S>
where
    S: 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Register a selector under a fresh token.
    ///
    /// The selector is evaluated against `snapshot` right away. That value
    /// becomes the entry's last-delivered value and is returned instead of
    /// being delivered.
    pub fn register<R, F, D>(&self, snapshot: &S, selector: F, deliver: D) -> (SubscriberId, R)
    where
        R: Clone + PartialEq + Send + 'static,
        F: Fn(&S) -> R + Send + Sync + 'static,
        D: Fn(R) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let value = self.replace(id, snapshot, selector, deliver);
        (id, value)
    }

    /// Insert or replace the entry for `id`.
    pub fn replace<R, F, D>(&self, id: SubscriberId, snapshot: &S, selector: F, deliver: D) -> R
    where
        R: Clone + PartialEq + Send + 'static,
        F: Fn(&S) -> R + Send + Sync + 'static,
        D: Fn(R) + Send + Sync + 'static,
    {
        let initial = selector(snapshot);

        let entry = TypedEntry {
            selector: Box::new(selector),
            last: initial.clone(),
            deliver: Arc::new(deliver),
        };

        // The old entry is dropped after the lock is released; its callback
        // may own things that unsubscribe on drop
        let previous = self.entries.lock().insert(id, Box::new(entry));
        trace!(subscriber = id.raw(), replaced = previous.is_some(), "selector registered");
        drop(previous);

        initial
    }

    /// Re-evaluate every selector against `snapshot` and deliver changes.
    pub fn notify_all(&self, snapshot: &S, version: u64) -> NotifyReport {
        let mut report = NotifyReport::default();
        let mut deliveries: SmallVec<[Delivery; 8]> = SmallVec::new();

        {
            let mut entries = self.entries.lock();
            for (id, entry) in entries.iter_mut() {
                report.evaluated += 1;
                if let Some(delivery) = Self::evaluate(*id, entry, snapshot, version, &mut report) {
                    deliveries.push(delivery);
                }
            }
        }

        report.delivered = deliveries.len();
        for delivery in deliveries {
            delivery();
        }

        report
    }

    /// Re-evaluate a single entry against `snapshot` and deliver a change.
    ///
    /// Used to catch up an entry registered against a snapshot that was
    /// replaced before the registration landed.
    pub fn refresh(&self, id: SubscriberId, snapshot: &S, version: u64) -> NotifyReport {
        let mut report = NotifyReport::default();

        let delivery = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&id) {
                Some(entry) => {
                    report.evaluated = 1;
                    Self::evaluate(id, entry, snapshot, version, &mut report)
                }
                None => None,
            }
        };

        if let Some(delivery) = delivery {
            report.delivered = 1;
            delivery();
        }

        report
    }

    fn evaluate(
        id: SubscriberId,
        entry: &mut Box<dyn Entry<S>>,
        snapshot: &S,
        version: u64,
        report: &mut NotifyReport,
    ) -> Option<Delivery> {
        match panic::catch_unwind(AssertUnwindSafe(|| entry.reevaluate(snapshot))) {
            Ok(delivery) => delivery,
            Err(payload) => {
                let err = SelectorEvaluationError::from_panic(id, version, payload);
                warn!(subscriber = id.raw(), version, error = %err.message, "selector failed");
                report.errors.push(err);
                None
            }
        }
    }
}

impl<S> SelectorRegistry<S> {
    /// Remove the entry for `id`. Returns whether an entry was removed.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.entries.lock().shift_remove(&id);
        if removed.is_some() {
            trace!(subscriber = id.raw(), "selector unregistered");
        }
        removed.is_some()
    }

    /// Check if `id` has an entry.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Number of registered selectors.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<S> Default for SelectorRegistry<S>
where
    S: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
