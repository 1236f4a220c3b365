//! Selector Slot
//!
//! A `SelectorSlot` is what a rendering component holds to read store state.
//! The component calls [`SelectorSlot::select`] on every render pass, always,
//! not from inside a conditional branch, because the slot's bookkeeping
//! assumes it sees every render.
//!
//! # Lifecycle
//!
//! 1. The first `select` registers the selector and returns its projection.
//!
//! 2. Later calls with equal `deps` return the most recently delivered
//!    projection; the selector passed on those calls is ignored.
//!
//! 3. A call with different `deps` unregisters the old entry and registers
//!    the new selector, so the registry never keeps entries for selectors the
//!    component stopped using.
//!
//! 4. `teardown` (or dropping the slot) unregisters the entry. Deliveries
//!    racing with teardown are ignored.
//!
//! A delivery that changes the slot's value stores it and calls the
//! component's re-render callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::subscriber::SubscriberId;
use crate::store::Store;

/// State shared between the slot and its delivery callback.
struct Shared<R> {
    value: Mutex<Option<R>>,
    mounted: AtomicBool,
}

/// The slot's current registry entry.
struct Registration<R, D> {
    id: SubscriberId,
    deps: D,
    shared: Arc<Shared<R>>,
}

/// Per-component subscription to a store projection.
pub struct SelectorSlot<S, R, D = ()> {
    store: Store<S>,
    rerender: Arc<dyn Fn() + Send + Sync>,
    current: Option<Registration<R, D>>,
}

impl<S, R, D> SelectorSlot<S, R, D>
where
    S: Clone + Send + Sync + 'static,
    R: Clone + PartialEq + Send + 'static,
    D: PartialEq,
{
    /// Create an empty slot for `store`.
    pub fn new(store: Store<S>, rerender: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            store,
            rerender: Arc::new(rerender),
            current: None,
        }
    }

    /// Get the projection for this render pass.
    ///
    /// Registers `selector` when the slot is empty or `deps` changed since the
    /// previous call.
    pub fn select<F>(&mut self, selector: F, deps: D) -> R
    where
        F: Fn(&S) -> R + Send + Sync + 'static,
    {
        if let Some(current) = &self.current {
            if current.deps == deps {
                if let Some(value) = current.shared.value.lock().clone() {
                    return value;
                }
            }
        }

        self.teardown();

        let shared = Arc::new(Shared {
            value: Mutex::new(None),
            mounted: AtomicBool::new(true),
        });

        let deliver = {
            let shared = Arc::clone(&shared);
            let rerender = Arc::clone(&self.rerender);
            move |next: R| {
                if !shared.mounted.load(Ordering::Acquire) {
                    return;
                }
                {
                    let mut value = shared.value.lock();
                    if value.as_ref() == Some(&next) {
                        return;
                    }
                    *value = Some(next);
                }
                rerender();
            }
        };

        let (id, initial) = self.store.register(selector, deliver);

        // A catch-up delivery during registration may already have stored a
        // newer value
        let value = shared.value.lock().get_or_insert(initial).clone();

        self.current = Some(Registration { id, deps, shared });
        value
    }
}

impl<S, R> SelectorSlot<S, R, ()>
where
    S: Clone + Send + Sync + 'static,
    R: Clone + PartialEq + Send + 'static,
{
    /// Select with no dependencies: the selector is registered once and kept
    /// until teardown.
    pub fn select_once<F>(&mut self, selector: F) -> R
    where
        F: Fn(&S) -> R + Send + Sync + 'static,
    {
        self.select(selector, ())
    }
}

impl<S, R, D> SelectorSlot<S, R, D> {
    /// The most recently delivered projection.
    pub fn value(&self) -> Option<R>
    where
        R: Clone,
    {
        self.current
            .as_ref()
            .and_then(|current| current.shared.value.lock().clone())
    }

    /// Token of the current registry entry.
    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.current.as_ref().map(|current| current.id)
    }

    /// Check if the slot holds a registry entry.
    pub fn is_mounted(&self) -> bool {
        self.current.is_some()
    }

    /// Unregister the slot's entry. Later deliveries are ignored.
    pub fn teardown(&mut self) {
        if let Some(current) = self.current.take() {
            current.shared.mounted.store(false, Ordering::Release);
            self.store.unsubscribe(current.id);
        }
    }
}

impl<S, R, D> Drop for SelectorSlot<S, R, D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<S, R, D> std::fmt::Debug for SelectorSlot<S, R, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorSlot")
            .field("subscriber", &self.subscriber_id())
            .finish()
    }
}
