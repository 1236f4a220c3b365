//! Mutation Context
//!
//! The mutation context tracks which store's draft is currently borrowed by
//! running code on this thread. Mutators run with the draft cell locked, so a
//! mutator that re-enters its own store (invoking another action, reading the
//! draft through a second handle, committing) would deadlock on the cell.
//! Checking the context first turns that into a clear contract violation.
//!
//! # Implementation
//!
//! We use a thread-local stack of store IDs. Entering a mutation pushes the
//! store; the returned guard pops it when dropped. The stack supports mutators
//! of one store touching the draft of a different store.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    /// Generate a new unique store ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<StoreId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
///
/// Popping on drop keeps the stack balanced when a mutator panics.
pub struct MutationContext {
    store: StoreId,
}

impl MutationContext {
    /// Enter a mutation of the given store's draft.
    ///
    /// # Panics
    ///
    /// Panics if this thread is already inside a mutation of the same store.
    pub fn enter(store: StoreId) -> Self {
        if Self::is_active(store) {
            panic!(
                "draft of {store:?} accessed from inside one of its own mutators; \
                 actions must not be invoked while another action is running"
            );
        }

        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(store));

        Self { store }
    }

    /// Check if this thread is currently mutating the given store.
    pub fn is_active(store: StoreId) -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().contains(&store))
    }

    /// Number of nested mutation contexts on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for MutationContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.store),
                "MutationContext mismatch: expected {:?}, got {:?}",
                self.store,
                popped
            );
        });
    }
}
