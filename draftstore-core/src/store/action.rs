//! Actions
//!
//! An action wraps a mutator so callers can request state changes without
//! touching the draft or the batching machinery.
//!
//! # Synchronous actions
//!
//! The mutator gets `&mut S` for the live draft and whatever arguments the
//! caller passed. Its return value goes back to the caller unchanged, so a
//! mutator that can fail returns a `Result`. Nothing is rolled back on
//! failure; mutators that need atomicity validate before they write.
//!
//! After the mutator returns, the action asks the store to commit. Within a
//! batch only the first request schedules anything.
//!
//! # Asynchronous actions
//!
//! The mutator gets a [`DraftHandle`] and returns a future. `call` polls that
//! future once before returning, so everything up to the first suspension
//! point is applied to the draft immediately, whether or not the caller ever
//! awaits the result. Every later write, before or after an `.await`, goes to
//! the draft that is live at that moment.
//!
//! When the future resolves the action commits right away, so the action's
//! writes land in one snapshot. A future that is dropped early never commits;
//! its writes ride along with the next commit.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::task::noop_waker_ref;
use futures_util::FutureExt;

use super::Store;
use crate::draft::DraftHandle;

/// A synchronous action.
pub struct Action<S, A, R> {
    store: Store<S>,
    mutator: Arc<dyn Fn(&mut S, A) -> R + Send + Sync>,
}

impl<S, A, R> Action<S, A, R>
where
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn new<F>(store: Store<S>, mutator: F) -> Self
    where
        F: Fn(&mut S, A) -> R + Send + Sync + 'static,
    {
        Self {
            store,
            mutator: Arc::new(mutator),
        }
    }

    /// Apply the mutator to the live draft and schedule a commit.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a mutator of the same store.
    pub fn call(&self, args: A) -> R {
        let result = self.store.draft().set(|state| (self.mutator)(state, args));
        self.store.schedule_commit();
        result
    }
}

impl<S, A, R> Clone for Action<S, A, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mutator: Arc::clone(&self.mutator),
        }
    }
}

impl<S, A, R> std::fmt::Debug for Action<S, A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").field("store", &self.store).finish()
    }
}

/// An asynchronous action.
pub struct AsyncAction<S, A, F> {
    store: Store<S>,
    mutator: Arc<F>,
    _args: PhantomData<fn(A)>,
}

impl<S, A, F, Fut> AsyncAction<S, A, F>
where
    S: Clone + Send + Sync + 'static,
    F: Fn(DraftHandle<S>, A) -> Fut,
    Fut: Future,
{
    pub(crate) fn new(store: Store<S>, mutator: F) -> Self {
        Self {
            store,
            mutator: Arc::new(mutator),
            _args: PhantomData,
        }
    }

    /// Start the action.
    ///
    /// The mutator runs up to its first suspension point before `call`
    /// returns. The returned future drives the rest of it and commits once it
    /// resolves, yielding the mutator's output. A mutator that never suspends
    /// commits before `call` returns.
    pub fn call(&self, args: A) -> impl Future<Output = Fut::Output> {
        let store = self.store.clone();
        let mut pending = Box::pin((self.mutator)(store.draft(), args));

        // The real waker is installed by the first poll of the returned future
        let mut cx = Context::from_waker(noop_waker_ref());
        let early = match pending.poll_unpin(&mut cx) {
            Poll::Ready(output) => {
                store.commit_after_async();
                Some(output)
            }
            Poll::Pending => None,
        };

        async move {
            match early {
                Some(output) => output,
                None => {
                    let output = pending.await;
                    store.commit_after_async();
                    output
                }
            }
        }
    }
}

impl<S, A, F> Clone for AsyncAction<S, A, F> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mutator: Arc::clone(&self.mutator),
            _args: PhantomData,
        }
    }
}

impl<S, A, F> std::fmt::Debug for AsyncAction<S, A, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncAction")
            .field("store", &self.store)
            .finish()
    }
}
