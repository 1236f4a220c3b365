//! Draft Manager
//!
//! The draft manager owns the published snapshot and the live draft derived
//! from it.
//!
//! # How Drafts Work
//!
//! 1. A fresh draft holds a reference to the snapshot it was derived from.
//!    Reading it costs nothing.
//!
//! 2. The first write copies the snapshot value (`Arc::make_mut`). Later
//!    writes in the same batch reuse that copy. State types that keep their
//!    large branches behind `Arc` only copy the branches they touch.
//!
//! 3. Committing finalizes the draft. A draft that was never written yields
//!    no new snapshot: the published `Arc` is reused and the version stays put.
//!
//! 4. A new draft is derived from the (possibly new) snapshot in the same
//!    critical section, so a draft always exists.
//!
//! # Locking
//!
//! The published snapshot sits behind an `RwLock` separate from the draft
//! cell, so readers of the snapshot never wait on a running mutator.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::context::{MutationContext, StoreId};
use super::handle::DraftHandle;
use crate::error::{Result, StoreError};

/// Lifecycle of a draft.
#[derive(Debug)]
enum DraftState<S> {
    /// Nothing has been written; reads go to the base snapshot.
    Pristine,

    /// The draft was written; holds the working copy.
    Modified(Arc<S>),

    /// The draft was turned into a snapshot and must not be used again.
    Finalized,
}

/// A mutable working copy derived from a snapshot.
#[derive(Debug)]
pub struct Draft<S> {
    /// Snapshot this draft was derived from.
    base: Arc<S>,

    /// Version of `base`.
    version: u64,

    state: DraftState<S>,
}

impl<S> Draft<S>
where
    S: Clone,
{
    /// Derive a draft from a snapshot.
    pub fn new(base: Arc<S>, version: u64) -> Self {
        Self {
            base,
            version,
            state: DraftState::Pristine,
        }
    }

    /// Version of the snapshot this draft was derived from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check if the draft has been written since it was derived.
    pub fn is_dirty(&self) -> bool {
        matches!(self.state, DraftState::Modified(_))
    }

    /// Check if the draft has been finalized.
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, DraftState::Finalized)
    }

    /// Read the draft's current value.
    pub fn read(&self) -> &S {
        match &self.state {
            DraftState::Modified(working) => working,
            DraftState::Pristine | DraftState::Finalized => &self.base,
        }
    }

    /// Get mutable access, copying the base snapshot on first write.
    ///
    /// # Panics
    ///
    /// Panics if the draft has been finalized.
    pub fn write(&mut self) -> &mut S {
        if let DraftState::Pristine = self.state {
            self.state = DraftState::Modified(Arc::clone(&self.base));
        }

        match &mut self.state {
            DraftState::Modified(working) => Arc::make_mut(working),
            _ => panic!("draft for version {} written after finalization", self.version),
        }
    }

    /// Turn the draft into a snapshot.
    ///
    /// Returns `None` when nothing was written, in which case the base
    /// snapshot remains current.
    pub fn finalize(&mut self) -> Result<Option<Arc<S>>> {
        match std::mem::replace(&mut self.state, DraftState::Finalized) {
            DraftState::Pristine => Ok(None),
            DraftState::Modified(working) => Ok(Some(working)),
            DraftState::Finalized => Err(StoreError::DraftFinalization {
                version: self.version,
            }),
        }
    }
}

/// The result of a commit.
#[derive(Debug, Clone)]
pub struct Commit<S> {
    /// The snapshot current after the commit.
    pub snapshot: Arc<S>,

    /// Version of `snapshot`.
    pub version: u64,

    /// Whether the commit published a new snapshot.
    pub changed: bool,
}

/// The published snapshot and its version.
struct Published<S> {
    snapshot: Arc<S>,
    version: u64,
}

/// Owns the current snapshot and the live draft.
pub struct DraftManager<S> {
    /// Identity used by the mutation context.
    id: StoreId,

    /// The current snapshot.
    published: RwLock<Published<S>>,

    /// The live draft. Shared with every [`DraftHandle`].
    draft: Arc<Mutex<Draft<S>>>,
}

impl<S> DraftManager<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a manager whose first snapshot is `initial`.
    pub fn new(initial: S) -> Self {
        let snapshot = Arc::new(initial);

        Self {
            id: StoreId::new(),
            draft: Arc::new(Mutex::new(Draft::new(Arc::clone(&snapshot), 0))),
            published: RwLock::new(Published {
                snapshot,
                version: 0,
            }),
        }
    }

    /// Identity of the store this manager belongs to.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Get the current snapshot.
    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.published.read().snapshot)
    }

    /// Get the current snapshot together with its version.
    pub fn snapshot_with_version(&self) -> (Arc<S>, u64) {
        let published = self.published.read();
        (Arc::clone(&published.snapshot), published.version)
    }

    /// Version of the current snapshot. Starts at 0, grows by one per
    /// commit that changed something.
    pub fn version(&self) -> u64 {
        self.published.read().version
    }

    /// Get a handle that always resolves to the live draft.
    pub fn handle(&self) -> DraftHandle<S> {
        DraftHandle::new(self.id, Arc::clone(&self.draft))
    }

    /// Check if the live draft holds uncommitted writes.
    pub fn has_pending_changes(&self) -> bool {
        self.handle().is_dirty()
    }

    /// Finalize the live draft into a new snapshot and derive a fresh draft.
    pub fn commit(&self) -> Result<Commit<S>> {
        if MutationContext::is_active(self.id) {
            return Err(StoreError::ReentrantCommit);
        }

        let mut draft = self.draft.lock();

        let commit = match draft.finalize()? {
            None => {
                let published = self.published.read();
                Commit {
                    snapshot: Arc::clone(&published.snapshot),
                    version: published.version,
                    changed: false,
                }
            }
            Some(next) => {
                let mut published = self.published.write();
                published.version += 1;
                published.snapshot = Arc::clone(&next);
                Commit {
                    snapshot: next,
                    version: published.version,
                    changed: true,
                }
            }
        };

        *draft = Draft::new(Arc::clone(&commit.snapshot), commit.version);

        trace!(version = commit.version, changed = commit.changed, "draft finalized");

        Ok(commit)
    }

    /// Throw away uncommitted writes.
    pub fn reset(&self) {
        let (snapshot, version) = self.snapshot_with_version();
        *self.draft.lock() = Draft::new(snapshot, version);
    }
}
