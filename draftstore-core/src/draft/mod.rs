//! Drafts and Snapshots
//!
//! This module implements the state side of the container: an immutable
//! published snapshot, a copy-on-write draft derived from it, and the handle
//! through which mutators reach the draft.
//!
//! # Concepts
//!
//! ## Snapshots
//!
//! A snapshot is an `Arc<S>` that is never mutated once published. Exactly
//! one snapshot is current at any time. Readers clone the `Arc`.
//!
//! ## Drafts
//!
//! A draft is the working copy mutations go to. It is created from the
//! current snapshot, copied on its first write, and finalized into the next
//! snapshot on commit.
//!
//! ## Handles
//!
//! A [`DraftHandle`] forwards every read and write to whichever draft is live
//! when the access happens. Handles stay valid across commits.

mod context;
mod handle;
mod manager;

pub use context::{MutationContext, StoreId};
pub use handle::DraftHandle;
pub use manager::{Commit, Draft, DraftManager};
