//! Commit Batching
//!
//! Synchronous actions do not commit on their own. The first action in a
//! batch opens it and schedules one commit task; every further action in the
//! same batch only mutates the draft. When the task runs, everything the
//! batch wrote is committed at once.
//!
//! # Overview
//!
//! - [`Batch`] is the state machine (`Idle`, `Pending`, `Committing`) that
//!   makes scheduling idempotent within a batch.
//! - [`CommitScheduler`] decides when the scheduled task runs. The tokio
//!   scheduler defers to the end of the current tick or a fixed delay; the
//!   manual scheduler waits to be drained.

mod scheduler;
mod state;

pub use scheduler::{CommitScheduler, CommitTask, ManualScheduler, TokioScheduler};
pub use state::{Batch, BatchState};
