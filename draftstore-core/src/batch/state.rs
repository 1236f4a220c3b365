//! Batch State
//!
//! The batch state machine decides when a commit has to be scheduled:
//!
//! ```text
//!   Idle ──request──▶ Pending{batch} ──begin_scheduled(batch)──▶ Committing ──finish──▶ Idle
//!                         │                                          │
//!                         └────────────begin_manual──────────────────┘
//! ```
//!
//! Requests while `Pending` are no-ops, which is what collapses a burst of
//! actions into one commit. Requests while `Committing` (an action run from a
//! delivery callback) mark a follow-up batch that is scheduled when the
//! running commit finishes.
//!
//! An async action's terminal commit starts with `begin_async`. It commits
//! whatever the draft holds but leaves a pending batch in place: when it
//! finishes the store is `Pending` on the same batch again and the scheduled
//! task still runs.

use crate::error::{Result, StoreError};

/// Where the store is in its commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No commit is scheduled.
    Idle,

    /// A commit is scheduled for the given batch.
    Pending {
        /// Batch number the scheduled task carries.
        batch: u64,
    },

    /// A commit is finalizing or notifying.
    Committing {
        /// An action requested another commit while this one ran.
        follow_up: bool,

        /// Pending batch to return to when this commit finishes.
        resume: Option<u64>,
    },
}

/// Batch bookkeeping for one store.
#[derive(Debug)]
pub struct Batch {
    state: BatchState,
    next_batch: u64,
}

impl Batch {
    /// Create an idle batch tracker.
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
            next_batch: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Check if a commit is scheduled and has not started yet.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, BatchState::Pending { .. })
    }

    /// Request a commit.
    ///
    /// Returns the batch number to schedule when a new batch was opened, or
    /// `None` when an existing batch or a follow-up already covers it.
    pub fn request(&mut self) -> Option<u64> {
        match self.state {
            BatchState::Idle => Some(self.open()),
            BatchState::Pending { .. } => None,
            BatchState::Committing { resume, .. } => {
                self.state = BatchState::Committing {
                    follow_up: true,
                    resume,
                };
                None
            }
        }
    }

    /// Start the scheduled commit for `batch`.
    ///
    /// Returns `false` when the batch is stale, i.e. a manual commit already
    /// flushed it. The scheduled task must then do nothing.
    pub fn begin_scheduled(&mut self, batch: u64) -> bool {
        match self.state {
            BatchState::Pending { batch: pending } if pending == batch => {
                self.state = BatchState::Committing {
                    follow_up: false,
                    resume: None,
                };
                true
            }
            // The task fired while an async commit held its batch; hand the
            // batch over to a follow-up so it is not lost
            BatchState::Committing {
                resume: Some(pending),
                ..
            } if pending == batch => {
                self.state = BatchState::Committing {
                    follow_up: true,
                    resume: None,
                };
                false
            }
            _ => false,
        }
    }

    /// Start a commit outside the schedule. A pending batch is absorbed.
    pub fn begin_manual(&mut self) -> Result<()> {
        match self.state {
            BatchState::Idle | BatchState::Pending { .. } => {
                self.state = BatchState::Committing {
                    follow_up: false,
                    resume: None,
                };
                Ok(())
            }
            BatchState::Committing { .. } => Err(StoreError::ReentrantCommit),
        }
    }

    /// Start an async action's terminal commit. A pending batch stays
    /// scheduled and becomes current again on `finish`.
    pub fn begin_async(&mut self) -> Result<()> {
        let resume = match self.state {
            BatchState::Idle => None,
            BatchState::Pending { batch } => Some(batch),
            BatchState::Committing { .. } => return Err(StoreError::ReentrantCommit),
        };
        self.state = BatchState::Committing {
            follow_up: false,
            resume,
        };
        Ok(())
    }

    /// Finish the running commit.
    ///
    /// Returns the batch number to schedule when a follow-up was requested.
    pub fn finish(&mut self) -> Option<u64> {
        match self.state {
            // The resumed batch's task covers any follow-up request
            BatchState::Committing {
                resume: Some(batch),
                ..
            } => {
                self.state = BatchState::Pending { batch };
                None
            }
            BatchState::Committing {
                follow_up: true, ..
            } => Some(self.open()),
            _ => {
                self.state = BatchState::Idle;
                None
            }
        }
    }

    fn open(&mut self) -> u64 {
        let batch = self.next_batch;
        self.next_batch += 1;
        self.state = BatchState::Pending { batch };
        batch
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}
