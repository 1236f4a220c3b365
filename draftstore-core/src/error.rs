//! Error types for the store.
//!
//! Most failures in the container are programming-contract violations
//! (finalizing a draft twice, committing from inside a commit). Those are
//! surfaced as [`StoreError`] to manual callers and treated as fatal on the
//! scheduled commit path. Selector failures are the one recoverable class:
//! they are isolated per registry entry and reported alongside the commit.

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The live draft was already finalized into a snapshot.
    #[error("draft for version {version} was already finalized")]
    DraftFinalization {
        /// Version of the snapshot the draft was derived from.
        version: u64,
    },

    /// A commit was requested while another commit was finalizing.
    #[error("commit requested while a commit is already in progress")]
    ReentrantCommit,

    /// A selector failed while being evaluated.
    #[error(transparent)]
    SelectorEvaluation(#[from] SelectorEvaluationError),

    /// The store configuration could not be parsed.
    #[error("invalid store configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// A selector panicked while being evaluated against a snapshot.
///
/// The entry keeps its previously delivered value.
#[derive(Debug, Clone, Error)]
#[error("selector {subscriber:?} failed at version {version}: {message}")]
pub struct SelectorEvaluationError {
    /// Token of the failing registry entry.
    pub subscriber: SubscriberId,
    /// Snapshot version the selector was evaluated against.
    pub version: u64,
    /// Panic payload, when it was a string.
    pub message: String,
}

impl SelectorEvaluationError {
    pub(crate) fn from_panic(
        subscriber: SubscriberId,
        version: u64,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Self {
            subscriber,
            version,
            message,
        }
    }
}
