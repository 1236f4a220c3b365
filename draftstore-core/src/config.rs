//! Store Configuration
//!
//! The only tunable of the container is how synchronous actions are batched
//! into commits. Configuration is plain data so applications can load it from
//! JSON alongside their other settings.
//!
//! ```json
//! { "batch": { "delay": { "delay_ms": 16 } }, "label": "app" }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// When a batch of synchronous actions is flushed into a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Commit once the currently running task yields.
    #[default]
    EndOfTick,

    /// Commit after a fixed delay, coalescing bursts spaced slightly apart.
    Delay {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
}

impl BatchPolicy {
    /// Delay policy from a [`Duration`].
    pub fn delay(delay: Duration) -> Self {
        Self::Delay {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// The delay to wait before committing, if any.
    pub fn delay_duration(&self) -> Option<Duration> {
        match self {
            Self::EndOfTick => None,
            Self::Delay { delay_ms } => Some(Duration::from_millis(*delay_ms)),
        }
    }
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Commit batching policy.
    pub batch: BatchPolicy,

    /// Name attached to log events emitted by the store.
    pub label: Option<String>,
}

impl StoreConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the batching policy.
    pub fn with_batch(mut self, batch: BatchPolicy) -> Self {
        self.batch = batch;
        self
    }

    /// Set the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("store")
    }
}
