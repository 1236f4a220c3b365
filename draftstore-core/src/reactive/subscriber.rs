//! Subscriber tokens.
//!
//! Every registry entry is keyed by a `SubscriberId` handed out when the
//! selector is registered. The consumer keeps the token and presents it to
//! unsubscribe, so entries never depend on closure identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

/// Token for one selector registration.
///
/// Tokens are process-wide: a token from one store never matches an entry of
/// another, and a token is never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a fresh token.
    pub fn new() -> Self {
        Self(NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw token value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}
