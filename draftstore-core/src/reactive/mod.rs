//! Selector Subscriptions
//!
//! This module implements the read side of the store: selectors, the
//! registry that re-evaluates them after every commit, and the slot a
//! rendering component uses to subscribe.
//!
//! # Concepts
//!
//! ## Selectors
//!
//! A selector is a pure function from a snapshot to a projection. Each
//! registration gets a [`SubscriberId`]; entries are keyed by that token, not
//! by closure identity.
//!
//! ## Change Detection
//!
//! After a commit, every selector runs against the new snapshot and its
//! projection is compared with the last delivered one by `PartialEq`. Only
//! changed projections are delivered, which is what keeps subscribers whose
//! slice of state did not change from re-rendering.
//!
//! ## Slots
//!
//! A [`SelectorSlot`] ties a registration to a component's render passes and
//! lifetime: re-registering when dependencies change, unregistering on
//! teardown, and ignoring deliveries that arrive after it.
//!
//! ## Memoized Selectors
//!
//! [`memoize`] builds selectors whose expensive combine step only runs when
//! its inputs change.

mod memo;
mod registry;
mod slot;
mod subscriber;

pub use memo::{memoize, Memo};
pub use registry::{NotifyReport, SelectorRegistry};
pub use slot::SelectorSlot;
pub use subscriber::SubscriberId;
