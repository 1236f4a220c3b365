//! Draftstore Core
//!
//! This crate provides a small reactive state container. It implements:
//!
//! - Immutable snapshots with a copy-on-write draft for mutations
//! - Actions whose mutations are batched into a single commit
//! - Selector subscriptions that are notified only when their projection
//!   changed
//! - A subscription slot for rendering components
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `draft`: Snapshots, the live draft and the handle that reaches it
//! - `batch`: Batch state machine and commit schedulers
//! - `reactive`: Selector registry, memoized selectors and subscription slots
//! - `store`: The store and its actions
//! - `config`: Store configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use draftstore_core::Store;
//!
//! #[derive(Clone)]
//! struct State {
//!     colors: Arc<Vec<String>>,
//!     cities: Arc<Vec<String>>,
//! }
//!
//! let store = Store::new(State { /* ... */ });
//!
//! // Register a selector
//! let (_sub, colors) = store.subscribe(
//!     |s: &State| s.colors.clone(),
//!     |colors| println!("colors changed: {colors:?}"),
//! );
//!
//! // Create an action
//! let add_color = store.create_action(|s: &mut State, color: String| {
//!     Arc::make_mut(&mut s.colors).push(color);
//! });
//!
//! add_color.call("blue".into());
//! add_color.call("black".into());
//! // One commit at the end of the tick, one delivery: "colors changed: ..."
//! ```

pub mod batch;
pub mod config;
pub mod draft;
pub mod error;
pub mod reactive;
pub mod store;

pub use batch::{BatchState, CommitScheduler, ManualScheduler, TokioScheduler};
pub use config::{BatchPolicy, StoreConfig};
pub use draft::DraftHandle;
pub use error::{Result, SelectorEvaluationError, StoreError};
pub use reactive::{memoize, SelectorSlot, SubscriberId};
pub use store::{Action, AsyncAction, CommitReport, Store, Subscription};
