//! Draft Handle
//!
//! A `DraftHandle` is the stable way to reach the live draft. It never holds
//! the draft itself, only the cell the draft manager swaps drafts into, and it
//! dereferences that cell on every access. Code that captured a handle before
//! a commit and resumes after it (an async mutator crossing an `.await`) keeps
//! writing to the draft that is live *now*, never to a finalized one.
//!
//! Borrows of the draft only exist inside the closures passed to the handle,
//! so they cannot be held across a suspension point.

use std::sync::Arc;

use parking_lot::Mutex;

use super::context::{MutationContext, StoreId};
use super::manager::Draft;

/// Forwarding handle to whichever draft is currently live.
pub struct DraftHandle<S> {
    store: StoreId,
    cell: Arc<Mutex<Draft<S>>>,
}

impl<S> DraftHandle<S>
where
    S: Clone,
{
    pub(crate) fn new(store: StoreId, cell: Arc<Mutex<Draft<S>>>) -> Self {
        Self { store, cell }
    }

    /// Read through the live draft.
    pub fn get<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let _ctx = MutationContext::enter(self.store);
        let draft = self.cell.lock();
        f(draft.read())
    }

    /// Write through the live draft.
    ///
    /// The first write in a batch copies the snapshot the draft was derived
    /// from; later writes reuse the copy.
    pub fn set<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut S) -> T,
    {
        let _ctx = MutationContext::enter(self.store);
        let mut draft = self.cell.lock();
        f(draft.write())
    }

    /// Replace the whole draft value, returning the previous one.
    pub fn replace(&self, value: S) -> S {
        self.set(|state| std::mem::replace(state, value))
    }

    /// Check for the existence of something in the live draft.
    pub fn has<F>(&self, f: F) -> bool
    where
        F: FnOnce(&S) -> bool,
    {
        self.get(f)
    }

    /// Remove something from the live draft.
    pub fn delete<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut S) -> Option<T>,
    {
        self.set(f)
    }

    /// Check if the live draft holds uncommitted writes.
    pub fn is_dirty(&self) -> bool {
        let _ctx = MutationContext::enter(self.store);
        self.cell.lock().is_dirty()
    }

    /// Version of the snapshot the live draft was derived from.
    pub fn base_version(&self) -> u64 {
        let _ctx = MutationContext::enter(self.store);
        self.cell.lock().version()
    }
}

impl<S> Clone for DraftHandle<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<S> std::fmt::Debug for DraftHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftHandle")
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::draft::DraftManager;

    type Settings = BTreeMap<String, String>;

    fn manager() -> DraftManager<Settings> {
        let mut settings = Settings::new();
        settings.insert("title".into(), "hello".into());
        DraftManager::new(settings)
    }

    #[test]
    fn handle_forwards_all_operations() {
        let manager = manager();
        let draft = manager.handle();

        assert_eq!(draft.get(|s| s.get("title").cloned()), Some("hello".into()));
        assert!(draft.has(|s| s.contains_key("title")));

        draft.set(|s| s.insert("button".into(), "ok".into()));
        assert!(draft.has(|s| s.contains_key("button")));

        assert_eq!(draft.delete(|s| s.remove("title")), Some("hello".into()));
        assert!(!draft.has(|s| s.contains_key("title")));

        let previous = draft.replace(Settings::new());
        assert_eq!(previous.len(), 1);
        assert!(draft.get(|s| s.is_empty()));
    }

    #[test]
    fn handle_survives_commit() {
        let manager = manager();
        let captured = manager.handle();

        captured.set(|s| s.insert("a".into(), "1".into()));
        manager.commit().unwrap();
        assert_eq!(captured.base_version(), 1);
        assert!(!captured.is_dirty());

        // The handle captured before the commit writes to the new draft
        captured.set(|s| s.insert("b".into(), "2".into()));
        assert!(captured.is_dirty());

        let commit = manager.commit().unwrap();
        assert!(commit.changed);
        assert_eq!(commit.snapshot.get("a").map(String::as_str), Some("1"));
        assert_eq!(commit.snapshot.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn clones_share_the_live_draft() {
        let manager = manager();
        let a = manager.handle();
        let b = a.clone();

        a.set(|s| s.insert("k".into(), "v".into()));
        assert!(b.has(|s| s.contains_key("k")));
    }

    #[test]
    fn reads_do_not_dirty_the_draft() {
        let manager = manager();
        let draft = manager.handle();

        draft.get(|s| s.len());
        draft.has(|s| s.is_empty());

        assert!(!draft.is_dirty());
    }
}
