//! Memoized Selectors
//!
//! Selectors run against every committed snapshot, so a selector that builds
//! an expensive derived value (joining users with their photos, formatting a
//! report) pays for it on every commit even when its inputs did not move.
//!
//! A memoized selector splits the work in two:
//!
//! 1. An *input* projection picks the parts of the snapshot the result
//!    depends on. It should be cheap.
//!
//! 2. A *combine* step builds the derived value from the inputs. It only runs
//!    when the inputs differ from the previous evaluation.
//!
//! The cached output is cloned out on every call, so outputs that are large
//! should be wrapped in `Arc`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Cached inputs and output of the last evaluation.
struct Cached<I, R> {
    input: I,
    output: R,
}

/// A selector that re-runs its combine step only when its inputs change.
pub struct Memo<S, I, R> {
    input: Arc<dyn Fn(&S) -> I + Send + Sync>,
    combine: Arc<dyn Fn(&I) -> R + Send + Sync>,
    cache: Arc<Mutex<Option<Cached<I, R>>>>,
    recomputes: Arc<AtomicUsize>,
}

impl<S, I, R> Memo<S, I, R>
where
    I: PartialEq,
    R: Clone,
{
    /// Create a memoized selector from an input projection and a combine step.
    pub fn new<FI, FC>(input: FI, combine: FC) -> Self
    where
        FI: Fn(&S) -> I + Send + Sync + 'static,
        FC: Fn(&I) -> R + Send + Sync + 'static,
    {
        Self {
            input: Arc::new(input),
            combine: Arc::new(combine),
            cache: Arc::new(Mutex::new(None)),
            recomputes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Evaluate against a snapshot.
    pub fn get(&self, snapshot: &S) -> R {
        let input = (self.input)(snapshot);

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.input == input {
                return cached.output.clone();
            }
        }

        let output = (self.combine)(&input);
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        *cache = Some(Cached {
            input,
            output: output.clone(),
        });

        output
    }

    /// Number of times the combine step has run.
    pub fn recompute_count(&self) -> usize {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Check if the memo holds a cached value.
    pub fn has_value(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// Turn the memo into a plain selector closure.
    pub fn into_selector(self) -> impl Fn(&S) -> R + Send + Sync + 'static
    where
        S: 'static,
        I: Send + 'static,
        R: Send + 'static,
    {
        move |snapshot: &S| self.get(snapshot)
    }
}

impl<S, I, R> Clone for Memo<S, I, R> {
    fn clone(&self) -> Self {
        Self {
            input: Arc::clone(&self.input),
            combine: Arc::clone(&self.combine),
            cache: Arc::clone(&self.cache),
            recomputes: Arc::clone(&self.recomputes),
        }
    }
}

/// Build a memoized selector closure.
///
/// ```rust,ignore
/// let jim = memoize(
///     |s: &State| (s.title.clone(), s.photos.clone()),
///     |(title, photos)| Card::new(title, photos.iter().filter(|p| p.user == "jim")),
/// );
/// let card = slot.select_once(jim);
/// ```
pub fn memoize<S, I, R, FI, FC>(input: FI, combine: FC) -> impl Fn(&S) -> R + Send + Sync + 'static
where
    S: 'static,
    I: PartialEq + Send + 'static,
    R: Clone + Send + 'static,
    FI: Fn(&S) -> I + Send + Sync + 'static,
    FC: Fn(&I) -> R + Send + Sync + 'static,
{
    Memo::new(input, combine).into_selector()
}
