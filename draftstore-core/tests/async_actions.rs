//! Integration Tests for Batching on the Tokio Scheduler
//!
//! Most of these tests run the store on a current-thread runtime, so "the end
//! of the tick" is the point where the test task yields. The multi-thread
//! test uses a delay policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use draftstore_core::{BatchPolicy, DraftHandle, Store, StoreConfig};

#[derive(Debug, Clone, Default, PartialEq)]
struct State {
    log: Vec<String>,
    counter: i64,
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn record_deliveries<R>(store: &Store<State>, selector: fn(&State) -> R) -> Arc<Mutex<Vec<R>>>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    let deliveries = Arc::new(Mutex::new(Vec::new()));
    let deliveries_clone = deliveries.clone();
    let (subscription, _) = store.subscribe(selector, move |value| {
        deliveries_clone.lock().push(value)
    });
    // Keep the entry for the rest of the test
    std::mem::forget(subscription);
    deliveries
}

/// Test that actions issued within one tick commit once at its end.
#[tokio::test]
async fn sync_actions_coalesce_per_tick() {
    let store = Store::new(State::default());
    let increment = store.create_action(|s: &mut State, by: i64| s.counter += by);
    let deliveries = record_deliveries(&store, |s| s.counter);

    increment.call(1);
    increment.call(2);
    increment.call(3);

    assert!(store.is_commit_pending());
    assert_eq!(store.snapshot().counter, 0);

    settle().await;

    assert_eq!(store.version(), 1);
    assert_eq!(*deliveries.lock(), vec![6]);
}

/// Test that the delay policy coalesces actions spaced slightly apart.
#[tokio::test(start_paused = true)]
async fn delay_policy_coalesces_bursts() {
    let config = StoreConfig::default().with_batch(BatchPolicy::delay(Duration::from_millis(20)));
    let store = Store::with_config(State::default(), config);
    let increment = store.create_action(|s: &mut State, by: i64| s.counter += by);
    let deliveries = record_deliveries(&store, |s| s.counter);

    increment.call(1);
    tokio::time::sleep(Duration::from_millis(5)).await;
    increment.call(1);
    tokio::time::sleep(Duration::from_millis(5)).await;
    increment.call(1);

    assert_eq!(store.version(), 0);

    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(store.version(), 1);
    assert_eq!(*deliveries.lock(), vec![3]);
}

/// Test that an async action's writes before and after a suspension point
/// land in one snapshot.
#[tokio::test(start_paused = true)]
async fn async_action_commits_one_coherent_snapshot() {
    let store = Store::new(State::default());
    let deliveries = record_deliveries(&store, |s| s.log.clone());

    let fetch = store.create_async_action(|draft: DraftHandle<State>, name: &'static str| async move {
        draft.set(|s| s.log.push(format!("{name}: loading")));
        tokio::time::sleep(Duration::from_millis(100)).await;
        draft.set(|s| s.log.push(format!("{name}: done")));
    });

    let pending = tokio::spawn(fetch.call("photos"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(deliveries.lock().is_empty());
    assert_eq!(store.version(), 0);

    pending.await.unwrap();

    assert_eq!(store.version(), 1);
    assert_eq!(
        *deliveries.lock(),
        vec![vec!["photos: loading".to_string(), "photos: done".to_string()]]
    );
}

/// Test that overlapping async actions each commit when they finish.
#[tokio::test(start_paused = true)]
async fn overlapping_async_actions_commit_independently() {
    let store = Store::new(State::default());
    let commits = Arc::new(AtomicUsize::new(0));
    let commits_clone = commits.clone();
    let (_sub, _) = store.subscribe(|s: &State| s.counter, move |_| {
        commits_clone.fetch_add(1, Ordering::SeqCst);
    });

    let slow_add = store.create_async_action(|draft: DraftHandle<State>, (by, wait): (i64, u64)| async move {
        tokio::time::sleep(Duration::from_millis(wait)).await;
        draft.set(|s| s.counter += by);
    });

    let first = tokio::spawn(slow_add.call((1, 10)));
    let second = tokio::spawn(slow_add.call((10, 30)));

    first.await.unwrap();
    assert_eq!(store.version(), 1);
    assert_eq!(store.snapshot().counter, 1);

    second.await.unwrap();
    assert_eq!(store.version(), 2);
    assert_eq!(store.snapshot().counter, 11);
    assert_eq!(commits.load(Ordering::SeqCst), 2);
}

/// Test that a tick commit during an async action's suspension folds in the
/// writes it already made, and that its own commit follows on completion.
#[tokio::test(start_paused = true)]
async fn tick_commit_folds_in_partial_async_writes() {
    let store = Store::new(State::default());
    let note = store.create_action(|s: &mut State, line: &'static str| s.log.push(line.to_string()));
    let job = store.create_async_action(|draft: DraftHandle<State>, _: ()| async move {
        draft.set(|s| s.log.push("job: start".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        draft.set(|s| s.log.push("job: end".to_string()));
    });

    let running = tokio::spawn(job.call(()));
    settle().await;

    note.call("click");
    settle().await;

    assert_eq!(store.version(), 1);
    assert_eq!(store.snapshot().log, vec!["job: start", "click"]);

    running.await.unwrap();

    assert_eq!(store.version(), 2);
    assert_eq!(store.snapshot().log, vec!["job: start", "click", "job: end"]);
}

/// Test that a handle captured before a commit writes to the new draft.
#[tokio::test]
async fn captured_handle_follows_commits() {
    let store = Store::new(State::default());
    let draft = store.draft();
    let increment = store.create_action(|s: &mut State, by: i64| s.counter += by);

    increment.call(1);
    settle().await;
    assert_eq!(store.version(), 1);

    draft.set(|s| s.counter += 100);
    store.commit().unwrap();

    assert_eq!(store.snapshot().counter, 101);
}

/// Test that async mutator errors reach the caller and keep partial writes.
#[tokio::test]
async fn async_mutator_errors_propagate() {
    let store = Store::new(State::default());
    let risky = store.create_async_action(|draft: DraftHandle<State>, fail: bool| async move {
        draft.set(|s| s.log.push("attempt".to_string()));
        tokio::task::yield_now().await;
        if fail {
            return Err("remote refused");
        }
        draft.set(|s| s.counter += 1);
        Ok(())
    });

    assert_eq!(risky.call(true).await, Err("remote refused"));
    assert_eq!(store.snapshot().log, vec!["attempt"]);
    assert_eq!(store.snapshot().counter, 0);

    assert_eq!(risky.call(false).await, Ok(()));
    assert_eq!(store.snapshot().counter, 1);
}

/// Test that a sync action and an async completion in the same tick share
/// the draft but not the batch: the async commit publishes both writes and
/// the scheduled commit still runs for what follows.
#[tokio::test]
async fn async_completion_in_same_tick_keeps_sync_batch() {
    let store = Store::new(State::default());
    let increment = store.create_action(|s: &mut State, by: i64| s.counter += by);
    let instant = store.create_async_action(|draft: DraftHandle<State>, by: i64| async move {
        draft.set(|s| s.counter += by);
    });
    let deliveries = record_deliveries(&store, |s| s.counter);

    increment.call(1);
    instant.call(10).await;

    assert_eq!(store.version(), 1);
    assert_eq!(store.snapshot().counter, 11);
    assert!(store.is_commit_pending());

    increment.call(100);
    settle().await;

    assert_eq!(store.version(), 2);
    assert_eq!(*deliveries.lock(), vec![11, 111]);
    assert!(!store.is_commit_pending());
}

/// Test that a delay policy coalesces a burst on a multi-thread runtime.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delay_policy_coalesces_on_multi_thread_runtime() {
    let config = StoreConfig::default().with_batch(BatchPolicy::delay(Duration::from_millis(200)));
    let store = Store::with_config(State::default(), config);
    let increment = store.create_action(|s: &mut State, by: i64| s.counter += by);
    let deliveries = record_deliveries(&store, |s| s.counter);

    for _ in 0..1_000 {
        increment.call(1);
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(store.version(), 1);
    assert_eq!(*deliveries.lock(), vec![1_000]);
}
