//! Commit Schedulers
//!
//! A scheduler decides *when* a batch's commit task runs. The store hands it
//! one task per batch together with the configured [`BatchPolicy`].
//!
//! Two schedulers are provided:
//!
//! - [`TokioScheduler`] spawns the task on the ambient tokio runtime. With
//!   `EndOfTick` the task yields once before committing. On a current-thread
//!   runtime that means every action the current task issues before its next
//!   `.await` lands in the same batch. On a multi-thread runtime another
//!   worker can pick the task up mid-burst and split the batch; use `Delay`
//!   there, which sleeps first and coalesces everything issued within the
//!   delay on either flavor.
//!
//! - [`ManualScheduler`] queues tasks until [`ManualScheduler::run_pending`]
//!   is called. Useful for deterministic tests and for hosts that drive their
//!   own frame loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

use crate::config::BatchPolicy;

/// A commit task handed to a scheduler.
pub type CommitTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs commit tasks at the end of a batch.
pub trait CommitScheduler: Send + Sync {
    /// Arrange for `task` to run once the batch described by `policy` ends.
    fn schedule(&self, policy: BatchPolicy, task: CommitTask);
}

/// Scheduler backed by the current tokio runtime.
///
/// Outside a runtime there is no end of tick to wait for; the task runs
/// immediately and every action commits on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

static WARNED_MULTI_THREAD: AtomicBool = AtomicBool::new(false);

impl TokioScheduler {
    /// Create a tokio-backed scheduler.
    pub fn new() -> Self {
        Self
    }

    /// Check if `EndOfTick` batches on the current runtime hold every action
    /// issued before the next `.await`. Only a current-thread runtime
    /// guarantees that.
    pub fn coalesces_end_of_tick() -> bool {
        Handle::try_current()
            .map(|handle| handle.runtime_flavor() == RuntimeFlavor::CurrentThread)
            .unwrap_or(false)
    }
}

impl CommitScheduler for TokioScheduler {
    fn schedule(&self, policy: BatchPolicy, task: CommitTask) {
        match Handle::try_current() {
            Ok(handle) => {
                if policy == BatchPolicy::EndOfTick
                    && handle.runtime_flavor() != RuntimeFlavor::CurrentThread
                    && !WARNED_MULTI_THREAD.swap(true, Ordering::Relaxed)
                {
                    warn!("end-of-tick batching on a multi-thread runtime may split bursts; use a delay policy");
                }
                handle.spawn(async move {
                    match policy.delay_duration() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => tokio::task::yield_now().await,
                    }
                    task();
                });
            }
            Err(_) => {
                warn!("no tokio runtime available, committing immediately");
                task();
            }
        }
    }
}

/// Scheduler that queues tasks until they are drained explicitly.
///
/// Delays are ignored: draining runs everything that is queued.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<CommitTask>>,
}

impl ManualScheduler {
    /// Create an empty manual scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it
            let task = self.queue.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl CommitScheduler for ManualScheduler {
    fn schedule(&self, _policy: BatchPolicy, task: CommitTask) {
        self.queue.lock().push_back(task);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_task(count: &Arc<AtomicI32>) -> CommitTask {
        let count = count.clone();
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn manual_scheduler_queues_until_drained() {
        let scheduler = ManualScheduler::new();
        let count = Arc::new(AtomicI32::new(0));

        scheduler.schedule(BatchPolicy::EndOfTick, counting_task(&count));
        scheduler.schedule(BatchPolicy::delay(Duration::from_secs(60)), counting_task(&count));

        assert_eq!(scheduler.pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn manual_scheduler_runs_tasks_queued_while_draining() {
        let scheduler = Arc::new(ManualScheduler::new());
        let count = Arc::new(AtomicI32::new(0));

        let inner = scheduler.clone();
        let inner_count = count.clone();
        scheduler.schedule(
            BatchPolicy::EndOfTick,
            Box::new(move || {
                inner.schedule(BatchPolicy::EndOfTick, counting_task(&inner_count));
            }),
        );

        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tokio_scheduler_without_runtime_runs_immediately() {
        let count = Arc::new(AtomicI32::new(0));
        TokioScheduler::new().schedule(BatchPolicy::EndOfTick, counting_task(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tokio_scheduler_waits_for_yield() {
        let count = Arc::new(AtomicI32::new(0));
        TokioScheduler::new().schedule(BatchPolicy::EndOfTick, counting_task(&count));

        // Still inside the current tick
        assert_eq!(count.load(Ordering::SeqCst), 0);

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn end_of_tick_coalescing_depends_on_flavor() {
        assert!(!TokioScheduler::coalesces_end_of_tick());

        let current = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert!(current.block_on(async { TokioScheduler::coalesces_end_of_tick() }));

        let multi = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .unwrap();
        assert!(!multi.block_on(async { TokioScheduler::coalesces_end_of_tick() }));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_honors_delay() {
        let count = Arc::new(AtomicI32::new(0));
        TokioScheduler::new().schedule(
            BatchPolicy::delay(Duration::from_millis(50)),
            counting_task(&count),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
