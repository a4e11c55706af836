//! Fixed-size worker pool with caller-runs backpressure and a per-batch barrier.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use log::{error, info};

use crate::error::RenderError;

// ===================================================================================
// Completion latch
// ===================================================================================

/// Count-down barrier that also tallies failed tasks.
#[derive(Debug)]
pub struct CompletionLatch {
    state: Mutex<LatchState>,
    released: Condvar,
}

#[derive(Debug)]
struct LatchState {
    remaining: usize,
    failed: usize,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(LatchState {
                remaining: count,
                failed: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Records one finished task.
    pub fn count_down(&self, failed: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.remaining = state.remaining.saturating_sub(1);
        if failed {
            state.failed += 1;
        }
        if state.remaining == 0 {
            self.released.notify_all();
        }
    }

    pub fn remaining(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).remaining
    }

    /// Blocks until the count reaches zero; returns the number of failed tasks.
    pub fn wait(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.remaining > 0 {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.failed
    }
}

// ===================================================================================
// Worker pool
// ===================================================================================

/// Outcome of one [`WorkerPool::run_batch`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub submitted: usize,
    /// Tasks executed on the submitting thread because the queue was full.
    pub ran_on_caller: usize,
    /// Tasks that panicked.
    pub failed: usize,
}

/// A `rayon` pool of `threads` workers that queues at most `queue_capacity` tasks.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(threads: usize, queue_capacity: usize) -> Result<Self, RenderError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("calculation-thread-{}", i + 1))
            .build()?;
        info!(
            "worker pool: {} threads, queue capacity {}",
            pool.current_num_threads(),
            queue_capacity
        );
        Ok(Self {
            pool,
            queue_capacity: queue_capacity.max(1),
        })
    }

    /// Runs every `(label, task)` pair and blocks until all tasks have finished.
    ///
    /// Tasks are handed to the workers while fewer than `queue_capacity` are
    /// waiting to start; past that the calling thread runs the task itself.
    /// A panicking task is logged with its label and counted, it does not
    /// affect the others.
    pub fn run_batch<'s, I, L, F>(&self, tasks: I) -> BatchReport
    where
        I: IntoIterator<Item = (L, F)>,
        L: fmt::Debug + Send + 's,
        F: FnOnce() + Send + 's,
    {
        let tasks: Vec<(L, F)> = tasks.into_iter().collect();
        let latch = CompletionLatch::new(tasks.len());
        let queued = AtomicUsize::new(0);
        let mut report = BatchReport {
            submitted: tasks.len(),
            ..BatchReport::default()
        };

        self.pool.in_place_scope(|scope| {
            for (label, task) in tasks {
                if queued.load(Ordering::Acquire) >= self.queue_capacity {
                    report.ran_on_caller += 1;
                    latch.count_down(!run_guarded(&label, task));
                    continue;
                }
                queued.fetch_add(1, Ordering::AcqRel);
                let (latch, queued) = (&latch, &queued);
                scope.spawn(move |_| {
                    queued.fetch_sub(1, Ordering::AcqRel);
                    latch.count_down(!run_guarded(&label, task));
                });
            }
            report.failed = latch.wait();
        });
        report
    }
}

/// Runs `task`, returning `false` if it panicked.
fn run_guarded<L: fmt::Debug, F: FnOnce()>(label: &L, task: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!("task {:?} panicked: {}", label, message);
            false
        }
    }
}
