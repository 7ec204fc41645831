//! Pluggable scheduling primitives.
//!
//! The engine defers two things: the per-tick commit (analogous to a
//! per-frame callback) and the analysis pass (idle-time work). Hosts with
//! real frame/idle primitives adapt them behind [`Scheduler`]; everything
//! else falls back to [`InlineScheduler`], which runs callbacks immediately
//! and guarantees forward progress in headless environments.
//!
//! The engine always releases its internal lock before invoking the
//! scheduler, so an implementation is free to run the callback on the spot.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A deferred unit of engine work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Host-provided scheduling primitives.
pub trait Scheduler: Send + Sync {
    /// Schedule the next tick commit ("next frame").
    fn schedule_tick(&self, task: Task);

    /// Schedule deferred analysis work ("idle time").
    fn schedule_idle(&self, task: Task);
}

/// Synchronous fallback: every callback runs immediately.
///
/// Note that immediate ticks commit inside `record()`, so same-tick
/// coalescing across separate `record` calls does not happen; each pulse
/// gets its own tick. Use [`ManualScheduler`] when deterministic batching
/// matters (tests, replay harnesses).
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn schedule_tick(&self, task: Task) {
        task();
    }

    fn schedule_idle(&self, task: Task) {
        task();
    }
}

/// Queueing scheduler for deterministic tests: callbacks accumulate until
/// the owner pumps them with [`ManualScheduler::flush`].
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run queued tasks until the queue drains, including tasks enqueued by
    /// the tasks themselves (a tick commit scheduling an analysis pass).
    pub fn flush(&self) {
        loop {
            let Some(task) = self.queue.lock().pop_front() else {
                break;
            };
            // The lock is released before the task runs; tasks may re-enter.
            task();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_tick(&self, task: Task) {
        self.queue.lock().push_back(task);
    }

    fn schedule_idle(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}
