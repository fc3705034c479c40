//! Threaded implementation of the deferred-execution facility.
//!
//! A dedicated worker thread pulls submitted jobs and runs them to
//! completion, one at a time, preserving submission order. Because the
//! engine coalesces upstream the queue holds at most one drain pass per
//! engine, but the queue itself does not depend on that.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::platform::{DeferredJob, WorkQueue};

struct QueueState {
    jobs: VecDeque<Arc<dyn DeferredJob>>,
    shutdown: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    available: Condvar,
}

/// A work queue backed by one worker thread.
///
/// Dropping the queue stops the worker after it has finished every job
/// already submitted; in-flight work is never cancelled.
pub struct ThreadedWorkQueue {
    inner: Arc<QueueInner>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedWorkQueue {
    pub fn new(name: &str) -> Self {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let thread_inner = inner.clone();
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(thread_inner))
            .expect("failed to spawn deferred work thread");

        Self {
            inner,
            worker: Some(worker),
        }
    }

    fn run(inner: Arc<QueueInner>) {
        loop {
            let job = {
                let mut state = inner.state.lock().expect("work queue poisoned");
                loop {
                    if let Some(job) = state.jobs.pop_front() {
                        break job;
                    }
                    if state.shutdown {
                        return;
                    }
                    state = inner.available.wait(state).expect("work queue poisoned");
                }
            };
            job.run();
        }
    }
}

impl WorkQueue for ThreadedWorkQueue {
    fn submit(&self, job: Arc<dyn DeferredJob>) {
        let mut state = self.inner.state.lock().expect("work queue poisoned");
        state.jobs.push_back(job);
        self.inner.available.notify_one();
    }
}

impl Drop for ThreadedWorkQueue {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock().expect("work queue poisoned");
            state.shutdown = true;
            self.inner.available.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
