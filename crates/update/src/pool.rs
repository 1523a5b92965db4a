//! Fixed-size worker pool for map updates.
//!
//! Jobs are sent over a crossbeam channel; a pending counter guarded by a
//! mutex and condvar lets the scheduler block until every job scheduled so
//! far has finished.

use crossbeam_channel::{Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    done: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.done.wait(&mut count);
        }
    }
}

/// Worker pool running map update jobs. Inactive pools run jobs inline.
#[derive(Default)]
pub struct MapUpdater {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl MapUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `threads` workers. Does nothing if already active or if
    /// `threads` is zero.
    pub fn activate(&mut self, threads: usize) {
        if self.activated() || threads == 0 {
            return;
        }
        let (sender, receiver) = unbounded::<Job>();
        for index in 0..threads {
            let receiver = receiver.clone();
            let pending = Arc::clone(&self.pending);
            let handle = thread::Builder::new()
                .name(format!("map-update-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(worker = index, "map update job panicked");
                        }
                        pending.finish();
                    }
                });
            match handle {
                Ok(handle) => self.workers.push(handle),
                Err(e) => tracing::warn!(worker = index, error = %e, "failed to spawn map update worker"),
            }
        }
        if self.workers.is_empty() {
            return;
        }
        self.sender = Some(sender);
        tracing::info!(threads = self.workers.len(), "map update pool activated");
    }

    /// Stop accepting work and join every worker after it drains the queue.
    pub fn deactivate(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        drop(sender);
        let threads = self.workers.len();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("map update worker exited abnormally");
            }
        }
        tracing::info!(threads, "map update pool deactivated");
    }

    pub fn activated(&self) -> bool {
        self.sender.is_some()
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job`, or run it now when the pool is inactive.
    pub fn schedule<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            job();
            return;
        };
        self.pending.add();
        if let Err(rejected) = sender.send(Box::new(job)) {
            // every receiver is gone; keep the barrier honest
            self.pending.finish();
            (rejected.into_inner())();
        }
    }

    /// Block until every scheduled job has finished.
    pub fn wait(&self) {
        self.pending.wait();
    }
}

impl Drop for MapUpdater {
    fn drop(&mut self) {
        self.deactivate();
    }
}
