//! Dedicated primary thread
//!
//! All registry mutation and host lifecycle calls run here, one task at a
//! time, in submission order.

use std::panic::AssertUnwindSafe;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error};

use fastswap_kernel::{PrimaryScheduler, PrimaryTask, SchedulerError};

/// A single OS thread draining a task queue.
pub struct PrimaryThread {
    sender: Mutex<Option<flume::Sender<PrimaryTask>>>,
    thread_id: ThreadId,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl PrimaryThread {
    /// Spawn the thread
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = flume::unbounded::<PrimaryTask>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    // A panicking task must not take the queue down with it.
                    if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        error!("Primary thread task panicked");
                    }
                }
                debug!("Primary thread queue closed");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            thread_id: handle.thread().id(),
            join: Mutex::new(Some(handle)),
        })
    }

    /// Tasks queued but not started yet
    pub fn pending(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, |tx| tx.len())
    }

    /// Stop accepting tasks, let queued ones finish and join the thread.
    ///
    /// Joining is skipped when called from the primary thread itself.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handle = self.join.lock().take();
        if let Some(handle) = handle {
            if self.is_primary_thread() {
                return;
            }
            if handle.join().is_err() {
                error!("Primary thread terminated abnormally");
            }
        }
    }
}

impl PrimaryScheduler for PrimaryThread {
    fn is_primary_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    fn schedule(&self, task: PrimaryTask) -> Result<(), SchedulerError> {
        let sender = self.sender.lock();
        let tx = sender.as_ref().ok_or(SchedulerError::Closed)?;
        tx.send(task).map_err(|_| SchedulerError::Closed)
    }
}

impl Drop for PrimaryThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
