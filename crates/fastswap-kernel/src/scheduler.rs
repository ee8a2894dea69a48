//! Primary-thread hand-off.
//!
//! The host performs module lifecycle transitions on one thread. Anything
//! that mutates the registry is boxed up and queued there.

use crate::error::SchedulerError;

/// Work queued for the primary thread.
pub type PrimaryTask = Box<dyn FnOnce() + Send + 'static>;

/// Single-writer execution context.
pub trait PrimaryScheduler: Send + Sync {
    /// Whether the caller is already running on the primary thread
    fn is_primary_thread(&self) -> bool;

    /// Queue a task. Tasks run in submission order.
    fn schedule(&self, task: PrimaryTask) -> Result<(), SchedulerError>;

    /// Run inline when already on the primary thread, otherwise queue.
    fn run_or_schedule(&self, task: PrimaryTask) -> Result<(), SchedulerError> {
        if self.is_primary_thread() {
            task();
            Ok(())
        } else {
            self.schedule(task)
        }
    }
}
