use fastswap_kernel::{PrimaryScheduler, PrimaryTask, SchedulerError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Treats the calling thread as the primary thread.
#[derive(Debug, Default)]
pub struct InlineScheduler {
    ran: AtomicUsize,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks run so far
    pub fn ran(&self) -> usize {
        self.ran.load(Ordering::SeqCst)
    }
}

impl PrimaryScheduler for InlineScheduler {
    fn is_primary_thread(&self) -> bool {
        true
    }

    fn schedule(&self, task: PrimaryTask) -> Result<(), SchedulerError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        task();
        Ok(())
    }

    fn run_or_schedule(&self, task: PrimaryTask) -> Result<(), SchedulerError> {
        self.schedule(task)
    }
}
