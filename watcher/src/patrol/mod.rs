pub mod scheduler;

pub use scheduler::PatrolScheduler;

/// What one patrol cycle did; returned for observability and tests.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    pub monitors_total: usize,
    pub monitors_checked: usize,
    pub alerts_enqueued: usize,
    pub store_written: bool,
}
