//! Configuration, errors and observable state of the dispatcher.

use serde::Serialize;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Jobs that may wait in the queue before submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

impl DispatcherConfig {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.workers == 0 {
            return Err(DispatchError::InvalidConfig {
                message: "workers must be greater than 0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(DispatchError::InvalidConfig {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors returned when handing work to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The bounded queue is saturated. Retry later or reject the request.
    #[error("dispatcher queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The dispatcher has been stopped.
    #[error("dispatcher is stopped")]
    Stopped,

    #[error("invalid dispatcher config: {message}")]
    InvalidConfig { message: String },
}

/// Lifecycle of a single worker.
///
/// `Idle ⇄ Executing`, then `Idle → ShuttingDown → Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Executing = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl WorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Executing,
            2 => WorkerState::ShuttingDown,
            _ => WorkerState::Stopped,
        }
    }
}

/// Point-in-time snapshot of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub workers: Vec<WorkerState>,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub stopped: bool,
}

impl DispatcherStats {
    /// Workers that have not exited.
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|s| **s != WorkerState::Stopped)
            .count()
    }

    pub fn executing(&self) -> usize {
        self.workers
            .iter()
            .filter(|s| **s == WorkerState::Executing)
            .count()
    }
}
