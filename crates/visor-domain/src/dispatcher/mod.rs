//! Bounded worker pool for request-scoped jobs.
//!
//! A fixed number of workers consume from one shared bounded queue.
//! Submitting never waits: a full queue is reported immediately as
//! [`DispatchError::QueueFull`] so the caller can shed load.
//!
//! ```text
//!  submit ──try_send──▶ [ bounded queue ] ──recv──▶ worker 0..N ──▶ ResultSink
//!                                                                     │
//!                               caller ◀── ResultCollector::take(n) ◀─┘
//! ```
//!
//! # Results and panics
//!
//! Every job that runs posts exactly one [`JobResult`] keyed by its
//! [`JobId`]. A job that panics is caught by its worker and reported as
//! [`JobError::Panicked`]; the worker keeps running, so pool capacity is
//! constant and a waiting [`ResultCollector::take`] is never left hanging.
//!
//! # Shutdown
//!
//! [`Dispatcher::stop`] rejects further submissions, lets every in-flight
//! job finish, waits for all workers to exit and then drops whatever is
//! still queued. Dropped jobs release their result sinks and completion
//! groups, so collectors and waiters observe the shutdown instead of
//! blocking forever.

mod collector;
mod job;
mod pool;
mod types;

pub use collector::{result_channel, CollectError, CompletionGroup, ResultCollector, ResultSink};
pub use job::{Command, JobError, JobId, JobOutput, JobResult};
pub use pool::Dispatcher;
pub use types::{DispatchError, DispatcherConfig, DispatcherStats, WorkerState};

/// Counter of finished jobs, labelled by `outcome`.
pub const JOBS_TOTAL: &str = "visor_dispatcher_jobs_total";
/// Gauge of jobs waiting in the queue.
pub const QUEUE_DEPTH: &str = "visor_dispatcher_queue_depth";

/// Registers descriptions for the dispatcher metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(
        JOBS_TOTAL,
        "Dispatcher jobs by outcome (completed, panicked, rejected)"
    );
    metrics::describe_gauge!(QUEUE_DEPTH, "Jobs waiting in the dispatcher queue");
}
