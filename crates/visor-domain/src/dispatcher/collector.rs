//! Result delivery and completion tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use super::job::JobResult;

/// Where a job posts its [`JobResult`].
pub type ResultSink<T> = mpsc::UnboundedSender<JobResult<T>>;

/// Creates a sink for jobs and the collector that drains it.
///
/// Hand clones of the sink to [`Dispatcher::submit`](super::Dispatcher::submit)
/// and drop the original: the collector detects jobs that were discarded
/// without running only once every sink is gone.
pub fn result_channel<T>() -> (ResultSink<T>, ResultCollector<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ResultCollector { rx })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    /// Every sink was dropped before `expected` results arrived.
    #[error("result sink closed after {received} of {expected} results")]
    SinkClosed { expected: usize, received: usize },
}

/// Gathers results posted by jobs.
#[derive(Debug)]
pub struct ResultCollector<T> {
    rx: mpsc::UnboundedReceiver<JobResult<T>>,
}

impl<T> ResultCollector<T> {
    /// Waits until exactly `n` results have arrived and returns them in
    /// arrival order.
    ///
    /// There is no built-in deadline; wrap the call in
    /// `tokio::time::timeout` when one is needed.
    pub async fn take(&mut self, n: usize) -> Result<Vec<JobResult<T>>, CollectError> {
        let mut results = Vec::with_capacity(n);
        while results.len() < n {
            match self.rx.recv().await {
                Some(result) => results.push(result),
                None => {
                    return Err(CollectError::SinkClosed {
                        expected: n,
                        received: results.len(),
                    })
                }
            }
        }
        Ok(results)
    }
}

#[derive(Debug, Default)]
struct GroupState {
    pending: AtomicUsize,
    notify: Notify,
}

/// Countdown shared between a submitter and its jobs.
///
/// Each submission adds one; each job, whether it ran or was discarded,
/// counts down once.
#[derive(Debug, Clone, Default)]
pub struct CompletionGroup {
    state: Arc<GroupState>,
}

impl CompletionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.state.pending.fetch_add(n, Ordering::AcqRel);
    }

    pub fn done(&self) {
        let previous = self
            .state
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1));
        if previous == Ok(1) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Resolves once the pending count reaches zero.
    pub async fn wait(&self) {
        loop {
            // Register before checking so a concurrent `done` cannot be missed.
            let notified = self.state.notify.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts down its group when dropped.
pub(crate) struct CompletionGuard(Option<CompletionGroup>);

impl CompletionGuard {
    pub(crate) fn new(group: Option<CompletionGroup>) -> Self {
        if let Some(group) = &group {
            group.add(1);
        }
        Self(group)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(group) = self.0.take() {
            group.done();
        }
    }
}
