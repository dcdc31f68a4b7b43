//! The worker pool.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Permit;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::collector::{CompletionGroup, CompletionGuard, ResultSink};
use super::job::{Command, JobError, JobId, JobResult};
use super::types::{DispatchError, DispatcherConfig, DispatcherStats, WorkerState};
use super::{JOBS_TOTAL, QUEUE_DEPTH};

/// Type-erased unit of work as stored in the queue.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Fixed-size pool of workers over one bounded queue.
///
/// Must be created inside a Tokio runtime; workers are spawned immediately.
pub struct Dispatcher {
    config: DispatcherConfig,
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
    queued: Arc<AtomicUsize>,
    states: Arc<Vec<AtomicU8>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Spawns `config.workers` workers over a queue of `config.queue_capacity`.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();
        let states: Arc<Vec<AtomicU8>> = Arc::new(
            (0..config.workers)
                .map(|_| AtomicU8::new(WorkerState::Idle as u8))
                .collect(),
        );
        let queued = Arc::new(AtomicUsize::new(0));

        let handles = (0..config.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&receiver),
                    shutdown.clone(),
                    Arc::clone(&states),
                    Arc::clone(&queued),
                ))
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Dispatcher started"
        );

        Ok(Self {
            config,
            sender,
            receiver,
            shutdown,
            stopped: AtomicBool::new(false),
            queued,
            states,
            handles: Mutex::new(handles),
        })
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Enqueues `command` without waiting.
    ///
    /// The job posts exactly one [`JobResult`] to `sink` when it runs, and
    /// counts `completion` down once whether it runs or is discarded.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::QueueFull`] if the queue has no free slot.
    /// - [`DispatchError::Stopped`] after [`Dispatcher::stop`] has begun.
    pub fn submit<T: Send + 'static>(
        &self,
        command: Command<T>,
        sink: ResultSink<T>,
        completion: Option<CompletionGroup>,
    ) -> Result<JobId, DispatchError> {
        let permit = self.reserve().map_err(|e| self.rejected(1, e))?;
        Ok(self.enqueue(permit, command, sink, completion))
    }

    /// Enqueues every command or none of them.
    ///
    /// A slot is reserved for each command before any is sent, so a batch
    /// that does not fit leaves the queue untouched and runs nothing.
    /// Returned ids follow the order of `commands`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::QueueFull`] if the free slots are fewer than the commands.
    /// - [`DispatchError::Stopped`] after [`Dispatcher::stop`] has begun.
    pub fn submit_batch<T: Send + 'static>(
        &self,
        commands: Vec<Command<T>>,
        sink: ResultSink<T>,
        completion: Option<CompletionGroup>,
    ) -> Result<Vec<JobId>, DispatchError> {
        let mut permits = Vec::with_capacity(commands.len());
        for _ in 0..commands.len() {
            match self.reserve() {
                Ok(permit) => permits.push(permit),
                Err(e) => {
                    // Unsent permits hand their slots back on drop.
                    drop(permits);
                    return Err(self.rejected(commands.len(), e));
                }
            }
        }

        Ok(permits
            .into_iter()
            .zip(commands)
            .map(|(permit, command)| self.enqueue(permit, command, sink.clone(), completion.clone()))
            .collect())
    }

    fn reserve(&self) -> Result<Permit<'_, Job>, DispatchError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(DispatchError::Stopped);
        }
        self.sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => DispatchError::QueueFull {
                capacity: self.config.queue_capacity,
            },
            TrySendError::Closed(()) => DispatchError::Stopped,
        })
    }

    fn rejected(&self, jobs: usize, err: DispatchError) -> DispatchError {
        if let DispatchError::QueueFull { capacity } = &err {
            warn!(capacity, jobs, "Dispatcher queue full, rejecting");
        }
        metrics::counter!(JOBS_TOTAL, "outcome" => "rejected").increment(jobs as u64);
        err
    }

    fn enqueue<T: Send + 'static>(
        &self,
        permit: Permit<'_, Job>,
        command: Command<T>,
        sink: ResultSink<T>,
        completion: Option<CompletionGroup>,
    ) -> JobId {
        let job_id = JobId::new();
        let guard = CompletionGuard::new(completion);
        let job: Job = Box::new(move || {
            async move {
                let value = match AssertUnwindSafe(command.run()).catch_unwind().await {
                    Ok(output) => {
                        metrics::counter!(JOBS_TOTAL, "outcome" => "completed").increment(1);
                        Ok(output)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(job_id = %job_id, panic = %message, "Job panicked");
                        metrics::counter!(JOBS_TOTAL, "outcome" => "panicked").increment(1);
                        Err(JobError::Panicked { job_id, message })
                    }
                };
                // The collector may already be gone (e.g. the caller timed out).
                let _ = sink.send(JobResult { key: job_id, value });
                drop(guard);
            }
            .boxed()
        });

        // Counted before the send so a worker never decrements first.
        let depth = self.queued.fetch_add(1, Ordering::AcqRel) + 1;
        permit.send(job);
        metrics::gauge!(QUEUE_DEPTH).set(depth as f64);
        debug!(job_id = %job_id, "Job submitted");
        job_id
    }

    /// Stops the pool.
    ///
    /// New submissions are rejected from the moment this is called. Returns
    /// once every worker has finished its in-flight job and exited; jobs still
    /// queued at that point are discarded without running. Calling it again
    /// waits for the first call to finish and then returns.
    pub async fn stop(&self) {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.shutdown.cancel();

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        drop(handles);

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut discarded = 0usize;
        while let Ok(job) = receiver.try_recv() {
            drop(job);
            self.queued.fetch_sub(1, Ordering::AcqRel);
            discarded += 1;
        }
        metrics::gauge!(QUEUE_DEPTH).set(self.queued.load(Ordering::Acquire) as f64);

        if first {
            info!(discarded, "Dispatcher stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Jobs currently waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            workers: self
                .states
                .iter()
                .map(|s| WorkerState::from_u8(s.load(Ordering::Acquire)))
                .collect(),
            queue_depth: self.queue_depth(),
            queue_capacity: self.config.queue_capacity,
            stopped: self.is_stopped(),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Workers exit on their own once cancelled; nothing to join here.
        self.shutdown.cancel();
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
    states: Arc<Vec<AtomicU8>>,
    queued: Arc<AtomicUsize>,
) {
    let set_state = |state: WorkerState| states[id].store(state as u8, Ordering::Release);
    debug!(worker = id, "Worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else { break };
        let depth = queued.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        metrics::gauge!(QUEUE_DEPTH).set(depth as f64);

        set_state(WorkerState::Executing);
        job().await;
        set_state(WorkerState::Idle);
    }

    set_state(WorkerState::ShuttingDown);
    debug!(worker = id, "Worker stopping");
    set_state(WorkerState::Stopped);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
