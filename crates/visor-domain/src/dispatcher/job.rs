//! Jobs, commands and their results.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use ulid::Ulid;

/// Unique, time-ordered identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Ulid);

impl JobId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

type Thunk<T> = Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>;

/// Work handed to the dispatcher.
///
/// `NoReturn` commands report [`JobOutput::Done`]; `Returns` commands report
/// the value they produce.
pub enum Command<T> {
    NoReturn(Thunk<()>),
    Returns(Thunk<T>),
}

impl<T: Send + 'static> Command<T> {
    /// A command run for its side effects only.
    pub fn no_return<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Command::NoReturn(Box::new(move || f().boxed()))
    }

    /// A command whose output becomes the job's result value.
    pub fn returns<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Command::Returns(Box::new(move || f().boxed()))
    }

    pub(crate) async fn run(self) -> JobOutput<T> {
        match self {
            Command::NoReturn(f) => {
                f().await;
                JobOutput::Done
            }
            Command::Returns(f) => JobOutput::Value(f().await),
        }
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::NoReturn(_) => f.write_str("Command::NoReturn"),
            Command::Returns(_) => f.write_str("Command::Returns"),
        }
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput<T> {
    /// A `NoReturn` command completed.
    Done,
    Value(T),
}

/// Why a job did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job {job_id} panicked: {message}")]
    Panicked { job_id: JobId, message: String },
}

/// One job's outcome, correlated by `key`.
#[derive(Debug)]
pub struct JobResult<T> {
    pub key: JobId,
    pub value: Result<JobOutput<T>, JobError>,
}
