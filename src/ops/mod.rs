//! Resumable asynchronous operations.
//!
//! An operation is a state machine that is started once and then resumed each
//! time something it waits on happens. Every resumption first checks for
//! cancellation; a cancelled operation releases what it holds and completes
//! with [`ErrorCode::Cancelled`]. Operations compose by owning their children
//! and forwarding the child's suspensions until it completes.
//!
//! [`drive`] runs an operation to completion on tokio. Because it takes the
//! operation by value, each operation completes exactly once.

pub mod cancel;
pub mod completion;
pub mod context;
pub mod download;
pub mod fetch;
pub mod file_io;
pub mod timer;

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{ErrorCode, OpResult};

pub use cancel::CancellationToken;
pub use completion::Completion;
pub use context::OpContext;
pub use download::DownloadToFile;
pub use fetch::{FetchGameInfo, FetchModInfo, FetchWithCache};
pub use file_io::{ReadSomeFromFile, WriteSomeToFile};
pub use timer::{PollSettings, PollTimer};

/// Why an operation is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// First resumption.
    Start,
    /// A posted continuation ran.
    Posted,
    /// A timer expired.
    Elapsed,
}

/// What an operation receives when resumed. An error aborts the operation.
pub type Resumption = OpResult<Wake>;

/// What a suspended operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Await {
    /// Resume on the next turn of the executor.
    Post,
    /// Resume once the duration has elapsed.
    Sleep(Duration),
}

/// Result of resuming an operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<T> {
    Suspend(Await),
    Done(OpResult<T>),
}

impl<T> Step<T> {
    /// Transform the completed value, leaving suspensions untouched.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> OpResult<U>) -> Step<U> {
        match self {
            Step::Suspend(wait) => Step::Suspend(wait),
            Step::Done(result) => Step::Done(result.and_then(f)),
        }
    }
}

pub trait Operation: Send {
    type Output: Send;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn is_cancelled(&self) -> bool;

    /// Drop any in-flight work. Called when the operation is cancelled.
    fn release(&mut self) {}

    /// Advance the state machine.
    fn step(&mut self, input: Resumption) -> Step<Self::Output>;

    /// Resume the operation, honouring cancellation first.
    fn resume(&mut self, input: Resumption) -> Step<Self::Output> {
        if self.is_cancelled() {
            trace!(operation = self.name(), "Operation cancelled");
            self.release();
            return Step::Done(Err(ErrorCode::Cancelled));
        }
        self.step(input)
    }
}

/// Run `op` until it completes.
pub async fn drive<O: Operation>(mut op: O) -> OpResult<O::Output> {
    let name = op.name();
    trace!(operation = name, "Starting operation");

    let mut input: Resumption = Ok(Wake::Start);
    loop {
        match op.resume(input) {
            Step::Done(result) => {
                if let Err(code) = &result {
                    debug!(operation = name, "Operation failed: {}", code);
                }
                return result;
            }
            Step::Suspend(Await::Post) => {
                tokio::task::yield_now().await;
                input = Ok(Wake::Posted);
            }
            Step::Suspend(Await::Sleep(duration)) => {
                tokio::time::sleep(duration).await;
                input = Ok(Wake::Elapsed);
            }
        }
    }
}
