//! Positional read and write operations on a [`FileChannel`].

use std::mem;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::error::ErrorCode;
use crate::fs::channel::{FileChannel, FileMode, IoOutcome, IoStart, PendingIo};
use crate::ops::{Await, Operation, PollSettings, PollTimer, Resumption, Step};

enum Request {
    Write { offset: u64, data: Bytes },
    Read { offset: u64, len: usize },
}

enum Phase {
    Start(Request),
    Posted(Request),
    Polling(PendingIo),
    Finished,
}

/// State machine shared by reads and writes.
///
/// Nothing is touched before the first posted continuation; the transfer is
/// started there and then polled on the timer until it finishes.
struct FileIo {
    channel: Arc<dyn FileChannel>,
    phase: Phase,
    timer: PollTimer,
}

impl FileIo {
    fn new(channel: Arc<dyn FileChannel>, request: Request, poll: PollSettings) -> Self {
        Self {
            channel,
            phase: Phase::Start(request),
            timer: PollTimer::new(poll),
        }
    }

    fn release(&mut self) {
        if let Phase::Polling(mut pending) = mem::replace(&mut self.phase, Phase::Finished) {
            pending.cancel();
        }
    }

    fn step(&mut self, input: Resumption) -> Step<IoOutcome> {
        if let Err(code) = input {
            self.release();
            return Step::Done(Err(code));
        }

        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Start(request) => {
                match &request {
                    Request::Write { .. } if self.channel.mode() == FileMode::ReadOnly => {
                        warn!("Refusing to write to read-only {}", self.channel.path().display());
                        return Step::Done(Err(ErrorCode::NoPermission));
                    }
                    Request::Write { data, .. } if data.is_empty() => {
                        return Step::Done(Ok(IoOutcome::Written(0)));
                    }
                    Request::Read { len: 0, .. } => {
                        return Step::Done(Ok(IoOutcome::Read(Bytes::new())));
                    }
                    _ => {}
                }
                self.phase = Phase::Posted(request);
                Step::Suspend(Await::Post)
            }
            Phase::Posted(request) => {
                trace!("Starting transfer on {}", self.channel.path().display());
                let started = match request {
                    Request::Write { offset, data } => self.channel.begin_write(offset, data),
                    Request::Read { offset, len } => self.channel.begin_read(offset, len),
                };
                match started {
                    Ok(IoStart::Complete(outcome)) => Step::Done(Ok(outcome)),
                    Ok(IoStart::Pending(pending)) => self.poll(pending),
                    Err(code) => Step::Done(Err(code)),
                }
            }
            Phase::Polling(pending) => self.poll(pending),
            Phase::Finished => {
                warn!("Transfer on {} resumed after completion", self.channel.path().display());
                Step::Done(Err(ErrorCode::Cancelled))
            }
        }
    }

    fn poll(&mut self, mut pending: PendingIo) -> Step<IoOutcome> {
        match pending.poll() {
            Some(result) => Step::Done(result),
            None => match self.timer.expires_after() {
                Ok(wait) => {
                    self.phase = Phase::Polling(pending);
                    Step::Suspend(wait)
                }
                Err(code) => {
                    pending.cancel();
                    Step::Done(Err(code))
                }
            },
        }
    }
}

/// Write a buffer at an offset. Completes with the number of bytes written.
pub struct WriteSomeToFile {
    io: FileIo,
}

impl WriteSomeToFile {
    pub fn new(channel: Arc<dyn FileChannel>, offset: u64, data: Bytes, poll: PollSettings) -> Self {
        Self {
            io: FileIo::new(channel, Request::Write { offset, data }, poll),
        }
    }
}

impl Operation for WriteSomeToFile {
    type Output = usize;

    fn name(&self) -> &'static str {
        "write_some_to_file"
    }

    fn is_cancelled(&self) -> bool {
        self.io.channel.should_cancel()
    }

    fn release(&mut self) {
        self.io.release();
    }

    fn step(&mut self, input: Resumption) -> Step<usize> {
        self.io.step(input).and_then(|outcome| match outcome {
            IoOutcome::Written(n) => Ok(n),
            IoOutcome::Read(_) => Err(ErrorCode::WriteError),
        })
    }
}

/// Read up to `len` bytes at an offset. A short result means end of file.
pub struct ReadSomeFromFile {
    io: FileIo,
}

impl ReadSomeFromFile {
    pub fn new(channel: Arc<dyn FileChannel>, offset: u64, len: usize, poll: PollSettings) -> Self {
        Self {
            io: FileIo::new(channel, Request::Read { offset, len }, poll),
        }
    }
}

impl Operation for ReadSomeFromFile {
    type Output = Bytes;

    fn name(&self) -> &'static str {
        "read_some_from_file"
    }

    fn is_cancelled(&self) -> bool {
        self.io.channel.should_cancel()
    }

    fn release(&mut self) {
        self.io.release();
    }

    fn step(&mut self, input: Resumption) -> Step<Bytes> {
        self.io.step(input).and_then(|outcome| match outcome {
            IoOutcome::Read(bytes) => Ok(bytes),
            IoOutcome::Written(_) => Err(ErrorCode::ReadError),
        })
    }
}
