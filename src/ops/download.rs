//! Download a file into a channel.

use std::mem;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::fs::channel::FileChannel;
use crate::ops::{OpContext, Operation, PollTimer, Resumption, Step, Wake, WriteSomeToFile};
use crate::transport::{BodyStatus, HttpRequest, RequestHandle, RequestStatus, ResponseHead};

enum Phase {
    Start(HttpRequest),
    Requesting(Box<dyn RequestHandle>),
    Receiving(Box<dyn RequestHandle>),
    Writing {
        handle: Box<dyn RequestHandle>,
        chunk: Bytes,
        consumed: usize,
        write: WriteSomeToFile,
    },
    Finished,
}

/// Fetch `request` and write the body to the channel as it arrives, each
/// piece through a child [`WriteSomeToFile`]. Completes with the number of
/// bytes written.
pub struct DownloadToFile {
    ctx: OpContext,
    channel: Arc<dyn FileChannel>,
    chunk_size: usize,
    phase: Phase,
    timer: PollTimer,
    written: u64,
}

impl DownloadToFile {
    pub fn new(
        ctx: OpContext,
        request: HttpRequest,
        channel: Arc<dyn FileChannel>,
        chunk_size: usize,
    ) -> Self {
        let timer = PollTimer::new(ctx.poll_settings());
        Self {
            ctx,
            channel,
            chunk_size: chunk_size.max(1),
            phase: Phase::Start(request),
            timer,
            written: 0,
        }
    }

    fn poll_request(&mut self, mut handle: Box<dyn RequestHandle>) -> Step<u64> {
        match handle.poll_status() {
            RequestStatus::Pending => match self.timer.expires_after() {
                Ok(wait) => {
                    self.phase = Phase::Requesting(handle);
                    Step::Suspend(wait)
                }
                Err(code) => {
                    handle.cancel();
                    Step::Done(Err(code))
                }
            },
            RequestStatus::Failed(code) => Step::Done(Err(code)),
            RequestStatus::Headers(head) => match check_response(&head) {
                Ok(()) => {
                    debug!("Receiving download into {}", self.channel.path().display());
                    self.timer.reset();
                    self.pump(handle, Bytes::new(), 0)
                }
                Err(code) => Step::Done(Err(code)),
            },
        }
    }

    /// Write what is left of `chunk` from `consumed` on, then keep taking
    /// body pieces until one has to be waited for or the body ends.
    fn pump(
        &mut self,
        mut handle: Box<dyn RequestHandle>,
        mut chunk: Bytes,
        mut consumed: usize,
    ) -> Step<u64> {
        loop {
            if consumed < chunk.len() {
                let end = (consumed + self.chunk_size).min(chunk.len());
                let mut write = WriteSomeToFile::new(
                    self.channel.clone(),
                    self.written,
                    chunk.slice(consumed..end),
                    self.ctx.poll_settings(),
                );
                match write.resume(Ok(Wake::Start)) {
                    Step::Suspend(wait) => {
                        self.phase = Phase::Writing {
                            handle,
                            chunk,
                            consumed,
                            write,
                        };
                        return Step::Suspend(wait);
                    }
                    Step::Done(Ok(0)) => {
                        handle.cancel();
                        return Step::Done(Err(ErrorCode::WriteError));
                    }
                    Step::Done(Ok(written)) => {
                        consumed += written;
                        self.written += written as u64;
                        continue;
                    }
                    Step::Done(Err(code)) => {
                        handle.cancel();
                        return Step::Done(Err(code));
                    }
                }
            }

            match handle.poll_body() {
                BodyStatus::Chunk(next) => {
                    self.timer.reset();
                    chunk = next;
                    consumed = 0;
                }
                BodyStatus::Pending => match self.timer.expires_after() {
                    Ok(wait) => {
                        self.phase = Phase::Receiving(handle);
                        return Step::Suspend(wait);
                    }
                    Err(code) => {
                        warn!("Download stalled after {} bytes", self.written);
                        handle.cancel();
                        return Step::Done(Err(code));
                    }
                },
                BodyStatus::End => {
                    debug!("Wrote {} bytes to {}", self.written, self.channel.path().display());
                    return Step::Done(Ok(self.written));
                }
                BodyStatus::Failed(code) => return Step::Done(Err(code)),
            }
        }
    }
}

fn check_response(head: &ResponseHead) -> Result<(), ErrorCode> {
    match head.status {
        404 | 410 => {
            warn!("Download is gone (HTTP {})", head.status);
            Err(ErrorCode::UnrecoverableInstallError)
        }
        _ => match head.error_code() {
            Some(code) => {
                warn!("Download failed with HTTP {}", head.status);
                Err(code)
            }
            None => Ok(()),
        },
    }
}

impl Operation for DownloadToFile {
    type Output = u64;

    fn name(&self) -> &'static str {
        "download_to_file"
    }

    fn is_cancelled(&self) -> bool {
        self.ctx.cancellation().is_cancelled() || self.channel.should_cancel()
    }

    fn release(&mut self) {
        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Requesting(mut handle) | Phase::Receiving(mut handle) => handle.cancel(),
            Phase::Writing {
                mut handle,
                mut write,
                ..
            } => {
                write.release();
                handle.cancel();
            }
            _ => {}
        }
    }

    fn step(&mut self, input: Resumption) -> Step<u64> {
        if let Err(code) = input {
            self.release();
            return Step::Done(Err(code));
        }

        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Start(request) => match self.ctx.transport().send(request) {
                Ok(handle) => self.poll_request(handle),
                Err(code) => Step::Done(Err(code)),
            },
            Phase::Requesting(handle) => self.poll_request(handle),
            Phase::Receiving(handle) => self.pump(handle, Bytes::new(), 0),
            Phase::Writing {
                mut handle,
                chunk,
                consumed,
                mut write,
            } => match write.resume(input) {
                Step::Suspend(wait) => {
                    self.phase = Phase::Writing {
                        handle,
                        chunk,
                        consumed,
                        write,
                    };
                    Step::Suspend(wait)
                }
                Step::Done(Ok(0)) => {
                    handle.cancel();
                    Step::Done(Err(ErrorCode::WriteError))
                }
                Step::Done(Ok(written)) => {
                    self.written += written as u64;
                    self.pump(handle, chunk, consumed + written)
                }
                Step::Done(Err(code)) => {
                    handle.cancel();
                    Step::Done(Err(code))
                }
            },
            Phase::Finished => {
                warn!("Download to {} resumed after completion", self.channel.path().display());
                Step::Done(Err(ErrorCode::Cancelled))
            }
        }
    }
}
