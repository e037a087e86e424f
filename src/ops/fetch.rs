//! Cached metadata fetches.

use std::marker::PhantomData;
use std::mem;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::cache::Cacheable;
use crate::collection::{GameInfo, ModId, ModMetadata};
use crate::error::ErrorCode;
use crate::ops::{OpContext, Operation, PollTimer, Resumption, Step};
use crate::transport::{BodyStatus, HttpRequest, RequestHandle, RequestStatus};

/// Fetch of the metadata for one mod.
pub type FetchModInfo = FetchWithCache<ModMetadata>;

/// Fetch of the metadata for the configured game.
pub type FetchGameInfo = FetchWithCache<GameInfo>;

enum Phase {
    Start(HttpRequest),
    Waiting(Box<dyn RequestHandle>),
    Reading {
        handle: Box<dyn RequestHandle>,
        body: BytesMut,
    },
    Finished,
}

/// Answers from the response cache when possible, otherwise performs the
/// request, decodes the JSON body and caches it.
pub struct FetchWithCache<T: Cacheable> {
    ctx: OpContext,
    key: String,
    phase: Phase,
    timer: PollTimer,
    _output: PhantomData<fn() -> T>,
}

impl<T: Cacheable> FetchWithCache<T> {
    pub fn new(ctx: OpContext, key: impl Into<String>, request: HttpRequest) -> Self {
        let timer = PollTimer::new(ctx.poll_settings());
        Self {
            ctx,
            key: key.into(),
            phase: Phase::Start(request),
            timer,
            _output: PhantomData,
        }
    }

    fn suspend_or_give_up(
        &mut self,
        mut handle: Box<dyn RequestHandle>,
        phase: impl FnOnce(Box<dyn RequestHandle>) -> Phase,
    ) -> Step<T> {
        match self.timer.expires_after() {
            Ok(wait) => {
                self.phase = phase(handle);
                Step::Suspend(wait)
            }
            Err(code) => {
                warn!("Gave up waiting for {} after {} polls", self.key, self.timer.polls());
                handle.cancel();
                Step::Done(Err(code))
            }
        }
    }

    fn poll(&mut self, mut handle: Box<dyn RequestHandle>) -> Step<T> {
        match handle.poll_status() {
            RequestStatus::Pending => self.suspend_or_give_up(handle, Phase::Waiting),
            RequestStatus::Failed(code) => Step::Done(Err(code)),
            RequestStatus::Headers(head) => match head.error_code() {
                Some(code) => {
                    warn!("Fetching {} returned HTTP {}", self.key, head.status);
                    Step::Done(Err(code))
                }
                None => self.read(handle, BytesMut::new()),
            },
        }
    }

    fn read(&mut self, mut handle: Box<dyn RequestHandle>, mut body: BytesMut) -> Step<T> {
        loop {
            match handle.poll_body() {
                BodyStatus::Chunk(chunk) => {
                    self.timer.reset();
                    body.extend_from_slice(&chunk);
                }
                BodyStatus::Pending => {
                    return self.suspend_or_give_up(handle, |handle| Phase::Reading { handle, body });
                }
                BodyStatus::End => return self.decode(&body),
                BodyStatus::Failed(code) => return Step::Done(Err(code)),
            }
        }
    }

    fn decode(&self, body: &[u8]) -> Step<T> {
        match serde_json::from_slice::<T>(body) {
            Ok(value) => {
                self.ctx.cache().put(&value);
                Step::Done(Ok(value))
            }
            Err(e) => {
                warn!("Could not decode response for {}: {}", self.key, e);
                Step::Done(Err(ErrorCode::InvalidResponse))
            }
        }
    }
}

impl FetchWithCache<ModMetadata> {
    pub fn mod_info(ctx: OpContext, id: ModId) -> Self {
        let request = ctx.endpoints().mod_info(id);
        Self::new(ctx, id.to_string(), request)
    }
}

impl FetchWithCache<GameInfo> {
    pub fn game_info(ctx: OpContext) -> Self {
        let request = ctx.endpoints().game_info();
        let key = ctx.endpoints().game_id().to_string();
        Self::new(ctx, key, request)
    }
}

impl<T: Cacheable> Operation for FetchWithCache<T> {
    type Output = T;

    fn name(&self) -> &'static str {
        "fetch_with_cache"
    }

    fn is_cancelled(&self) -> bool {
        self.ctx.cancellation().is_cancelled()
    }

    fn release(&mut self) {
        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Waiting(mut handle) | Phase::Reading { mut handle, .. } => handle.cancel(),
            _ => {}
        }
    }

    fn step(&mut self, input: Resumption) -> Step<T> {
        if let Err(code) = input {
            self.release();
            return Step::Done(Err(code));
        }

        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Start(request) => {
                if let Some(hit) = self.ctx.cache().get::<T>(&self.key) {
                    return Step::Done(Ok(hit));
                }
                debug!("Cache miss for {}, requesting", self.key);
                match self.ctx.transport().send(request) {
                    Ok(handle) => self.poll(handle),
                    Err(code) => Step::Done(Err(code)),
                }
            }
            Phase::Waiting(handle) => self.poll(handle),
            Phase::Reading { handle, body } => self.read(handle, body),
            Phase::Finished => {
                warn!("Fetch of {} resumed after completion", self.key);
                Step::Done(Err(ErrorCode::Cancelled))
            }
        }
    }
}
