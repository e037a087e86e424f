//! HTTP transport contracts.
//!
//! Operations never block on the network. They submit a request, keep the
//! returned [`RequestHandle`], and poll it on a timer until it completes.

pub mod client;
pub mod endpoints;

use bytes::Bytes;
use url::Url;

use crate::error::{ErrorCode, OpResult};

pub use client::ReqwestTransport;
pub use endpoints::ApiEndpoints;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// A GET for `url`. The mod API only needs reads.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status line and headers of a response. The body follows separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Map a non-2xx status onto the code operations report for it.
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.is_success() {
            None
        } else {
            Some(ErrorCode::TransportError)
        }
    }
}

/// Progress of a submitted request up to its headers.
#[derive(Debug)]
pub enum RequestStatus {
    Pending,
    Headers(ResponseHead),
    Failed(ErrorCode),
}

/// Progress of a response body.
#[derive(Debug, PartialEq, Eq)]
pub enum BodyStatus {
    Pending,
    Chunk(Bytes),
    End,
    Failed(ErrorCode),
}

/// A request in flight.
///
/// `poll_status` reports `Headers` or `Failed` once. After `Headers`, the body
/// is drained with `poll_body` until `End` or `Failed`. Dropping a handle
/// abandons the request.
pub trait RequestHandle: Send {
    fn poll_status(&mut self) -> RequestStatus;

    fn poll_body(&mut self) -> BodyStatus;

    fn cancel(&mut self);
}

/// Submits requests without waiting for them.
pub trait Transport: Send + Sync {
    /// Start `request`. Fails with `ResourceExhausted` when no worker can be
    /// allocated for it.
    fn send(&self, request: HttpRequest) -> OpResult<Box<dyn RequestHandle>>;
}
