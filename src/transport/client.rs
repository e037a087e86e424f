//! Transport backed by reqwest, one tokio task per request.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ErrorCode, OpResult, Result};
use crate::ops::Completion;
use crate::transport::{
    BodyStatus, HttpRequest, RequestHandle, RequestStatus, ResponseHead, Transport,
};

/// Body chunks buffered ahead of the consumer before the request task waits.
const BODY_CHANNEL_CAPACITY: usize = 8;

/// Runs each request on the ambient tokio runtime and streams the body back
/// through a bounded channel.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> OpResult<Box<dyn RequestHandle>> {
        let runtime = Handle::try_current().map_err(|e| {
            warn!("No runtime available to run request: {}", e);
            ErrorCode::ResourceExhausted
        })?;

        let head = Completion::new();
        let (chunks, body) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let task = runtime.spawn(perform(self.client.clone(), request, head.clone(), chunks));

        Ok(Box::new(SpawnedRequest {
            head,
            body,
            finished: false,
            task,
        }))
    }
}

async fn perform(
    client: Client,
    request: HttpRequest,
    head: Completion<ResponseHead>,
    chunks: mpsc::Sender<OpResult<Bytes>>,
) {
    // The query carries the API key, so only the path is logged.
    let path = request.url.path().to_string();
    debug!("GET {}", path);

    let mut builder = client.get(request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Request to {} failed: {}", path, e);
            head.complete(Err(ErrorCode::TransportError));
            return;
        }
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    debug!("Response status: {}", status);
    head.complete(Ok(ResponseHead { status, headers }));

    let mut received = 0usize;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            warn!("Response stream from {} failed: {}", path, e);
            ErrorCode::TransportError
        });
        let failed = chunk.is_err();
        if let Ok(bytes) = &chunk {
            received += bytes.len();
        }
        // A closed channel means the handle was dropped.
        if chunks.send(chunk).await.is_err() || failed {
            return;
        }
    }
    debug!("Received {} body bytes from {}", received, path);
}

struct SpawnedRequest {
    head: Completion<ResponseHead>,
    body: mpsc::Receiver<OpResult<Bytes>>,
    finished: bool,
    task: JoinHandle<()>,
}

impl RequestHandle for SpawnedRequest {
    fn poll_status(&mut self) -> RequestStatus {
        match self.head.take() {
            None => RequestStatus::Pending,
            Some(Ok(head)) => RequestStatus::Headers(head),
            Some(Err(code)) => RequestStatus::Failed(code),
        }
    }

    fn poll_body(&mut self) -> BodyStatus {
        if self.finished {
            return BodyStatus::End;
        }
        match self.body.try_recv() {
            Ok(Ok(chunk)) => BodyStatus::Chunk(chunk),
            Ok(Err(code)) => {
                self.finished = true;
                BodyStatus::Failed(code)
            }
            Err(TryRecvError::Empty) => BodyStatus::Pending,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                BodyStatus::End
            }
        }
    }

    fn cancel(&mut self) {
        self.task.abort();
        self.body.close();
    }
}

impl Drop for SpawnedRequest {
    fn drop(&mut self) {
        self.task.abort();
    }
}
