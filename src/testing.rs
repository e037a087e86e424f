//! Test doubles shared across module tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use md5::{Digest, Md5};
use parking_lot::Mutex;

use crate::cache::{MemoryCache, ResponseCache};
use crate::collection::{FileInfo, ModId, ModMetadata};
use crate::error::{ErrorCode, OpResult};
use crate::ops::{OpContext, PollSettings};
use crate::transport::{
    ApiEndpoints, BodyStatus, HttpRequest, RequestHandle, RequestStatus, ResponseHead, Transport,
};

pub const TEST_BASE_URL: &str = "https://api.mod.io/v1";
pub const TEST_GAME_ID: u64 = 1;

#[derive(Clone)]
struct ScriptedResponse {
    head: ResponseHead,
    pieces: Vec<Bytes>,
}

/// Transport answering from a table of canned responses keyed by URL path.
///
/// Each handle reports `Pending` for a configurable number of polls before
/// the headers and again before every body piece. Unknown paths answer with
/// HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, OpResult<ScriptedResponse>>>,
    pending_polls: u32,
    refuse: AtomicBool,
    sent: Mutex<Vec<HttpRequest>>,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<Bytes>) {
        self.respond_in_pieces(path, status, vec![body.into()]);
    }

    /// Serve the body as separate pieces, each after its own pending polls.
    pub fn respond_in_pieces(&self, path: &str, status: u16, pieces: Vec<Bytes>) {
        let response = ScriptedResponse {
            head: ResponseHead {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
            },
            pieces: pieces.into_iter().filter(|piece| !piece.is_empty()).collect(),
        };
        self.routes.lock().insert(path.to_string(), Ok(response));
    }

    pub fn fail(&self, path: &str, code: ErrorCode) {
        self.routes.lock().insert(path.to_string(), Err(code));
    }

    pub fn refuse_sends(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_paths(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> OpResult<Box<dyn RequestHandle>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ErrorCode::ResourceExhausted);
        }
        let result = self
            .routes
            .lock()
            .get(request.url.path())
            .cloned()
            .unwrap_or_else(|| {
                Ok(ScriptedResponse {
                    head: ResponseHead {
                        status: 404,
                        headers: Vec::new(),
                    },
                    pieces: Vec::new(),
                })
            });
        self.sent.lock().push(request);

        let (head, pieces): (OpResult<ResponseHead>, VecDeque<Bytes>) = match result {
            Ok(response) => (Ok(response.head), response.pieces.into()),
            Err(code) => (Err(code), VecDeque::new()),
        };
        Ok(Box::new(ScriptedHandle {
            pending_polls: self.pending_polls,
            remaining: self.pending_polls,
            head: Some(head),
            pieces,
            cancelled: self.cancelled.clone(),
        }))
    }
}

struct ScriptedHandle {
    pending_polls: u32,
    remaining: u32,
    head: Option<OpResult<ResponseHead>>,
    pieces: VecDeque<Bytes>,
    cancelled: Arc<AtomicUsize>,
}

impl RequestHandle for ScriptedHandle {
    fn poll_status(&mut self) -> RequestStatus {
        if self.remaining > 0 {
            self.remaining -= 1;
            return RequestStatus::Pending;
        }
        self.remaining = self.pending_polls;
        match self.head.take() {
            Some(Ok(head)) => RequestStatus::Headers(head),
            Some(Err(code)) => RequestStatus::Failed(code),
            None => RequestStatus::Pending,
        }
    }

    fn poll_body(&mut self) -> BodyStatus {
        if self.pieces.is_empty() {
            return BodyStatus::End;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return BodyStatus::Pending;
        }
        self.remaining = self.pending_polls;
        match self.pieces.pop_front() {
            Some(piece) => BodyStatus::Chunk(piece),
            None => BodyStatus::End,
        }
    }

    fn cancel(&mut self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        self.head = None;
        self.pieces.clear();
    }
}

pub fn test_poll_settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(1),
        max_polls: 200,
    }
}

pub fn test_context(transport: Arc<ScriptedTransport>) -> OpContext {
    let endpoints = ApiEndpoints::new(TEST_BASE_URL, TEST_GAME_ID, "0123456789abcdef0123456789abcdef")
        .expect("test endpoints");
    let cache = ResponseCache::new(Arc::new(MemoryCache::new(Duration::from_secs(60), 64)));
    OpContext::new(transport, cache, endpoints, test_poll_settings())
}

/// URL path the installer requests for a mod's metadata.
pub fn mod_info_path(id: ModId) -> String {
    format!("/v1/games/{}/mods/{}", TEST_GAME_ID, id)
}

/// URL path the download for a mod file is served from.
pub fn download_path(id: ModId, version: u64) -> String {
    format!("/files/{}/{}/mod.zip", id, version)
}

pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Metadata for a mod whose file is `contents`, published as `version`.
pub fn mod_with_file(id: ModId, version: u64, contents: &[u8]) -> ModMetadata {
    ModMetadata {
        id,
        name: format!("Mod {}", id),
        summary: String::new(),
        file_info: Some(FileInfo {
            metadata_id: version,
            filename: "mod.zip".to_string(),
            filesize: contents.len() as u64,
            filehash_md5: Some(md5_hex(contents)),
            download_url: format!("https://files.mod.io{}", download_path(id, version)),
        }),
        date_updated: 1_700_000_000,
    }
}

/// Script both the metadata and file download for `metadata`.
pub fn serve_mod(transport: &ScriptedTransport, metadata: &ModMetadata, contents: &'static [u8]) {
    let body = serde_json::to_vec(metadata).expect("serialize metadata");
    transport.respond(&mod_info_path(metadata.id), 200, body);
    if let Some(version) = metadata.file_version() {
        transport.respond(&download_path(metadata.id, version), 200, Bytes::from_static(contents));
    }
}
