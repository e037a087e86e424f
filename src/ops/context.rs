//! Shared dependencies handed to every operation.

use std::fmt;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::ops::{CancellationToken, PollSettings};
use crate::transport::{ApiEndpoints, Transport};

/// Everything an operation needs from its surroundings.
///
/// Cloning is cheap; clones share the transport, cache and cancellation flag.
#[derive(Clone)]
pub struct OpContext {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    endpoints: Arc<ApiEndpoints>,
    cancel: CancellationToken,
    poll: PollSettings,
}

impl OpContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: ResponseCache,
        endpoints: ApiEndpoints,
        poll: PollSettings,
    ) -> Self {
        Self {
            transport,
            cache,
            endpoints: Arc::new(endpoints),
            cancel: CancellationToken::new(),
            poll,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }
}

impl fmt::Debug for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpContext")
            .field("endpoints", &self.endpoints)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}
