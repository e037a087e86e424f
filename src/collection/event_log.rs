//! Append-only record of mod management events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::collection::types::ModId;
use crate::error::ErrorCode;

/// What happened to a mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    BeginInstall,
    Installed,
    BeginUpdate,
    Updated,
    BeginUninstall,
    Uninstalled,
}

/// One entry in the event log. `status` is `None` on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEvent {
    pub id: ModId,
    pub kind: EventKind,
    pub status: Option<ErrorCode>,
    pub recorded_at: DateTime<Utc>,
}

/// Ordered events waiting for an external consumer.
#[derive(Debug, Default)]
pub struct ModEventLog {
    events: Vec<ModEvent>,
}

impl ModEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ModId, kind: EventKind, status: Option<ErrorCode>) {
        let outcome = status.map_or_else(|| "ok".to_string(), |code| code.to_string());
        info!(mod_id = %id, event = ?kind, status = %outcome, "Adding mod management event");
        self.events.push(ModEvent {
            id,
            kind,
            status,
            recorded_at: Utc::now(),
        });
    }

    /// Hand all pending events to the caller, oldest first.
    pub fn drain(&mut self) -> Vec<ModEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
