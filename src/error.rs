//! Error types for modsync.
//!
//! Two layers live here:
//! - [`ErrorCode`], the typed failure every asynchronous operation completes with.
//!   Codes are grouped into categories and carry a stable numeric identity so a
//!   terminal failure can be persisted and restored across sessions.
//! - [`Error`], the crate-level error used by configuration, persistence and the
//!   installer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collection::ModId;

/// Category an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Generic,
    Http,
    Filesystem,
    ModManagement,
}

impl ErrorCategory {
    /// Stable numeric identifier, used in persisted state.
    pub fn id(self) -> u64 {
        match self {
            ErrorCategory::Generic => 1,
            ErrorCategory::Http => 2,
            ErrorCategory::Filesystem => 3,
            ErrorCategory::ModManagement => 4,
        }
    }

    /// Look up a category by its numeric identifier.
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            1 => Some(ErrorCategory::Generic),
            2 => Some(ErrorCategory::Http),
            3 => Some(ErrorCategory::Filesystem),
            4 => Some(ErrorCategory::ModManagement),
            _ => None,
        }
    }
}

/// Failure reported by an operation.
///
/// Lower layers only produce and forward these; deciding whether a failure is
/// worth retrying is left to [`crate::collection::ModCollectionEntry::record_failure`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Generic
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Could not allocate a native resource")]
    ResourceExhausted,

    #[error("Operation timed out while polling for completion")]
    TimedOut,

    // Http
    #[error("Transport error")]
    TransportError,

    #[error("Invalid response from server")]
    InvalidResponse,

    // Filesystem
    #[error("Insufficient permissions")]
    NoPermission,

    #[error("File read failed")]
    ReadError,

    #[error("File write failed")]
    WriteError,

    #[error("File not found")]
    NotFound,

    // Mod management
    #[error("Mod installation failed, retry possible")]
    RetryableInstallError,

    #[error("Mod installation failed permanently")]
    UnrecoverableInstallError,

    #[error("Mod deletion deferred")]
    DeferredDeleteError,
}

impl ErrorCode {
    const ALL: [ErrorCode; 12] = [
        ErrorCode::Cancelled,
        ErrorCode::ResourceExhausted,
        ErrorCode::TimedOut,
        ErrorCode::TransportError,
        ErrorCode::InvalidResponse,
        ErrorCode::NoPermission,
        ErrorCode::ReadError,
        ErrorCode::WriteError,
        ErrorCode::NotFound,
        ErrorCode::RetryableInstallError,
        ErrorCode::UnrecoverableInstallError,
        ErrorCode::DeferredDeleteError,
    ];

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::Cancelled | ErrorCode::ResourceExhausted | ErrorCode::TimedOut => {
                ErrorCategory::Generic
            }
            ErrorCode::TransportError | ErrorCode::InvalidResponse => ErrorCategory::Http,
            ErrorCode::NoPermission
            | ErrorCode::ReadError
            | ErrorCode::WriteError
            | ErrorCode::NotFound => ErrorCategory::Filesystem,
            ErrorCode::RetryableInstallError
            | ErrorCode::UnrecoverableInstallError
            | ErrorCode::DeferredDeleteError => ErrorCategory::ModManagement,
        }
    }

    /// Numeric code within the category.
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::Cancelled => 1,
            ErrorCode::ResourceExhausted => 2,
            ErrorCode::TimedOut => 3,
            ErrorCode::TransportError => 1,
            ErrorCode::InvalidResponse => 2,
            ErrorCode::NoPermission => 1,
            ErrorCode::ReadError => 2,
            ErrorCode::WriteError => 3,
            ErrorCode::NotFound => 4,
            ErrorCode::RetryableInstallError => 1,
            ErrorCode::UnrecoverableInstallError => 2,
            ErrorCode::DeferredDeleteError => 3,
        }
    }

    /// Rebuild a code from its persisted `(code, category)` pair.
    pub fn from_parts(code: u32, category_id: u64) -> Option<Self> {
        let category = ErrorCategory::from_id(category_id)?;
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.category() == category && candidate.code() == code)
    }

    /// Failures worth another attempt later in the same session.
    pub fn is_retryable_install(self) -> bool {
        matches!(
            self,
            ErrorCode::TransportError
                | ErrorCode::TimedOut
                | ErrorCode::ResourceExhausted
                | ErrorCode::ReadError
                | ErrorCode::WriteError
                | ErrorCode::RetryableInstallError
        )
    }

    /// Failures that rule out ever installing this mod file.
    pub fn is_unrecoverable_install(self) -> bool {
        matches!(self, ErrorCode::UnrecoverableInstallError)
    }

    /// Deletion failures that should wait for the next session.
    pub fn is_deferred_delete(self) -> bool {
        matches!(
            self,
            ErrorCode::DeferredDeleteError | ErrorCode::NoPermission
        )
    }

    /// Classify an I/O error raised while touching the filesystem.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorCode::NoPermission,
            std::io::ErrorKind::NotFound => ErrorCode::NotFound,
            std::io::ErrorKind::OutOfMemory => ErrorCode::ResourceExhausted,
            _ => ErrorCode::WriteError,
        }
    }
}

/// Result of an asynchronous operation.
pub type OpResult<T> = std::result::Result<T, ErrorCode>;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Mod management errors
    #[error("{0}")]
    Operation(#[from] ErrorCode),

    #[error("Mod {0} is not known locally")]
    UnknownMod(ModId),

    #[error("Mod {0} will not be retried this session")]
    RetriesExhausted(ModId),

    #[error("Mod {0} already has an operation in progress")]
    InProgress(ModId),

    #[error("Invalid filename (path traversal attempt): {0}")]
    InvalidFilename(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The operation-level code behind this error, if there is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Operation(code) => Some(*code),
            Error::Io(err) => Some(ErrorCode::from_io(err)),
            _ => None,
        }
    }
}

/// Process exit codes for the CLI.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 2;
    pub const NETWORK_ERROR: i32 = 3;
    pub const INSTALL_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
}
