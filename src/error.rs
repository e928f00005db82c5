//! Error types for the schmux client core.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::model::{BranchConflict, BRANCH_CONFLICT_PREFIX};

/// Errors crossing the daemon REST boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, timeout, TLS failure and the like.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Daemon answered with a non-success status.
    #[error("Daemon returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Daemon base URL could not be used.
    #[error("Invalid daemon URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            ClientError::NotFound(_) | ClientError::Decode(_) | ClientError::InvalidUrl(_) => {
                false
            }
        }
    }

    /// Message text reported by the daemon, if any.
    pub fn daemon_message(&self) -> Option<&str> {
        match self {
            ClientError::Status { message, .. } => Some(message),
            ClientError::NotFound(message) => Some(message),
            _ => None,
        }
    }

    /// Branch conflict carried in the daemon's message, if any.
    pub fn branch_conflict(&self) -> Option<BranchConflict> {
        self.daemon_message().and_then(parse_branch_conflict)
    }
}

/// Recognize a `branch_conflict:` message and extract the owning workspace.
///
/// The workspace id is read from a `workspace "<id>"` fragment; a message
/// with the prefix but no id still counts as a conflict.
pub fn parse_branch_conflict(message: &str) -> Option<BranchConflict> {
    let rest = message.trim_start().strip_prefix(BRANCH_CONFLICT_PREFIX)?;
    let workspace_id = workspace_id_pattern()
        .and_then(|re| re.captures(rest))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    Some(BranchConflict {
        conflict: true,
        workspace_id,
    })
}

fn workspace_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"workspace\s+"([^"]+)""#).ok())
        .as_ref()
}

/// Errors from the spawn flow.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The branch is already checked out by another workspace.
    #[error("Branch is already in use by workspace {}", .0.workspace_id.as_deref().unwrap_or("<unknown>"))]
    BranchConflict(BranchConflict),

    /// Submission blocked until a pending conflict check settles.
    #[error("Branch conflict check has not completed")]
    ConflictCheckPending,

    #[error("Invalid spawn request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Client(ClientError),
}

impl From<ClientError> for SpawnError {
    fn from(err: ClientError) -> Self {
        match err.branch_conflict() {
            Some(conflict) => SpawnError::BranchConflict(conflict),
            None => SpawnError::Client(err),
        }
    }
}

/// Errors from the terminal stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Session does not exist or was disposed. Not retried.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    /// Terminal URL cannot be opened by this build. Not retried.
    #[error("Unsupported terminal URL: {0}")]
    UnsupportedUrl(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,

    #[error("Terminal transport disposed")]
    Disposed,

    /// Input is frozen while lines are being selected.
    #[error("Terminal is in selection mode")]
    SelectionActive,
}

impl TransportError {
    /// Whether a reconnect attempt makes sense after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_) | TransportError::Protocol(_) | TransportError::Closed
        )
    }
}

/// Errors from client-side persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
