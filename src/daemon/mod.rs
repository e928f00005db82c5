//! REST boundary to the schmux daemon.

pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::model::{
    BranchConflict, BranchSuggestion, DaemonConfig, SpawnRequest, SpawnResult, Workspace,
};

pub use http::HttpDaemon;

/// Operations the client core needs from the daemon.
///
/// [`HttpDaemon`] talks to a real daemon; [`mock::MockDaemon`] keeps an
/// in-memory registry for tests.
#[async_trait]
pub trait DaemonApi: Send + Sync {
    /// Current configuration snapshot
    async fn get_config(&self) -> Result<DaemonConfig, ClientError>;

    /// Registry listing of all workspaces and their sessions
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ClientError>;

    /// Batch create; one result per flattened `(target, index)` unit, in order
    async fn spawn(&self, request: &SpawnRequest) -> Result<Vec<SpawnResult>, ClientError>;

    async fn check_branch_conflict(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchConflict, ClientError>;

    async fn suggest_branch(&self, prompt: &str) -> Result<BranchSuggestion, ClientError>;

    async fn dispose_session(&self, session_id: &str) -> Result<(), ClientError>;

    async fn update_nickname(&self, session_id: &str, nickname: &str) -> Result<(), ClientError>;

    /// Last `lines` lines of scrollback for a session
    async fn seed_lines(&self, session_id: &str, lines: usize) -> Result<Vec<String>, ClientError>;
}
