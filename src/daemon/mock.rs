//! In-memory daemon for deterministic testing
//!
//! Implements [`DaemonApi`] over a local registry so cache, spawn and
//! terminal flows can be exercised without a running daemon. Every call is
//! recorded for later assertions.
//!
//! # Example
//! ```no_run
//! use schmux::daemon::mock::MockDaemon;
//! use schmux::daemon::DaemonApi;
//! use schmux::model::SpawnRequest;
//!
//! # async fn demo() {
//! let daemon = MockDaemon::new().failing_target("codex");
//! let request = SpawnRequest::fresh("r", "main")
//!     .with_target("claude", 2)
//!     .with_target("codex", 1);
//! let results = daemon.spawn(&request).await.unwrap();
//! assert_eq!(results.len(), 3);
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::DaemonApi;
use crate::error::ClientError;
use crate::model::{
    BranchConflict, BranchSuggestion, DaemonConfig, Session, SpawnRequest, SpawnResult,
    Workspace, BRANCH_CONFLICT_PREFIX,
};

#[derive(Default)]
struct MockState {
    config: DaemonConfig,
    workspaces: Vec<Workspace>,
    /// Sessions created but not yet visible in listings
    unpublished: Vec<(String, Session, u32)>,
    publish_lag: u32,
    next_workspace: u32,
    failing_targets: HashSet<String>,
    /// Target name to the workspace its units collide with
    conflicting_targets: HashMap<String, String>,
    spawn_rejection: Option<String>,
    listing_failure: Option<String>,
    suggestion: Option<BranchSuggestion>,
    conflict_overrides: HashMap<(String, String), BranchConflict>,
    check_delays: HashMap<String, Duration>,
    seeds: HashMap<String, Vec<String>>,
    spawn_requests: Vec<SpawnRequest>,
    conflict_checks: Vec<(String, String)>,
    list_calls: usize,
    disposed: Vec<String>,
    nickname_updates: Vec<(String, String)>,
}

/// Mock daemon with an in-memory session registry.
#[derive(Default)]
pub struct MockDaemon {
    state: Mutex<MockState>,
}

impl MockDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(self, config: DaemonConfig) -> Self {
        self.state.lock().config = config;
        self
    }

    /// Pre-populate the registry.
    pub fn with_workspace(self, workspace: Workspace) -> Self {
        self.state.lock().workspaces.push(workspace.normalize());
        self
    }

    /// Scrollback returned by `seed_lines` for a session. A seeded session
    /// counts as existing for terminal purposes even outside the registry.
    pub fn with_seed(self, session_id: impl Into<String>, lines: Vec<String>) -> Self {
        self.state.lock().seeds.insert(session_id.into(), lines);
        self
    }

    /// New sessions appear only after this many further listings.
    pub fn with_publish_lag(self, listings: u32) -> Self {
        self.state.lock().publish_lag = listings;
        self
    }

    pub fn with_suggestion(self, suggestion: BranchSuggestion) -> Self {
        self.state.lock().suggestion = Some(suggestion);
        self
    }

    /// Units for this target fail individually.
    pub fn failing_target(self, target: impl Into<String>) -> Self {
        self.state.lock().failing_targets.insert(target.into());
        self
    }

    /// Units for this target fail with a branch conflict against
    /// `workspace_id`, while the rest of the batch proceeds.
    pub fn conflicting_target(self, target: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        self.state
            .lock()
            .conflicting_targets
            .insert(target.into(), workspace_id.into());
        self
    }

    /// Reject the whole next spawn request with this message.
    pub fn reject_next_spawn(&self, message: impl Into<String>) {
        self.state.lock().spawn_rejection = Some(message.into());
    }

    /// Make listings fail until cleared with `None`.
    pub fn set_listing_failure(&self, message: Option<&str>) {
        self.state.lock().listing_failure = message.map(String::from);
    }

    /// Fixed answer for a repo/branch conflict check.
    pub fn set_conflict(&self, repo: &str, branch: &str, conflict: BranchConflict) {
        self.state
            .lock()
            .conflict_overrides
            .insert((repo.to_string(), branch.to_string()), conflict);
    }

    /// Delay conflict checks for one branch name.
    pub fn set_check_delay(&self, branch: &str, delay: Duration) {
        self.state
            .lock()
            .check_delays
            .insert(branch.to_string(), delay);
    }

    /// Change a session's nickname as if another client had edited it.
    pub fn set_remote_nickname(&self, session_id: &str, nickname: &str) {
        let mut state = self.state.lock();
        for ws in &mut state.workspaces {
            if let Some(session) = ws.find_session_mut(session_id) {
                session.nickname = Some(nickname.to_string());
            }
        }
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.state.lock().workspaces.clone()
    }

    pub fn spawn_requests(&self) -> Vec<SpawnRequest> {
        self.state.lock().spawn_requests.clone()
    }

    pub fn conflict_checks(&self) -> Vec<(String, String)> {
        self.state.lock().conflict_checks.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn disposed(&self) -> Vec<String> {
        self.state.lock().disposed.clone()
    }

    pub fn nickname_updates(&self) -> Vec<(String, String)> {
        self.state.lock().nickname_updates.clone()
    }
}

impl MockState {
    fn computed_conflict(&self, repo: &str, branch: &str) -> BranchConflict {
        if let Some(fixed) = self
            .conflict_overrides
            .get(&(repo.to_string(), branch.to_string()))
        {
            return fixed.clone();
        }
        match self
            .workspaces
            .iter()
            .find(|ws| ws.is_checkout_of(repo, branch))
        {
            Some(ws) if self.config.uses_worktrees() => BranchConflict::with_workspace(&ws.id),
            _ => BranchConflict::none(),
        }
    }

    fn create_workspace(&mut self, repo: &str, branch: &str) -> String {
        self.next_workspace += 1;
        let id = format!("ws-{}", self.next_workspace);
        self.workspaces.push(Workspace {
            id: id.clone(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            path: None,
            created_at: Some(Utc::now()),
            sessions: Vec::new(),
            session_count: 0,
        });
        id
    }

    fn insert_session(&mut self, workspace_id: &str, session: Session) {
        if self.publish_lag > 0 {
            self.unpublished
                .push((workspace_id.to_string(), session, self.publish_lag));
            return;
        }
        if let Some(ws) = self.workspaces.iter_mut().find(|w| w.id == workspace_id) {
            ws.sessions.push(session);
            ws.session_count = ws.sessions.len();
        }
    }

    fn publish_due(&mut self) {
        let mut still_pending = Vec::new();
        for (workspace_id, session, remaining) in std::mem::take(&mut self.unpublished) {
            if remaining > 1 {
                still_pending.push((workspace_id, session, remaining - 1));
            } else if let Some(ws) = self.workspaces.iter_mut().find(|w| w.id == workspace_id) {
                ws.sessions.push(session);
                ws.session_count = ws.sessions.len();
            }
        }
        self.unpublished = still_pending;
    }

    fn session_exists(&self, session_id: &str) -> bool {
        self.workspaces
            .iter()
            .any(|ws| ws.find_session(session_id).is_some())
    }
}

#[async_trait]
impl DaemonApi for MockDaemon {
    async fn get_config(&self) -> Result<DaemonConfig, ClientError> {
        Ok(self.state.lock().config.clone())
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ClientError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if let Some(message) = state.listing_failure.clone() {
            return Err(ClientError::Status {
                status: 503,
                message,
            });
        }
        state.publish_due();
        Ok(state.workspaces.clone())
    }

    async fn spawn(&self, request: &SpawnRequest) -> Result<Vec<SpawnResult>, ClientError> {
        let mut state = self.state.lock();
        state.spawn_requests.push(request.clone());

        if let Some(message) = state.spawn_rejection.take() {
            return Err(ClientError::Status {
                status: 409,
                message,
            });
        }

        let workspace_id = match request.workspace_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                if !state.workspaces.iter().any(|ws| ws.id == id) {
                    return Err(ClientError::NotFound(format!("workspace {} not found", id)));
                }
                id.to_string()
            }
            None => {
                let conflict = state.computed_conflict(&request.repo, &request.branch);
                if conflict.conflict {
                    return Err(ClientError::Status {
                        status: 409,
                        message: format!(
                            "{} branch \"{}\" is already checked out by workspace \"{}\"",
                            BRANCH_CONFLICT_PREFIX,
                            request.branch,
                            conflict.workspace_id.unwrap_or_default()
                        ),
                    });
                }
                state.create_workspace(&request.repo, &request.branch)
            }
        };

        let mut results = Vec::with_capacity(request.targets.total());
        for unit in request.targets.units() {
            if let Some(owner) = state.conflicting_targets.get(&unit.target) {
                results.push(SpawnResult {
                    session_id: None,
                    workspace_id: Some(workspace_id.clone()),
                    target: unit.target.clone(),
                    nickname: None,
                    error: Some(format!(
                        "{} branch \"{}\" is already checked out by workspace \"{}\"",
                        BRANCH_CONFLICT_PREFIX, request.branch, owner
                    )),
                    prompt: Some(request.prompt.clone()),
                });
                continue;
            }
            if state.failing_targets.contains(&unit.target) {
                results.push(SpawnResult {
                    session_id: None,
                    workspace_id: Some(workspace_id.clone()),
                    target: unit.target.clone(),
                    nickname: None,
                    error: Some(format!("failed to start {}", unit.target)),
                    prompt: Some(request.prompt.clone()),
                });
                continue;
            }

            let session_id = format!("{}-{}", unit.target, Uuid::new_v4().simple());
            let nickname = if request.nickname.is_empty() {
                None
            } else if unit.index == 0 {
                Some(request.nickname.clone())
            } else {
                Some(format!("{} ({})", request.nickname, unit.index + 1))
            };
            state.insert_session(
                &workspace_id,
                Session {
                    id: session_id.clone(),
                    target: unit.target.clone(),
                    nickname: nickname.clone(),
                    running: true,
                    created_at: Utc::now(),
                    last_output_at: None,
                    attach_cmd: format!("tmux attach -t {}", session_id),
                    remote_host_id: None,
                },
            );
            results.push(SpawnResult {
                session_id: Some(session_id),
                workspace_id: Some(workspace_id.clone()),
                target: unit.target,
                nickname,
                error: None,
                prompt: Some(request.prompt.clone()),
            });
        }

        Ok(results)
    }

    async fn check_branch_conflict(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchConflict, ClientError> {
        let delay = {
            let mut state = self.state.lock();
            state
                .conflict_checks
                .push((repo.to_string(), branch.to_string()));
            state.check_delays.get(branch).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().computed_conflict(repo, branch))
    }

    async fn suggest_branch(&self, _prompt: &str) -> Result<BranchSuggestion, ClientError> {
        self.state
            .lock()
            .suggestion
            .clone()
            .ok_or_else(|| ClientError::Status {
                status: 503,
                message: "branch suggestion is not configured".to_string(),
            })
    }

    async fn dispose_session(&self, session_id: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if !state.session_exists(session_id) {
            return Err(ClientError::NotFound(format!("session {}", session_id)));
        }
        for ws in &mut state.workspaces {
            ws.sessions.retain(|s| s.id != session_id);
            ws.session_count = ws.sessions.len();
        }
        state.workspaces.retain(|ws| !ws.sessions.is_empty());
        state.seeds.remove(session_id);
        state.disposed.push(session_id.to_string());
        Ok(())
    }

    async fn update_nickname(&self, session_id: &str, nickname: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if !state.session_exists(session_id) {
            return Err(ClientError::NotFound(format!("session {}", session_id)));
        }
        state
            .nickname_updates
            .push((session_id.to_string(), nickname.to_string()));
        drop(state);
        self.set_remote_nickname(session_id, nickname);
        Ok(())
    }

    async fn seed_lines(&self, session_id: &str, lines: usize) -> Result<Vec<String>, ClientError> {
        let state = self.state.lock();
        if !state.session_exists(session_id) && !state.seeds.contains_key(session_id) {
            return Err(ClientError::NotFound(format!("session {}", session_id)));
        }
        let seed = state.seeds.get(session_id).cloned().unwrap_or_default();
        let skip = seed.len().saturating_sub(lines);
        Ok(seed.into_iter().skip(skip).collect())
    }
}
