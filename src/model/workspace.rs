use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One agent or command process attached to a tmux pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Run target name the session was spawned from
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub running: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_at: Option<DateTime<Utc>>,
    /// Shell command that attaches a local terminal to the tmux pane
    #[serde(default)]
    pub attach_cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_host_id: Option<String>,
}

impl Session {
    /// Nickname when set, otherwise the target name
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.target)
    }
}

/// A repo + branch checkout hosting one or more sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    /// Repository URL or `local:<name>`
    pub repo: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub session_count: usize,
}

impl Workspace {
    /// Fill in `session_count` when the daemon omitted it.
    pub fn normalize(mut self) -> Self {
        if self.session_count == 0 {
            self.session_count = self.sessions.len();
        }
        self
    }

    pub fn find_session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn find_session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    pub fn is_checkout_of(&self, repo: &str, branch: &str) -> bool {
        self.repo == repo && self.branch == branch
    }

    pub fn running_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.running).count()
    }
}
