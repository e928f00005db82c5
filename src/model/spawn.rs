use serde::{Deserialize, Serialize};

use super::target::TargetCounts;

/// Message prefix the daemon uses when a spawn loses a branch race.
pub const BRANCH_CONFLICT_PREFIX: &str = "branch_conflict:";

/// Body of `POST /api/spawn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub nickname: String,
    pub targets: TargetCounts,
    /// Existing workspace to spawn into; `None` creates a new one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl SpawnRequest {
    /// Request that creates (or reuses) a workspace for `repo`/`branch`.
    pub fn fresh(repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            prompt: String::new(),
            nickname: String::new(),
            targets: TargetCounts::new(),
            workspace_id: None,
        }
    }

    /// Request that adds sessions to an existing workspace.
    pub fn into_workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: Some(workspace_id.into()),
            ..Self::fresh(String::new(), String::new())
        }
    }

    pub fn with_target(mut self, name: impl Into<String>, count: u32) -> Self {
        self.targets.set(name, count);
        self
    }

    pub fn with_targets(mut self, targets: TargetCounts) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn is_fresh_workspace(&self) -> bool {
        self.workspace_id.as_deref().map_or(true, str::is_empty)
    }
}

/// Outcome of one spawn unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl SpawnResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Response of the branch conflict check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConflict {
    pub conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl BranchConflict {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            conflict: true,
            workspace_id: Some(workspace_id.into()),
        }
    }
}

/// Response of `POST /api/suggest-branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSuggestion {
    pub branch: String,
    #[serde(default)]
    pub nickname: String,
}

impl BranchSuggestion {
    /// Used when the daemon cannot produce a suggestion.
    pub fn fallback() -> Self {
        Self {
            branch: "main".to_string(),
            nickname: String::new(),
        }
    }
}
