use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::target::{RunTarget, TargetSource};

/// Source control strategy the daemon uses for new workspaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScmMode {
    /// Linked working tree sharing history with a base clone
    #[default]
    Worktree,
    /// Independent clone per workspace
    Git,
}

impl ScmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScmMode::Worktree => "worktree",
            ScmMode::Git => "git",
        }
    }
}

impl FromStr for ScmMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "worktree" => Ok(ScmMode::Worktree),
            "git" => Ok(ScmMode::Git),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ScmMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub name: String,
    pub url: String,
}

/// Terminal viewport and history bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSettings {
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    /// Lines of scrollback fetched before the live stream opens
    #[serde(default = "default_seed_lines")]
    pub seed_lines: usize,
    /// Upper bound on locally retained history
    #[serde(default = "default_bootstrap_lines")]
    pub bootstrap_lines: usize,
}

fn default_width() -> u16 {
    120
}

fn default_height() -> u16 {
    40
}

fn default_seed_lines() -> usize {
    100
}

fn default_bootstrap_lines() -> usize {
    20_000
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            seed_lines: default_seed_lines(),
            bootstrap_lines: default_bootstrap_lines(),
        }
    }
}

impl TerminalSettings {
    /// Capacity of the local line buffer.
    pub fn history_capacity(&self) -> usize {
        self.bootstrap_lines.max(self.seed_lines).max(1)
    }
}

/// Snapshot of `GET /api/config`.
///
/// Older daemons published `agents`, then `variants`, then `models` instead
/// of `run_targets`. Those are folded into `run_targets` when read and never
/// written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDaemonConfig")]
pub struct DaemonConfig {
    pub repos: Vec<RepoEntry>,
    pub run_targets: Vec<RunTarget>,
    pub terminal: TerminalSettings,
    pub source_code_management: ScmMode,
    pub sessions_poll_interval_ms: u64,
}

const DEFAULT_SESSIONS_POLL_MS: u64 = 5_000;

impl DaemonConfig {
    pub fn run_target(&self, name: &str) -> Option<&RunTarget> {
        self.run_targets.iter().find(|t| t.name == name)
    }

    pub fn repo_url(&self, name_or_url: &str) -> String {
        self.repos
            .iter()
            .find(|r| r.name == name_or_url)
            .map(|r| r.url.clone())
            .unwrap_or_else(|| name_or_url.to_string())
    }

    /// Session list poll interval the daemon recommends.
    pub fn sessions_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sessions_poll_interval_ms.max(1))
    }

    pub fn uses_worktrees(&self) -> bool {
        self.source_code_management == ScmMode::Worktree
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyAgent {
    name: String,
    command: String,
    #[serde(default = "default_true")]
    agentic: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyVariant {
    name: String,
    command: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyModel {
    #[serde(alias = "id")]
    name: String,
    command: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDaemonConfig {
    #[serde(default)]
    repos: Vec<RepoEntry>,
    #[serde(default)]
    run_targets: Option<Vec<RunTarget>>,
    #[serde(default)]
    terminal: Option<TerminalSettings>,
    #[serde(default)]
    source_code_management: Option<ScmMode>,
    #[serde(default)]
    sessions_poll_interval_ms: Option<u64>,
    #[serde(default)]
    agents: Vec<LegacyAgent>,
    #[serde(default)]
    variants: Vec<LegacyVariant>,
    #[serde(default)]
    models: Vec<LegacyModel>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        RawDaemonConfig::default().into()
    }
}

impl From<RawDaemonConfig> for DaemonConfig {
    fn from(raw: RawDaemonConfig) -> Self {
        let run_targets = match raw.run_targets {
            Some(targets) => targets,
            None => migrate_legacy_targets(raw.agents, raw.variants, raw.models),
        };

        Self {
            repos: raw.repos,
            run_targets,
            terminal: raw.terminal.unwrap_or_default(),
            source_code_management: raw.source_code_management.unwrap_or_default(),
            sessions_poll_interval_ms: raw
                .sessions_poll_interval_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_SESSIONS_POLL_MS),
        }
    }
}

fn migrate_legacy_targets(
    agents: Vec<LegacyAgent>,
    variants: Vec<LegacyVariant>,
    models: Vec<LegacyModel>,
) -> Vec<RunTarget> {
    let mut targets: Vec<RunTarget> = Vec::new();
    let mut push = |target: RunTarget| {
        if targets.iter().all(|t| t.name != target.name) {
            targets.push(target);
        }
    };

    for agent in agents {
        if agent.agentic {
            push(RunTarget::promptable(agent.name, agent.command));
        } else {
            push(RunTarget::command(agent.name, agent.command));
        }
    }
    for variant in variants {
        push(RunTarget::promptable(variant.name, variant.command).with_source(TargetSource::Model));
    }
    for model in models {
        push(RunTarget::promptable(model.name, model.command).with_source(TargetSource::Model));
    }

    if !targets.is_empty() {
        tracing::debug!(count = targets.len(), "Migrated legacy run target schema");
    }
    targets
}
