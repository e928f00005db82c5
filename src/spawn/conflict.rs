//! Debounced branch conflict checks for new worktree workspaces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::daemon::DaemonApi;
use crate::model::{BranchConflict, ScmMode};

/// Inputs that decide whether and what to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInput {
    pub repo: String,
    pub branch: String,
    pub workspace_id: Option<String>,
    pub scm: ScmMode,
}

impl ConflictInput {
    pub fn new(repo: impl Into<String>, branch: impl Into<String>, scm: ScmMode) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            workspace_id: None,
            scm,
        }
    }

    pub fn in_workspace(mut self, workspace_id: Option<String>) -> Self {
        self.workspace_id = workspace_id.filter(|id| !id.is_empty());
        self
    }

    /// Only fresh workspaces in worktree mode can collide on a branch.
    pub fn is_applicable(&self) -> bool {
        self.workspace_id.is_none()
            && self.scm == ScmMode::Worktree
            && !self.repo.trim().is_empty()
            && !self.branch.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictState {
    /// No check needed for the current inputs
    NotApplicable,
    /// Waiting for input to settle or for the daemon to answer
    Pending,
    Clear,
    Conflict { workspace_id: Option<String> },
    /// The check itself failed; submission is allowed and the daemon
    /// remains the final judge
    Failed(String),
}

impl ConflictState {
    pub fn allows_submit(&self) -> bool {
        matches!(
            self,
            ConflictState::NotApplicable | ConflictState::Clear | ConflictState::Failed(_)
        )
    }
}

struct Inner {
    /// Bumped for every new input; a check only applies its answer if the
    /// generation it started with is still current
    generation: AtomicU64,
    tx: watch::Sender<ConflictState>,
    last_input: Mutex<Option<ConflictInput>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Publish a check result unless a newer input has arrived. The
    /// generation is compared under the channel's write lock; every other
    /// writer bumps it before sending.
    fn publish_if_current(&self, generation: u64, state: ConflictState) -> bool {
        self.tx.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = state;
            true
        })
    }
}

/// Debounced, last-input-wins branch conflict checker.
pub struct ConflictChecker {
    api: Arc<dyn DaemonApi>,
    debounce: Duration,
    inner: Arc<Inner>,
}

impl ConflictChecker {
    pub fn new(api: Arc<dyn DaemonApi>, debounce: Duration) -> Self {
        let (tx, _rx) = watch::channel(ConflictState::NotApplicable);
        Self {
            api,
            debounce,
            inner: Arc::new(Inner {
                generation: AtomicU64::new(0),
                tx,
                last_input: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConflictState {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConflictState> {
        self.inner.tx.subscribe()
    }

    pub fn can_submit(&self) -> bool {
        self.state().allows_submit()
    }

    /// Feed the latest form inputs. Identical inputs are ignored; anything
    /// else cancels the pending or in-flight check and schedules a new one
    /// after the debounce period.
    pub fn update(&self, input: ConflictInput) {
        {
            let mut last = self.inner.last_input.lock();
            if last.as_ref() == Some(&input) {
                return;
            }
            *last = Some(input.clone());
        }

        let generation = self.cancel_pending();

        if !input.is_applicable() {
            self.inner.tx.send_replace(ConflictState::NotApplicable);
            return;
        }
        self.inner.tx.send_replace(ConflictState::Pending);

        let api = self.api.clone();
        let inner = self.inner.clone();
        let debounce = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            let result = api.check_branch_conflict(&input.repo, &input.branch).await;

            let state = match result {
                Ok(BranchConflict { conflict: true, workspace_id }) => {
                    ConflictState::Conflict { workspace_id }
                }
                Ok(_) => ConflictState::Clear,
                Err(e) => {
                    tracing::warn!(branch = %input.branch, error = %e, "Branch conflict check failed");
                    ConflictState::Failed(e.to_string())
                }
            };
            if !inner.publish_if_current(generation, state) {
                tracing::debug!(branch = %input.branch, "Discarding stale conflict check");
            }
        });

        *self.inner.task.lock() = Some(task);
    }

    /// Record a conflict the daemon reported at submit time. Overrides any
    /// check still in flight.
    pub fn apply_server_conflict(&self, conflict: BranchConflict) {
        self.cancel_pending();
        self.inner.tx.send_replace(ConflictState::Conflict {
            workspace_id: conflict.workspace_id,
        });
    }

    /// Forget the last input so the next `update` always re-checks.
    pub fn reset(&self) {
        self.cancel_pending();
        *self.inner.last_input.lock() = None;
        self.inner.tx.send_replace(ConflictState::NotApplicable);
    }

    fn cancel_pending(&self) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
        generation
    }
}

impl Drop for ConflictChecker {
    fn drop(&mut self) {
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }
}
