use std::sync::Arc;
use std::time::Duration;

use crate::cache::SessionCache;
use crate::daemon::DaemonApi;
use crate::error::{parse_branch_conflict, SpawnError};
use crate::model::{BranchConflict, BranchSuggestion, SpawnRequest, SpawnResult, TargetCounts};

/// Where the client should go once a spawn finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Single new session, confirmed present in the cache
    Session(String),
    /// Several new sessions in an existing workspace, all confirmed present
    Workspace(String),
    /// Stay on the results view
    Stay,
}

/// Aggregated result of one batch spawn.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    /// One entry per flattened unit, in request order
    pub results: Vec<SpawnResult>,
    /// Set when a unit failed because its branch was taken concurrently
    pub conflict: Option<BranchConflict>,
    pub navigation: Navigation,
}

impl SpawnOutcome {
    pub fn succeeded(&self) -> impl Iterator<Item = &SpawnResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SpawnResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded().next().is_some()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(SpawnResult::is_success)
    }

    /// Counts for the units that failed, for a retry that must not
    /// re-create the sessions that already exist.
    pub fn failed_targets(&self) -> TargetCounts {
        self.failed().map(|r| (r.target.clone(), 1)).collect()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.succeeded()
            .filter_map(|r| r.session_id.clone())
            .collect()
    }
}

/// Issues batch spawn requests and reconciles them with the session cache.
///
/// Units are independent: a failed unit never aborts its siblings. The
/// coordinator does not deduplicate resubmissions; callers retry with
/// [`SpawnOutcome::failed_targets`].
pub struct SpawnCoordinator {
    api: Arc<dyn DaemonApi>,
    cache: Arc<SessionCache>,
    post_spawn_wait: Duration,
    refresh_interval: Duration,
}

/// How often the registry is re-listed while waiting for new sessions.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

impl SpawnCoordinator {
    pub fn new(cache: Arc<SessionCache>, post_spawn_wait: Duration) -> Self {
        Self {
            api: cache.api().clone(),
            cache,
            post_spawn_wait,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, SpawnError> {
        validate(&request)?;
        let expected_units = request.targets.total();

        tracing::info!(
            repo = %request.repo,
            branch = %request.branch,
            workspace_id = request.workspace_id.as_deref().unwrap_or("<new>"),
            units = expected_units,
            "Spawning sessions"
        );

        let results = match self.api.spawn(&request).await {
            Ok(results) => results,
            Err(e) => {
                let err = SpawnError::from(e);
                if let SpawnError::BranchConflict(conflict) = &err {
                    tracing::info!(
                        workspace_id = conflict.workspace_id.as_deref().unwrap_or("<unknown>"),
                        "Spawn rejected: branch already in use"
                    );
                    // The registry moved underneath us; pick up the winner
                    self.cache.refresh_after_mutation().await;
                }
                return Err(err);
            }
        };

        if results.len() != expected_units {
            tracing::warn!(
                expected = expected_units,
                received = results.len(),
                "Daemon returned an unexpected number of spawn results"
            );
        }

        for failed in results.iter().filter(|r| !r.is_success()) {
            tracing::warn!(
                run_target = %failed.target,
                error = failed.error.as_deref().unwrap_or_default(),
                "Spawn unit failed"
            );
        }

        let conflict = results
            .iter()
            .filter_map(|r| r.error.as_deref())
            .find_map(parse_branch_conflict);

        self.cache.refresh_after_mutation().await;
        let navigation = self.navigation_for(&request, &results).await;

        Ok(SpawnOutcome {
            results,
            conflict,
            navigation,
        })
    }

    /// Decide navigation; for an existing workspace where every unit
    /// succeeded, wait (bounded) until the cache shows the new sessions.
    /// The cache is re-listed every `refresh_interval` meanwhile.
    async fn navigation_for(&self, request: &SpawnRequest, results: &[SpawnResult]) -> Navigation {
        let Some(workspace_id) = request.workspace_id.as_deref().filter(|id| !id.is_empty()) else {
            return Navigation::Stay;
        };
        if results.is_empty() || !results.iter().all(SpawnResult::is_success) {
            return Navigation::Stay;
        }

        let session_ids: Vec<&str> = results
            .iter()
            .filter_map(|r| r.session_id.as_deref())
            .collect();
        if session_ids.len() != results.len() {
            return Navigation::Stay;
        }

        // The registry publishes asynchronously; keep re-listing while waiting
        let _poller = self.cache.spawn_poller(self.refresh_interval);
        let visible = self
            .cache
            .wait_for(self.post_spawn_wait, |snapshot| {
                session_ids.iter().all(|id| snapshot.contains_session(id))
            })
            .await
            .is_some();

        if !visible {
            tracing::warn!(
                workspace_id,
                "New sessions did not appear in time; staying on results"
            );
            return Navigation::Stay;
        }

        match session_ids.as_slice() {
            [only] => Navigation::Session(only.to_string()),
            _ => Navigation::Workspace(workspace_id.to_string()),
        }
    }

    /// Ask the daemon for a branch name and nickname. Never fails: any
    /// error yields [`BranchSuggestion::fallback`].
    pub async fn suggest_branch(&self, prompt: &str) -> BranchSuggestion {
        if prompt.trim().is_empty() {
            return BranchSuggestion::fallback();
        }
        match self.api.suggest_branch(prompt).await {
            Ok(suggestion) if !suggestion.branch.trim().is_empty() => suggestion,
            Ok(_) => BranchSuggestion::fallback(),
            Err(e) => {
                tracing::warn!(error = %e, "Branch suggestion failed, using fallback");
                BranchSuggestion::fallback()
            }
        }
    }
}

fn validate(request: &SpawnRequest) -> Result<(), SpawnError> {
    if request.targets.total() == 0 {
        return Err(SpawnError::Invalid("no run targets selected".to_string()));
    }
    if request.is_fresh_workspace() {
        if request.repo.trim().is_empty() {
            return Err(SpawnError::Invalid("repository is required".to_string()));
        }
        if request.branch.trim().is_empty() {
            return Err(SpawnError::Invalid("branch is required".to_string()));
        }
    }
    Ok(())
}
