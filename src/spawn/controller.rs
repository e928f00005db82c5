use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::conflict::{ConflictChecker, ConflictInput, ConflictState};
use super::coordinator::{SpawnCoordinator, SpawnOutcome};
use crate::draft::{DraftKey, DraftStore, Preferences, SaveOutcome, SharedStore, SpawnDraft, SpawnMode};
use crate::error::SpawnError;
use crate::model::{BranchConflict, BranchSuggestion, ScmMode, SpawnRequest};

/// One spawn form: its draft, its conflict check and its submission.
///
/// Call [`SpawnController::hydrate`] once before anything else. Edits made
/// before hydration are kept locally but never persisted.
pub struct SpawnController {
    key: DraftKey,
    drafts: Arc<DraftStore<SharedStore>>,
    preferences: Arc<Preferences<SharedStore>>,
    coordinator: Arc<SpawnCoordinator>,
    conflicts: ConflictChecker,
    scm: ScmMode,
    draft: SpawnDraft,
}

impl SpawnController {
    pub fn new(
        key: DraftKey,
        drafts: Arc<DraftStore<SharedStore>>,
        preferences: Arc<Preferences<SharedStore>>,
        coordinator: Arc<SpawnCoordinator>,
        scm: ScmMode,
        conflict_debounce: Duration,
    ) -> Self {
        let conflicts = ConflictChecker::new(coordinator.cache().api().clone(), conflict_debounce);
        Self {
            key,
            drafts,
            preferences,
            coordinator,
            conflicts,
            scm,
            draft: SpawnDraft::default(),
        }
    }

    pub fn key(&self) -> &DraftKey {
        &self.key
    }

    pub fn draft(&self) -> &SpawnDraft {
        &self.draft
    }

    pub fn conflict_state(&self) -> ConflictState {
        self.conflicts.state()
    }

    pub fn subscribe_conflicts(&self) -> watch::Receiver<ConflictState> {
        self.conflicts.subscribe()
    }

    /// Load the stored draft for this form, prefilling empty fields from
    /// the last-used preferences.
    pub fn hydrate(&mut self) -> &SpawnDraft {
        let mut draft = self.drafts.hydrate(&self.key);

        if self.key == DraftKey::Fresh && draft.repo.is_empty() {
            if let Some(repo) = self.preferences.last_repo() {
                draft.repo = repo;
            }
        }
        if draft.target_counts.is_empty() {
            draft.target_counts = self.preferences.last_target_counts();
        }

        self.draft = draft;
        // The first cycle after hydration is the suppressed one
        self.persist();
        self.check_conflicts();
        &self.draft
    }

    /// Apply a change to the draft, persist it and re-run the conflict check.
    pub fn edit<F>(&mut self, f: F)
    where
        F: FnOnce(&mut SpawnDraft),
    {
        f(&mut self.draft);
        self.persist();
        self.check_conflicts();
    }

    /// Fill the branch (and the nickname when empty) from the daemon's
    /// suggestion for the current prompt.
    pub async fn suggest_branch(&mut self) -> BranchSuggestion {
        let suggestion = self.coordinator.suggest_branch(&self.draft.prompt).await;
        let applied = suggestion.clone();
        self.edit(|draft| {
            draft.branch = applied.branch;
            if draft.nickname.is_empty() {
                draft.nickname = applied.nickname;
            }
        });
        suggestion
    }

    pub async fn submit(&mut self) -> Result<SpawnOutcome, SpawnError> {
        match self.conflicts.state() {
            ConflictState::Conflict { workspace_id } => {
                return Err(SpawnError::BranchConflict(BranchConflict {
                    conflict: true,
                    workspace_id,
                }));
            }
            ConflictState::Pending => return Err(SpawnError::ConflictCheckPending),
            _ => {}
        }

        let request = self.build_request()?;
        let outcome = match self.coordinator.spawn(request.clone()).await {
            Ok(outcome) => outcome,
            Err(SpawnError::BranchConflict(conflict)) => {
                self.conflicts.apply_server_conflict(conflict.clone());
                return Err(SpawnError::BranchConflict(conflict));
            }
            Err(e) => return Err(e),
        };

        if outcome.any_succeeded() {
            self.finish(&request);
        }
        // A unit-level conflict outlives the draft reset
        match &outcome.conflict {
            Some(conflict) => self.conflicts.apply_server_conflict(conflict.clone()),
            None if outcome.any_succeeded() => self.conflicts.reset(),
            None => {}
        }
        Ok(outcome)
    }

    fn build_request(&self) -> Result<SpawnRequest, SpawnError> {
        let draft = &self.draft;
        let request = match self.key.workspace_id() {
            Some(id) => SpawnRequest::into_workspace(id),
            None => SpawnRequest::fresh(draft.repo.trim(), draft.branch.trim()),
        };

        let request = match draft.spawn_mode {
            SpawnMode::Promptable => request
                .with_targets(draft.target_counts.clone())
                .with_prompt(draft.prompt.clone()),
            SpawnMode::Command => {
                if draft.selected_command.is_empty() {
                    return Err(SpawnError::Invalid("no command selected".to_string()));
                }
                request.with_target(draft.selected_command.clone(), 1)
            }
        };
        Ok(request.with_nickname(draft.nickname.trim()))
    }

    /// Post-success bookkeeping: the draft goes, the choices are remembered.
    /// Conflict state is left to the caller.
    fn finish(&mut self, request: &SpawnRequest) {
        if let Err(e) = self.drafts.clear(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "Failed to clear spawn draft");
        }
        if request.is_fresh_workspace() {
            if let Err(e) = self.preferences.set_last_repo(&request.repo) {
                tracing::warn!(error = %e, "Failed to save last repo");
            }
        }
        if self.draft.spawn_mode == SpawnMode::Promptable {
            if let Err(e) = self.preferences.set_last_target_counts(&request.targets) {
                tracing::warn!(error = %e, "Failed to save last target counts");
            }
        }

        self.draft = SpawnDraft::default();
    }

    fn persist(&self) {
        match self.drafts.save(&self.key, &self.draft) {
            Ok(SaveOutcome::Saved) => {}
            Ok(outcome) => tracing::trace!(key = %self.key, ?outcome, "Draft save skipped"),
            Err(e) => tracing::warn!(key = %self.key, error = %e, "Failed to save spawn draft"),
        }
    }

    fn check_conflicts(&self) {
        let input = ConflictInput::new(self.draft.repo.trim(), self.draft.branch.trim(), self.scm)
            .in_workspace(self.key.workspace_id().map(str::to_string));
        self.conflicts.update(input);
    }
}
