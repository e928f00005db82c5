use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::store::KeyValueStore;
use crate::error::StoreError;
use crate::model::TargetCounts;

const DRAFT_KEY_PREFIX: &str = "spawn-draft-";

/// Which spawn form a draft belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DraftKey {
    /// Spawning into a new workspace
    Fresh,
    /// Adding sessions to an existing workspace
    Workspace(String),
}

impl DraftKey {
    pub fn for_workspace(workspace_id: Option<&str>) -> Self {
        match workspace_id.filter(|id| !id.is_empty()) {
            Some(id) => DraftKey::Workspace(id.to_string()),
            None => DraftKey::Fresh,
        }
    }

    pub fn storage_key(&self) -> String {
        match self {
            DraftKey::Fresh => format!("{}fresh", DRAFT_KEY_PREFIX),
            DraftKey::Workspace(id) => format!("{}{}", DRAFT_KEY_PREFIX, id),
        }
    }

    pub fn workspace_id(&self) -> Option<&str> {
        match self {
            DraftKey::Fresh => None,
            DraftKey::Workspace(id) => Some(id),
        }
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Whether the form spawns agents with a prompt or a plain command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMode {
    #[default]
    Promptable,
    Command,
}

/// Unsaved spawn form state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnDraft {
    pub prompt: String,
    pub spawn_mode: SpawnMode,
    /// Command target picked while in command mode
    pub selected_command: String,
    pub target_counts: TargetCounts,
    pub repo: String,
    pub branch: String,
    pub nickname: String,
}

impl SpawnDraft {
    pub fn is_empty(&self) -> bool {
        *self == SpawnDraft::default()
    }
}

/// Result of a [`DraftStore::save`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// First save after a hydration; skipped so stale pre-hydration state
    /// cannot overwrite the draft that was just read.
    Suppressed,
    /// The key was never hydrated; nothing written.
    NotHydrated,
}

#[derive(Default)]
struct HydrationState {
    hydrated: HashSet<DraftKey>,
    suppress_next: HashSet<DraftKey>,
}

/// Spawn drafts keyed by workspace, guarded by a hydration gate.
///
/// A key must be hydrated (read once) before it can be written, and the
/// save immediately following a hydration is dropped.
pub struct DraftStore<S> {
    store: S,
    state: Mutex<HydrationState>,
}

impl<S: KeyValueStore> DraftStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: Mutex::new(HydrationState::default()),
        }
    }

    /// Read the draft for `key`, defaulting when absent or unreadable.
    pub fn hydrate(&self, key: &DraftKey) -> SpawnDraft {
        let draft = match self.store.get(&key.storage_key()) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable spawn draft");
                SpawnDraft::default()
            }),
            None => SpawnDraft::default(),
        };

        let mut state = self.state.lock();
        state.hydrated.insert(key.clone());
        state.suppress_next.insert(key.clone());
        draft
    }

    pub fn is_hydrated(&self, key: &DraftKey) -> bool {
        self.state.lock().hydrated.contains(key)
    }

    pub fn save(&self, key: &DraftKey, draft: &SpawnDraft) -> Result<SaveOutcome, StoreError> {
        {
            let mut state = self.state.lock();
            if !state.hydrated.contains(key) {
                return Ok(SaveOutcome::NotHydrated);
            }
            if state.suppress_next.remove(key) {
                return Ok(SaveOutcome::Suppressed);
            }
        }

        if draft.is_empty() {
            self.store.remove(&key.storage_key())?;
        } else {
            self.store
                .set(&key.storage_key(), serde_json::to_string(draft)?)?;
        }
        Ok(SaveOutcome::Saved)
    }

    /// Drop the stored draft. The key stays hydrated.
    pub fn clear(&self, key: &DraftKey) -> Result<(), StoreError> {
        self.state.lock().suppress_next.remove(key);
        self.store.remove(&key.storage_key())
    }
}
