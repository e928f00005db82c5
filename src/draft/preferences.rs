use super::store::KeyValueStore;
use crate::error::StoreError;
use crate::model::TargetCounts;

const LAST_REPO_KEY: &str = "last-repo";
const LAST_TARGET_COUNTS_KEY: &str = "last-target-counts";
const SIDEBAR_COLLAPSED_KEY: &str = "sidebar-collapsed";

/// Durable UI preferences shared by every client instance.
pub struct Preferences<S> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn last_repo(&self) -> Option<String> {
        self.store.get(LAST_REPO_KEY).filter(|r| !r.is_empty())
    }

    pub fn set_last_repo(&self, repo: &str) -> Result<(), StoreError> {
        self.store.set(LAST_REPO_KEY, repo.to_string())
    }

    pub fn last_target_counts(&self) -> TargetCounts {
        self.store
            .get(LAST_TARGET_COUNTS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn set_last_target_counts(&self, counts: &TargetCounts) -> Result<(), StoreError> {
        self.store
            .set(LAST_TARGET_COUNTS_KEY, serde_json::to_string(counts)?)
    }

    pub fn sidebar_collapsed(&self) -> bool {
        self.store
            .get(SIDEBAR_COLLAPSED_KEY)
            .is_some_and(|v| v == "true")
    }

    pub fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<(), StoreError> {
        self.store
            .set(SIDEBAR_COLLAPSED_KEY, collapsed.to_string())
    }
}
