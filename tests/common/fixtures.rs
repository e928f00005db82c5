//! Registry and spawn-form fixtures

use std::sync::Arc;
use std::time::Duration;

use schmux::cache::SessionCache;
use schmux::daemon::mock::MockDaemon;
use schmux::draft::{DraftKey, DraftStore, MemoryStore, Preferences, SharedStore};
use schmux::model::{ScmMode, Workspace};
use schmux::spawn::{SpawnController, SpawnCoordinator};

/// Debounce used by every spawn form in these tests.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Long enough for a debounced conflict check to finish
pub const SETTLE: Duration = Duration::from_millis(400);

/// An empty workspace already registered with the daemon.
pub fn existing_workspace(id: &str, repo: &str, branch: &str) -> Workspace {
    Workspace {
        id: id.to_string(),
        repo: repo.to_string(),
        branch: branch.to_string(),
        path: None,
        created_at: None,
        sessions: Vec::new(),
        session_count: 0,
    }
}

/// One client "page": its tab-scoped store, its preferences and a cache
/// over a daemon it may share with other pages.
pub struct ClientPage {
    pub tab: MemoryStore,
    pub drafts: Arc<DraftStore<SharedStore>>,
    pub preferences: Arc<Preferences<SharedStore>>,
    pub cache: Arc<SessionCache>,
    pub coordinator: Arc<SpawnCoordinator>,
}

impl ClientPage {
    pub fn new(daemon: &Arc<MockDaemon>) -> Self {
        Self::with_tab(daemon, MemoryStore::new())
    }

    /// A fresh page load that reuses an existing tab store.
    pub fn with_tab(daemon: &Arc<MockDaemon>, tab: MemoryStore) -> Self {
        let cache = Arc::new(SessionCache::new(daemon.clone()));
        let tab_store: SharedStore = Arc::new(tab.clone());
        let prefs_store: SharedStore = Arc::new(MemoryStore::new());
        Self {
            tab,
            drafts: Arc::new(DraftStore::new(tab_store)),
            preferences: Arc::new(Preferences::new(prefs_store)),
            coordinator: Arc::new(SpawnCoordinator::new(cache.clone(), Duration::from_secs(2))),
            cache,
        }
    }

    pub fn form(&self, key: DraftKey) -> SpawnController {
        SpawnController::new(
            key,
            self.drafts.clone(),
            self.preferences.clone(),
            self.coordinator.clone(),
            ScmMode::Worktree,
            DEBOUNCE,
        )
    }
}
