//! Client session-state cache
//!
//! Single in-memory view of the daemon's workspace registry. The poll loop
//! and every mutating action go through [`SessionCache::refresh`], and
//! consumers observe changes through a `watch` channel.

mod poller;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::daemon::DaemonApi;
use crate::error::ClientError;
use crate::model::{Session, Workspace};

pub use poller::PollerHandle;

/// Reconciled registry view published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub workspaces: Arc<Vec<Workspace>>,
    /// True once the first listing succeeded; never reset
    pub loaded: bool,
    /// Message of the most recent failed refresh, cleared on success
    pub last_error: Option<String>,
    /// Bumped on every published change
    pub revision: u64,
}

impl CacheSnapshot {
    pub fn workspace(&self, workspace_id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|ws| ws.id == workspace_id)
    }

    pub fn workspace_for(&self, repo: &str, branch: &str) -> Option<&Workspace> {
        self.workspaces
            .iter()
            .find(|ws| ws.is_checkout_of(repo, branch))
    }

    pub fn find_session(&self, session_id: &str) -> Option<(&Workspace, &Session)> {
        self.workspaces
            .iter()
            .find_map(|ws| ws.find_session(session_id).map(|s| (ws, s)))
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.find_session(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.workspaces.iter().map(|ws| ws.sessions.len()).sum()
    }
}

/// Answer to "does this session exist".
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    Found {
        workspace_id: String,
        session: Session,
    },
    /// First load has not finished; absence is not yet meaningful
    Pending,
    /// Loaded and the session is not in the registry
    Missing,
}

#[derive(Debug)]
struct NicknameOverride {
    nickname: String,
    /// The daemon accepted the rename; the next successful listing wins
    /// whatever it says
    accepted: bool,
}

/// Shared, eventually consistent cache of workspaces and sessions.
pub struct SessionCache {
    api: Arc<dyn DaemonApi>,
    tx: watch::Sender<CacheSnapshot>,
    /// Last listing as returned by the daemon, before local overrides
    authoritative: Mutex<Arc<Vec<Workspace>>>,
    /// Optimistic nickname edits awaiting confirmation, keyed by session id
    nickname_overrides: Mutex<HashMap<String, NicknameOverride>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl SessionCache {
    pub fn new(api: Arc<dyn DaemonApi>) -> Self {
        let (tx, _rx) = watch::channel(CacheSnapshot::default());
        Self {
            api,
            tx,
            authoritative: Mutex::new(Arc::new(Vec::new())),
            nickname_overrides: Mutex::new(HashMap::new()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn api(&self) -> &Arc<dyn DaemonApi> {
        &self.api
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.tx.subscribe()
    }

    /// Re-list the registry.
    ///
    /// A non-forced refresh is dropped when one is already in flight. A
    /// forced refresh waits for it and then fetches again, so callers that
    /// just mutated the registry always observe their own change.
    pub async fn refresh(&self, force: bool) -> Result<(), ClientError> {
        let _gate = if force {
            self.refresh_gate.lock().await
        } else {
            match self.refresh_gate.try_lock() {
                Ok(gate) => gate,
                Err(_) => {
                    tracing::trace!("Refresh already in flight, skipping");
                    return Ok(());
                }
            }
        };

        match self.api.list_workspaces().await {
            Ok(workspaces) => {
                let workspaces: Vec<Workspace> =
                    workspaces.into_iter().map(Workspace::normalize).collect();
                *self.authoritative.lock() = Arc::new(workspaces);
                self.publish(true);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh sessions");
                let message = e.to_string();
                self.tx.send_modify(|snapshot| {
                    snapshot.last_error = Some(message);
                    snapshot.revision += 1;
                });
                Err(e)
            }
        }
    }

    /// Rebuild the published snapshot from the authoritative listing plus
    /// any overrides still waiting for confirmation.
    fn publish(&self, from_refresh: bool) {
        let authoritative = self.authoritative.lock().clone();
        let mut overrides = self.nickname_overrides.lock();

        if from_refresh {
            overrides.retain(|session_id, pending| {
                if pending.accepted {
                    return false;
                }
                match authoritative
                    .iter()
                    .find_map(|ws| ws.find_session(session_id))
                {
                    Some(session) => {
                        session.nickname.as_deref() != Some(pending.nickname.as_str())
                    }
                    None => false,
                }
            });
        }

        let workspaces = if overrides.is_empty() {
            authoritative
        } else {
            let mut patched = (*authoritative).clone();
            for ws in &mut patched {
                for session in &mut ws.sessions {
                    if let Some(pending) = overrides.get(&session.id) {
                        session.nickname = Some(pending.nickname.clone());
                    }
                }
            }
            Arc::new(patched)
        };
        drop(overrides);

        self.tx.send_modify(|snapshot| {
            snapshot.workspaces = workspaces;
            if from_refresh {
                snapshot.loaded = true;
                snapshot.last_error = None;
            }
            snapshot.revision += 1;
        });
    }

    /// Wait until `predicate` holds for the published snapshot.
    ///
    /// Resolves once, with the matching snapshot, or `None` on timeout. The
    /// subscription is dropped on return.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> Option<CacheSnapshot>
    where
        F: FnMut(&CacheSnapshot) -> bool,
    {
        let mut rx = self.tx.subscribe();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|snapshot| predicate(snapshot))).await {
            Ok(Ok(snapshot)) => Some(snapshot.clone()),
            Ok(Err(_)) | Err(_) => None,
        };
        result
    }

    /// Wait until `session_id` appears in the cache.
    pub async fn wait_for_session(&self, session_id: &str, timeout: Duration) -> bool {
        self.wait_for(timeout, |snapshot| snapshot.contains_session(session_id))
            .await
            .is_some()
    }

    pub fn lookup_session(&self, session_id: &str) -> SessionLookup {
        let snapshot = self.tx.borrow();
        match snapshot.find_session(session_id) {
            Some((ws, session)) => SessionLookup::Found {
                workspace_id: ws.id.clone(),
                session: session.clone(),
            },
            None if !snapshot.loaded => SessionLookup::Pending,
            None => SessionLookup::Missing,
        }
    }

    /// Like [`SessionCache::lookup_session`], but waits up to `grace` for the
    /// first load before deciding. `Missing` is only returned after a load.
    pub async fn resolve_session(&self, session_id: &str, grace: Duration) -> SessionLookup {
        if !self.tx.borrow().loaded {
            self.wait_for(grace, |snapshot| snapshot.loaded).await;
        }
        self.lookup_session(session_id)
    }

    /// Show `nickname` for `session_id` until a refresh confirms it.
    pub fn set_nickname_override(&self, session_id: &str, nickname: &str) {
        self.nickname_overrides.lock().insert(
            session_id.to_string(),
            NicknameOverride {
                nickname: nickname.to_string(),
                accepted: false,
            },
        );
        self.publish(false);
    }

    pub fn clear_nickname_override(&self, session_id: &str) {
        if self.nickname_overrides.lock().remove(session_id).is_some() {
            self.publish(false);
        }
    }

    pub fn has_nickname_override(&self, session_id: &str) -> bool {
        self.nickname_overrides.lock().contains_key(session_id)
    }

    /// Rename a session with an optimistic local echo.
    ///
    /// The echo lasts until the first successful listing after the daemon
    /// accepts the rename, even if that listing shows a different name.
    pub async fn update_nickname(&self, session_id: &str, nickname: &str) -> Result<(), ClientError> {
        self.set_nickname_override(session_id, nickname);
        if let Err(e) = self.api.update_nickname(session_id, nickname).await {
            self.clear_nickname_override(session_id);
            return Err(e);
        }
        if let Some(pending) = self.nickname_overrides.lock().get_mut(session_id) {
            pending.accepted = true;
        }
        self.refresh_after_mutation().await;
        Ok(())
    }

    pub async fn dispose_session(&self, session_id: &str) -> Result<(), ClientError> {
        self.api.dispose_session(session_id).await?;
        self.nickname_overrides.lock().remove(session_id);
        self.refresh_after_mutation().await;
        Ok(())
    }

    /// Forced refresh whose failure is logged rather than returned; the
    /// mutation itself already succeeded.
    pub async fn refresh_after_mutation(&self) {
        if let Err(e) = self.refresh(true).await {
            tracing::debug!(error = %e, "Refresh after mutation failed");
        }
    }

    /// Start polling every `interval`. Polling stops when the handle is
    /// dropped or the cache is.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> PollerHandle {
        PollerHandle::spawn(Arc::downgrade(self), interval)
    }
}
