//! Integration tests for the HTTP daemon client
//!
//! Every test runs `HttpDaemon` against a local axum server backed by the
//! in-memory daemon.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::common::daemon_server::{serve_config, TestDaemon};
use schmux::cache::SessionCache;
use schmux::daemon::mock::MockDaemon;
use schmux::daemon::{DaemonApi, HttpDaemon};
use schmux::error::{ClientError, SpawnError};
use schmux::model::{BranchConflict, DaemonConfig, RepoEntry, ScmMode, SpawnRequest, TargetKind};
use schmux::spawn::SpawnCoordinator;

fn client(server: &TestDaemon) -> HttpDaemon {
    HttpDaemon::new(server.url.clone()).expect("valid url")
}

/// Config travels over the wire intact
#[tokio::test]
async fn test_get_config() {
    let config = DaemonConfig {
        repos: vec![RepoEntry {
            name: "app".into(),
            url: "git@example.com:app.git".into(),
        }],
        source_code_management: ScmMode::Git,
        ..DaemonConfig::default()
    };
    let server = TestDaemon::start(MockDaemon::new().with_config(config)).await;

    let fetched = client(&server).get_config().await.expect("config should load");
    assert_eq!(fetched.repo_url("app"), "git@example.com:app.git");
    assert_eq!(fetched.source_code_management, ScmMode::Git);
}

/// A spawn shows up in the next listing
#[tokio::test]
async fn test_spawn_then_list() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let api = client(&server);

    let results = api
        .spawn(
            &SpawnRequest::fresh("r", "main")
                .with_target("claude", 2)
                .with_prompt("fix bug")
                .with_nickname("fixer"),
        )
        .await
        .expect("spawn should succeed");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_success()));

    let workspaces = api.list_workspaces().await.expect("listing should succeed");
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].session_count, 2);
    let nicknames: Vec<_> = workspaces[0]
        .sessions
        .iter()
        .filter_map(|s| s.nickname.clone())
        .collect();
    assert_eq!(nicknames, vec!["fixer", "fixer (2)"]);
}

/// A conflicting fresh spawn comes back as a typed conflict
#[tokio::test]
async fn test_spawn_branch_conflict_is_typed() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let api = client(&server);
    let request = SpawnRequest::fresh("r", "feature").with_target("claude", 1);

    api.spawn(&request).await.expect("first spawn should succeed");
    let err = api.spawn(&request).await.expect_err("second spawn conflicts");

    assert!(matches!(err, ClientError::Status { status: 409, .. }));
    assert_eq!(
        err.branch_conflict(),
        Some(BranchConflict::with_workspace("ws-1"))
    );
    match SpawnError::from(err) {
        SpawnError::BranchConflict(conflict) => {
            assert_eq!(conflict.workspace_id.as_deref(), Some("ws-1"))
        }
        other => panic!("Expected a branch conflict, got {other:?}"),
    }
}

/// The conflict check endpoint reports the owning workspace
#[tokio::test]
async fn test_check_branch_conflict() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let api = client(&server);
    api.spawn(&SpawnRequest::fresh("r", "taken").with_target("claude", 1))
        .await
        .expect("spawn should succeed");

    let taken = api
        .check_branch_conflict("r", "taken")
        .await
        .expect("check should succeed");
    assert_eq!(taken, BranchConflict::with_workspace("ws-1"));

    let free = api
        .check_branch_conflict("r", "free")
        .await
        .expect("check should succeed");
    assert!(!free.conflict);
}

/// Seed lines for an unknown session map to not-found
#[tokio::test]
async fn test_seed_for_unknown_session_is_not_found() {
    let server = TestDaemon::start(MockDaemon::new().with_seed("s1", vec!["a".into(), "b".into()])).await;
    let api = client(&server);

    assert_eq!(api.seed_lines("s1", 1).await.expect("seed"), vec!["b"]);
    assert!(matches!(
        api.seed_lines("nope", 10).await,
        Err(ClientError::NotFound(_))
    ));
}

/// Session ids with reserved characters reach the daemon as one path segment
#[tokio::test]
async fn test_reserved_characters_in_session_id() {
    let server = TestDaemon::start(
        MockDaemon::new().with_seed("team/a b?x", vec!["first".into(), "last".into()]),
    )
    .await;
    let api = client(&server);

    assert_eq!(
        api.seed_lines("team/a b?x", 1).await.expect("seed"),
        vec!["last"]
    );
}

/// Disposing the only session empties the registry
#[tokio::test]
async fn test_dispose_session() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let api = client(&server);
    let results = api
        .spawn(&SpawnRequest::fresh("r", "main").with_target("claude", 1))
        .await
        .expect("spawn should succeed");
    let session_id = results[0].session_id.clone().expect("session id");

    api.dispose_session(&session_id)
        .await
        .expect("dispose should succeed");
    assert!(api.list_workspaces().await.expect("listing").is_empty());
    assert_eq!(server.mock.disposed(), vec![session_id.clone()]);

    assert!(matches!(
        api.dispose_session(&session_id).await,
        Err(ClientError::NotFound(_))
    ));
}

/// Nickname updates reach the daemon and show up after a refresh
#[tokio::test]
async fn test_update_nickname_through_cache() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let api = Arc::new(client(&server));
    let results = api
        .spawn(&SpawnRequest::fresh("r", "main").with_target("claude", 1))
        .await
        .expect("spawn should succeed");
    let session_id = results[0].session_id.clone().expect("session id");

    let cache = SessionCache::new(api.clone());
    cache.refresh(true).await.expect("refresh should succeed");
    cache
        .update_nickname(&session_id, "renamed")
        .await
        .expect("nickname update should succeed");

    assert_eq!(
        server.mock.nickname_updates(),
        vec![(session_id.clone(), "renamed".to_string())]
    );
    cache.refresh(true).await.expect("refresh should succeed");
    let snapshot = cache.snapshot();
    let (_, session) = snapshot.find_session(&session_id).expect("session cached");
    assert_eq!(session.nickname.as_deref(), Some("renamed"));
    assert!(!cache.has_nickname_override(&session_id));
}

/// A failing suggestion endpoint falls back to "main"
#[tokio::test]
async fn test_suggest_branch_falls_back() {
    let server = TestDaemon::start(MockDaemon::new()).await;
    let api = Arc::new(client(&server));

    assert!(matches!(
        api.suggest_branch("add login").await,
        Err(ClientError::Status { status: 503, .. })
    ));

    let coordinator = SpawnCoordinator::new(Arc::new(SessionCache::new(api)), Duration::from_secs(1));
    let suggestion = coordinator.suggest_branch("add login").await;
    assert_eq!(suggestion.branch, "main");
}

/// Older daemons publish agents and variants instead of run targets
#[tokio::test]
async fn test_legacy_config_is_migrated() {
    let (url, handle) = serve_config(json!({
        "repos": [],
        "agents": [
            {"name": "claude", "command": "claude", "agentic": true},
            {"name": "lint", "command": "make lint", "agentic": false}
        ],
        "variants": [
            {"name": "claude-fast", "command": "claude --fast"}
        ]
    }))
    .await;

    let config = HttpDaemon::new(url)
        .expect("valid url")
        .get_config()
        .await
        .expect("legacy config should load");
    handle.abort();

    let names: Vec<&str> = config.run_targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["claude", "lint", "claude-fast"]);
    assert!(config.run_target("claude").is_some_and(|t| t.requires_prompt()));
    assert!(matches!(
        config.run_target("lint").map(|t| &t.kind),
        Some(TargetKind::Command { .. })
    ));
    assert!(config.uses_worktrees());
}

/// An unreachable daemon is a transient transport error
#[tokio::test]
async fn test_unreachable_daemon_is_transient() {
    let api = HttpDaemon::new("http://127.0.0.1:1").expect("valid url");
    let err = api.list_workspaces().await.expect_err("nothing listens on port 1");
    assert!(matches!(err, ClientError::Http(_)));
    assert!(err.is_transient());
}
