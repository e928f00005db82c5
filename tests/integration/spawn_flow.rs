//! Integration tests for the batch spawn flow
//!
//! Covers unit expansion, partial failure, the branch conflict race and the
//! bounded wait for new sessions to appear in the cache.

use std::sync::Arc;
use std::time::Duration;

use super::common::fixtures::{existing_workspace, ClientPage, SETTLE};
use schmux::daemon::mock::MockDaemon;
use schmux::draft::DraftKey;
use schmux::error::SpawnError;
use schmux::model::{BranchConflict, SpawnRequest, TargetCounts};
use schmux::spawn::{ConflictState, Navigation, SpawnCoordinator};
use schmux::SessionCache;

/// Spawning into an empty registry creates one workspace with one session
#[tokio::test]
async fn test_spawn_into_empty_registry() {
    let daemon = Arc::new(MockDaemon::new());
    let page = ClientPage::new(&daemon);

    let outcome = page
        .coordinator
        .spawn(
            SpawnRequest::fresh("r", "main")
                .with_target("claude", 1)
                .with_prompt("fix bug"),
        )
        .await
        .expect("spawn should succeed");

    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert!(result.session_id.is_some(), "Expected a new session id");
    assert!(result.error.is_none());

    let snapshot = page.cache.snapshot();
    let ws = snapshot
        .workspace_for("r", "main")
        .expect("Workspace for r/main should be cached");
    assert_eq!(ws.session_count, 1);
    assert!(snapshot.contains_session(result.session_id.as_deref().unwrap()));
}

/// One failed unit never aborts its siblings and is reported in place
#[tokio::test]
async fn test_partial_failure_reports_every_unit() {
    let daemon = Arc::new(MockDaemon::new().failing_target("B"));
    let page = ClientPage::new(&daemon);

    let outcome = page
        .coordinator
        .spawn(
            SpawnRequest::fresh("r", "main")
                .with_target("A", 2)
                .with_target("B", 1),
        )
        .await
        .expect("a per-unit failure is not a request failure");

    let targets: Vec<&str> = outcome.results.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(targets, vec!["A", "A", "B"]);
    assert_eq!(outcome.succeeded().count(), 2);
    let failed: Vec<_> = outcome.failed().collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().is_some_and(|e| !e.is_empty()));

    // Retry payload covers only what failed
    assert_eq!(outcome.failed_targets(), TargetCounts::new().with("B", 1));
    assert_eq!(daemon.spawn_requests().len(), 1);
}

/// Two forms pass the conflict check, the first to submit wins, the second
/// gets a typed conflict pointing at the winner
#[tokio::test(start_paused = true)]
async fn test_branch_conflict_race_between_clients() {
    let daemon = Arc::new(MockDaemon::new());
    let first_page = ClientPage::new(&daemon);
    let second_page = ClientPage::new(&daemon);

    let mut first = first_page.form(DraftKey::Fresh);
    let mut second = second_page.form(DraftKey::Fresh);
    for form in [&mut first, &mut second] {
        form.hydrate();
        form.edit(|d| {
            d.repo = "r".into();
            d.branch = "feature/x".into();
            d.target_counts = TargetCounts::new().with("claude", 1);
        });
    }
    tokio::time::sleep(SETTLE).await;
    assert_eq!(first.conflict_state(), ConflictState::Clear);
    assert_eq!(second.conflict_state(), ConflictState::Clear);

    let won = first.submit().await.expect("first submit wins");
    let winner = won.results[0]
        .workspace_id
        .clone()
        .expect("winner reports its workspace");

    let err = second.submit().await.expect_err("second submit loses the race");
    match err {
        SpawnError::BranchConflict(conflict) => assert_eq!(
            conflict,
            BranchConflict {
                conflict: true,
                workspace_id: Some(winner.clone()),
            }
        ),
        other => panic!("Expected a branch conflict, got {other:?}"),
    }
    assert_eq!(
        second.conflict_state(),
        ConflictState::Conflict {
            workspace_id: Some(winner)
        }
    );
    // The loser keeps its draft for another attempt
    assert_eq!(second.draft().branch, "feature/x");
}

/// Navigation to a single new session waits until the cache shows it
#[tokio::test(start_paused = true)]
async fn test_post_spawn_wait_tracks_publication() {
    let daemon = Arc::new(
        MockDaemon::new()
            .with_workspace(existing_workspace("ws-a", "r", "main"))
            .with_publish_lag(3),
    );
    let cache = Arc::new(SessionCache::new(daemon.clone()));
    let _poller = cache.spawn_poller(Duration::from_millis(200));
    let coordinator = SpawnCoordinator::new(cache.clone(), Duration::from_secs(5));

    let outcome = coordinator
        .spawn(SpawnRequest::into_workspace("ws-a").with_target("claude", 1))
        .await
        .expect("spawn should succeed");
    let session_id = outcome.session_ids().pop().expect("one new session");

    assert_eq!(outcome.navigation, Navigation::Session(session_id.clone()));
    assert!(cache.snapshot().contains_session(&session_id));
}

/// Several units into an existing workspace navigate to the workspace
#[tokio::test(start_paused = true)]
async fn test_multi_unit_spawn_navigates_to_workspace() {
    let daemon = Arc::new(MockDaemon::new().with_workspace(existing_workspace("ws-a", "r", "main")));
    let page = ClientPage::new(&daemon);

    let outcome = page
        .coordinator
        .spawn(
            SpawnRequest::into_workspace("ws-a")
                .with_target("claude", 1)
                .with_target("codex", 1),
        )
        .await
        .expect("spawn should succeed");

    assert_eq!(outcome.navigation, Navigation::Workspace("ws-a".into()));
    assert_eq!(page.cache.snapshot().session_count(), 2);
}

/// A session that never shows up leaves the client on the results view
#[tokio::test(start_paused = true)]
async fn test_post_spawn_wait_gives_up() {
    let daemon = Arc::new(
        MockDaemon::new()
            .with_workspace(existing_workspace("ws-a", "r", "main"))
            .with_publish_lag(1_000),
    );
    let cache = Arc::new(SessionCache::new(daemon.clone()));
    let _poller = cache.spawn_poller(Duration::from_millis(200));
    let coordinator = SpawnCoordinator::new(cache.clone(), Duration::from_secs(1));

    let outcome = coordinator
        .spawn(SpawnRequest::into_workspace("ws-a").with_target("claude", 1))
        .await
        .expect("spawn should succeed");

    assert!(outcome.all_succeeded());
    assert_eq!(outcome.navigation, Navigation::Stay);
}

/// A failed unit into an existing workspace skips the wait entirely
#[tokio::test(start_paused = true)]
async fn test_partial_failure_does_not_navigate() {
    let daemon = Arc::new(
        MockDaemon::new()
            .with_workspace(existing_workspace("ws-a", "r", "main"))
            .failing_target("codex"),
    );
    let page = ClientPage::new(&daemon);

    let outcome = page
        .coordinator
        .spawn(
            SpawnRequest::into_workspace("ws-a")
                .with_target("claude", 1)
                .with_target("codex", 1),
        )
        .await
        .expect("spawn should succeed");

    assert!(outcome.any_succeeded());
    assert_eq!(outcome.navigation, Navigation::Stay);
}
