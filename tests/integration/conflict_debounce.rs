//! Integration tests for debounced branch conflict checks

use std::sync::Arc;
use std::time::Duration;

use schmux::daemon::mock::MockDaemon;
use schmux::model::{BranchConflict, ScmMode};
use schmux::spawn::{ConflictChecker, ConflictInput, ConflictState};

fn checker(daemon: &Arc<MockDaemon>) -> ConflictChecker {
    ConflictChecker::new(daemon.clone(), Duration::from_millis(300))
}

fn input(branch: &str) -> ConflictInput {
    ConflictInput::new("r", branch, ScmMode::Worktree)
}

/// Typing "a" then "ab" inside the debounce window checks only "ab"
#[tokio::test(start_paused = true)]
async fn test_rapid_edits_issue_one_check() {
    let daemon = Arc::new(MockDaemon::new());
    let checker = checker(&daemon);

    checker.update(input("a"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    checker.update(input("ab"));
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(
        daemon.conflict_checks(),
        vec![("r".to_string(), "ab".to_string())]
    );
    assert_eq!(checker.state(), ConflictState::Clear);
}

/// A slow answer for an old branch never replaces the answer for the new one
#[tokio::test(start_paused = true)]
async fn test_stale_result_is_discarded() {
    let daemon = Arc::new(MockDaemon::new());
    daemon.set_conflict("r", "slow", BranchConflict::with_workspace("W"));
    daemon.set_check_delay("slow", Duration::from_secs(2));
    let checker = checker(&daemon);

    checker.update(input("slow"));
    // Past the debounce: the slow request is in flight
    tokio::time::sleep(Duration::from_millis(500)).await;
    checker.update(input("fast"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(checker.state(), ConflictState::Clear);
    assert!(checker.can_submit());
}

/// A conflicting branch reports the owning workspace and blocks submission
#[tokio::test(start_paused = true)]
async fn test_conflict_reports_owner() {
    let daemon = Arc::new(MockDaemon::new());
    daemon.set_conflict("r", "taken", BranchConflict::with_workspace("W"));
    let checker = checker(&daemon);
    let mut states = checker.subscribe();

    checker.update(input("taken"));
    let settled = states
        .wait_for(|s| !matches!(s, ConflictState::Pending | ConflictState::NotApplicable))
        .await
        .expect("checker alive")
        .clone();

    assert_eq!(
        settled,
        ConflictState::Conflict {
            workspace_id: Some("W".into())
        }
    );
    assert!(!checker.can_submit());
}

/// Git mode never checks: clones do not share branches
#[tokio::test(start_paused = true)]
async fn test_git_mode_is_not_applicable() {
    let daemon = Arc::new(MockDaemon::new());
    let checker = checker(&daemon);

    checker.update(ConflictInput::new("r", "main", ScmMode::Git));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(checker.state(), ConflictState::NotApplicable);
    assert!(daemon.conflict_checks().is_empty());
}
