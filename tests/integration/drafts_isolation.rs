//! Integration tests for spawn draft persistence
//!
//! Drafts are keyed per workspace, survive a page reload through the tab
//! store, and are cleared only by a spawn that started something.

use std::sync::Arc;

use super::common::fixtures::{existing_workspace, ClientPage, SETTLE};
use schmux::daemon::mock::MockDaemon;
use schmux::draft::{DraftKey, KeyValueStore, SpawnMode};
use schmux::model::TargetCounts;

/// Editing one workspace's draft never touches another's
#[tokio::test(start_paused = true)]
async fn test_drafts_do_not_bleed_between_workspaces() {
    let daemon = Arc::new(MockDaemon::new().with_workspace(existing_workspace("ws1", "r", "main")));
    let page = ClientPage::new(&daemon);

    let mut fresh = page.form(DraftKey::Fresh);
    let mut ws1 = page.form(DraftKey::Workspace("ws1".into()));
    fresh.hydrate();
    ws1.hydrate();

    fresh.edit(|d| d.prompt = "fresh prompt".into());
    ws1.edit(|d| {
        d.prompt = "ws1 prompt".into();
        d.spawn_mode = SpawnMode::Command;
        d.selected_command = "make test".into();
    });

    // A reload reads each key back on its own
    let reloaded = ClientPage::with_tab(&daemon, page.tab.clone());
    let mut fresh_again = reloaded.form(DraftKey::Fresh);
    let mut ws1_again = reloaded.form(DraftKey::Workspace("ws1".into()));
    assert_eq!(fresh_again.hydrate().prompt, "fresh prompt");
    let restored = ws1_again.hydrate().clone();
    assert_eq!(restored.prompt, "ws1 prompt");
    assert_eq!(restored.spawn_mode, SpawnMode::Command);
    assert_eq!(restored.selected_command, "make test");
    assert_eq!(fresh_again.draft().spawn_mode, SpawnMode::Promptable);
}

/// The stale empty state flushed right after hydration cannot erase a draft
#[tokio::test(start_paused = true)]
async fn test_hydration_gate_protects_stored_draft() {
    let daemon = Arc::new(MockDaemon::new());
    let page = ClientPage::new(&daemon);
    let mut form = page.form(DraftKey::Fresh);
    form.hydrate();
    form.edit(|d| d.prompt = "keep me".into());

    let reloaded = ClientPage::with_tab(&daemon, page.tab.clone());
    // Pre-hydration edits go nowhere
    let mut early = reloaded.form(DraftKey::Fresh);
    early.edit(|d| d.prompt = String::new());
    assert!(page.tab.get("spawn-draft-fresh").is_some());

    assert_eq!(early.hydrate().prompt, "keep me");
}

/// A successful spawn clears only its own key
#[tokio::test(start_paused = true)]
async fn test_success_clears_only_its_own_key() {
    let daemon = Arc::new(MockDaemon::new().with_workspace(existing_workspace("ws1", "r", "main")));
    let page = ClientPage::new(&daemon);

    let mut fresh = page.form(DraftKey::Fresh);
    fresh.hydrate();
    fresh.edit(|d| d.prompt = "not submitted".into());

    let mut ws1 = page.form(DraftKey::Workspace("ws1".into()));
    ws1.hydrate();
    ws1.edit(|d| {
        d.prompt = "submit me".into();
        d.target_counts = TargetCounts::new().with("claude", 1);
    });
    tokio::time::sleep(SETTLE).await;

    let outcome = ws1.submit().await.expect("spawn should succeed");
    assert!(outcome.all_succeeded());

    assert_eq!(page.tab.keys(), vec!["spawn-draft-fresh".to_string()]);
    assert!(ws1.draft().is_empty());
    assert_eq!(fresh.draft().prompt, "not submitted");
}
