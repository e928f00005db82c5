use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use schmux::draft::SharedStore;
use schmux::model::DaemonConfig;
use schmux::{
    util, ClientConfig, ConflictState, DaemonApi, DraftKey, DraftStore, FileStore, HttpDaemon,
    Navigation, Preferences, SessionCache, SessionLookup, SpawnController, SpawnCoordinator,
    SpawnError, SpawnMode, TargetCounts, TerminalOptions, TerminalStatus, TerminalTransport,
    TerminalView, WsConnector,
};

#[derive(Parser)]
#[command(name = "schmux-client")]
#[command(about = "Drive a schmux daemon from the command line", long_about = None)]
struct Cli {
    /// Daemon URL (overrides client.toml)
    #[arg(long, global = true)]
    daemon_url: Option<String>,

    /// Data directory (defaults to ~/.schmux)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List workspaces and their sessions
    Status,
    /// Spawn one or more sessions
    Spawn {
        /// Repository name or URL (defaults to the last one used)
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        /// Run targets as name=count pairs, e.g. "claude=2,codex"
        #[arg(long, short)]
        targets: Option<TargetCounts>,
        /// Run a single command target instead of prompting agents
        #[arg(long, conflicts_with = "targets")]
        command: Option<String>,
        #[arg(long, short)]
        prompt: Option<String>,
        #[arg(long)]
        nickname: Option<String>,
        /// Add sessions to an existing workspace
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Stream a session's terminal; stdin lines are sent as input
    Attach { session_id: String },
    /// Check whether a branch is already checked out by a workspace
    CheckBranch { repo: String, branch: String },
    /// Ask the daemon for a branch name for a prompt
    SuggestBranch { prompt: String },
    /// Dispose of a session
    Dispose { session_id: String },
    /// Rename a session
    Nickname { session_id: String, nickname: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.schmux/logs/schmux-client.log)
    fs::create_dir_all(util::logs_dir())?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let mut config = ClientConfig::load();
    if let Some(url) = cli.daemon_url {
        config = config.with_daemon_url(url);
    }

    let daemon = HttpDaemon::new(config.daemon_url.clone())
        .with_context(|| format!("Invalid daemon URL {}", config.daemon_url))?;
    let api: Arc<dyn DaemonApi> = Arc::new(daemon.clone());
    let cache = Arc::new(SessionCache::new(api.clone()));

    match cli.command {
        Commands::Status => status(&cache).await,
        Commands::Spawn {
            repo,
            branch,
            targets,
            command,
            prompt,
            nickname,
            workspace,
        } => {
            let args = SpawnArgs {
                repo,
                branch,
                targets,
                command,
                prompt,
                nickname,
                workspace,
            };
            spawn(&config, cache, args).await
        }
        Commands::Attach { session_id } => attach(&config, daemon, cache, &session_id).await,
        Commands::CheckBranch { repo, branch } => {
            let result = api.check_branch_conflict(&repo, &branch).await?;
            match result.workspace_id.filter(|_| result.conflict) {
                Some(id) => println!("{} is in use by workspace {}", branch, id),
                None if result.conflict => println!("{} is in use", branch),
                None => println!("{} is free", branch),
            }
            Ok(())
        }
        Commands::SuggestBranch { prompt } => {
            let coordinator = SpawnCoordinator::new(cache, config.post_spawn_wait);
            let suggestion = coordinator.suggest_branch(&prompt).await;
            println!("branch:   {}", suggestion.branch);
            println!("nickname: {}", suggestion.nickname);
            Ok(())
        }
        Commands::Dispose { session_id } => {
            cache
                .dispose_session(&session_id)
                .await
                .with_context(|| format!("Failed to dispose {}", session_id))?;
            println!("Disposed {}", session_id);
            Ok(())
        }
        Commands::Nickname {
            session_id,
            nickname,
        } => {
            cache
                .update_nickname(&session_id, &nickname)
                .await
                .with_context(|| format!("Failed to rename {}", session_id))?;
            println!("Renamed {} to {}", session_id, nickname);
            Ok(())
        }
    }
}

async fn status(cache: &SessionCache) -> Result<()> {
    cache.refresh(true).await.context("Failed to list sessions")?;
    let snapshot = cache.snapshot();
    if snapshot.workspaces.is_empty() {
        println!("No workspaces");
        return Ok(());
    }
    for ws in snapshot.workspaces.iter() {
        println!(
            "{}  {} @ {}  ({} sessions, {} running)",
            ws.id,
            ws.repo,
            ws.branch,
            ws.session_count,
            ws.running_count()
        );
        for session in &ws.sessions {
            let state = if session.running { "running" } else { "stopped" };
            println!("  {}  {}  [{}]  {}", session.id, session.display_name(), session.target, state);
        }
    }
    Ok(())
}

struct SpawnArgs {
    repo: Option<String>,
    branch: Option<String>,
    targets: Option<TargetCounts>,
    command: Option<String>,
    prompt: Option<String>,
    nickname: Option<String>,
    workspace: Option<String>,
}

async fn spawn(config: &ClientConfig, cache: Arc<SessionCache>, args: SpawnArgs) -> Result<()> {
    let daemon_config = match cache.api().get_config().await {
        Ok(daemon_config) => daemon_config,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read daemon config, assuming worktrees");
            DaemonConfig::default()
        }
    };
    let scm = daemon_config.source_code_management;
    let _poller = cache.spawn_poller(config.poll_interval_for(&daemon_config));

    let drafts: SharedStore = Arc::new(FileStore::new(util::drafts_path()));
    let preferences: SharedStore = Arc::new(FileStore::new(util::preferences_path()));
    let coordinator = Arc::new(SpawnCoordinator::new(cache, config.post_spawn_wait));
    let mut controller = SpawnController::new(
        DraftKey::for_workspace(args.workspace.as_deref()),
        Arc::new(DraftStore::new(drafts)),
        Arc::new(Preferences::new(preferences)),
        coordinator,
        scm,
        config.conflict_debounce,
    );

    controller.hydrate();
    controller.edit(|draft| {
        if let Some(repo) = args.repo {
            draft.repo = repo;
        }
        if let Some(branch) = args.branch {
            draft.branch = branch;
        }
        if let Some(prompt) = args.prompt {
            draft.prompt = prompt;
        }
        if let Some(nickname) = args.nickname {
            draft.nickname = nickname;
        }
        if let Some(targets) = args.targets {
            draft.target_counts = targets;
        }
        match args.command {
            Some(command) => {
                draft.spawn_mode = SpawnMode::Command;
                draft.selected_command = command;
            }
            None => draft.spawn_mode = SpawnMode::Promptable,
        }
    });

    if controller.key() == &DraftKey::Fresh && controller.draft().branch.trim().is_empty() {
        let suggestion = controller.suggest_branch().await;
        println!("Using branch {}", suggestion.branch);
    }

    let mut conflicts = controller.subscribe_conflicts();
    let settle = config.conflict_debounce + Duration::from_secs(10);
    let _ = tokio::time::timeout(settle, conflicts.wait_for(|s| *s != ConflictState::Pending)).await;

    let outcome = match controller.submit().await {
        Ok(outcome) => outcome,
        Err(SpawnError::BranchConflict(conflict)) => {
            bail!(
                "Branch {} is already in use by workspace {}",
                controller.draft().branch,
                conflict.workspace_id.as_deref().unwrap_or("<unknown>")
            );
        }
        Err(e) => return Err(e.into()),
    };

    for result in &outcome.results {
        match (&result.session_id, &result.error) {
            (Some(id), None) => println!("started  {}  {}", result.target, id),
            (_, Some(error)) => println!("failed   {}  {}", result.target, error),
            (None, None) => println!("unknown  {}", result.target),
        }
    }
    match &outcome.navigation {
        Navigation::Session(id) => println!("Attach with: schmux-client attach {}", id),
        Navigation::Workspace(id) => println!("Sessions ready in workspace {}", id),
        Navigation::Stay => {}
    }
    if !outcome.any_succeeded() {
        bail!("No sessions were started");
    }
    if !outcome.all_succeeded() {
        let retry: Vec<String> = outcome
            .failed_targets()
            .iter()
            .map(|(name, count)| format!("{}={}", name, count))
            .collect();
        println!("Retry failed units with: --targets {}", retry.join(","));
    }
    Ok(())
}

/// Writes terminal output straight to stdout.
struct StdoutView;

impl TerminalView for StdoutView {
    fn resize(&mut self, _cols: u16, _rows: u16) {}

    fn render(&mut self, data: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(data);
        let _ = stdout.flush();
    }

    fn scroll_to_bottom(&mut self) {}

    fn status_changed(&mut self, status: TerminalStatus) {
        if status != TerminalStatus::Connected {
            eprintln!("[{}]", status);
        }
    }
}

async fn attach(
    config: &ClientConfig,
    daemon: HttpDaemon,
    cache: Arc<SessionCache>,
    session_id: &str,
) -> Result<()> {
    if let Err(e) = cache.refresh(true).await {
        tracing::warn!(error = %e, "Initial session listing failed");
    }
    let lookup = cache
        .resolve_session(session_id, config.missing_session_grace)
        .await;
    if lookup == SessionLookup::Missing {
        bail!("Session {} not found", session_id);
    }

    let daemon_config = cache.api().get_config().await.unwrap_or_default();
    let options = TerminalOptions::new(&daemon_config.terminal, config.reconnect);
    let _poller = cache.spawn_poller(config.poll_interval_for(&daemon_config));
    let mut sessions = cache.subscribe();
    let transport = TerminalTransport::open(
        session_id,
        options,
        cache.api().clone(),
        Arc::new(WsConnector::new(daemon)),
        Box::new(StdoutView),
    );

    let mut status = transport.subscribe_status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = status.wait_for(|s| s.is_final()) => {
                let reason = transport
                    .last_error()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "terminal closed".to_string());
                break Err(anyhow::anyhow!(reason));
            }
            _ = sessions.wait_for(|snapshot| snapshot.loaded && !snapshot.contains_session(session_id)) => {
                eprintln!("Session {} is gone", session_id);
                break Ok(());
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = transport.send_input(format!("{}\r", line).as_bytes()) {
                        tracing::warn!(error = %e, "Failed to send input");
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
        }
    };

    transport.dispose();
    result
}
