use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::model::DaemonConfig;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("client.toml.example");

const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:7337";

/// Terminal reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial: Duration,
    /// Ceiling for the doubled delay
    pub max: Duration,
    /// Attempts before giving up (0 = never give up)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial
            .saturating_mul(1u32 << shift)
            .min(self.max)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt > self.max_attempts
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Root URL of the daemon
    pub daemon_url: String,
    /// Session list poll interval; `None` follows the daemon's advertised one
    pub poll_interval: Option<Duration>,
    /// Bounded wait for a spawned session to appear in the cache
    pub post_spawn_wait: Duration,
    /// How long "session not found" is treated as transient
    pub missing_session_grace: Duration,
    /// Settle time before a branch conflict check
    pub conflict_debounce: Duration,
    /// Terminal reconnect backoff
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_url: DEFAULT_DAEMON_URL.to_string(),
            poll_interval: None,
            post_spawn_wait: Duration::from_secs(5),
            missing_session_grace: Duration::from_secs(3),
            conflict_debounce: Duration::from_millis(300),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TomlReconnect {
    initial_ms: Option<u64>,
    max_ms: Option<u64>,
    max_attempts: Option<u32>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    daemon_url: Option<String>,
    poll_interval_ms: Option<u64>,
    post_spawn_wait_ms: Option<u64>,
    missing_session_grace_ms: Option<u64>,
    conflict_debounce_ms: Option<u64>,
    reconnect: Option<TomlReconnect>,
}

impl ClientConfig {
    /// Load configuration from the default path, merging with defaults
    pub fn load() -> Self {
        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific file. Missing or unparsable files
    /// yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = ClientConfig::default();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return config,
        };

        match toml::from_str::<TomlConfig>(&contents) {
            Ok(toml_config) => config.merge(toml_config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid client config");
            }
        }

        config
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(url) = toml_config.daemon_url.filter(|u| !u.trim().is_empty()) {
            self.daemon_url = url;
        }
        if let Some(ms) = toml_config.poll_interval_ms.filter(|ms| *ms > 0) {
            self.poll_interval = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = toml_config.post_spawn_wait_ms {
            self.post_spawn_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = toml_config.missing_session_grace_ms {
            self.missing_session_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = toml_config.conflict_debounce_ms {
            self.conflict_debounce = Duration::from_millis(ms);
        }

        // Load reconnect configuration
        if let Some(reconnect) = toml_config.reconnect {
            if let Some(ms) = reconnect.initial_ms.filter(|ms| *ms > 0) {
                self.reconnect.initial = Duration::from_millis(ms);
            }
            if let Some(ms) = reconnect.max_ms.filter(|ms| *ms > 0) {
                self.reconnect.max = Duration::from_millis(ms);
            }
            if let Some(attempts) = reconnect.max_attempts {
                self.reconnect.max_attempts = attempts;
            }
        }
        if self.reconnect.max < self.reconnect.initial {
            self.reconnect.max = self.reconnect.initial;
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &PathBuf) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    /// Poll interval to use against a daemon with `daemon` config.
    pub fn poll_interval_for(&self, daemon: &DaemonConfig) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| daemon.sessions_poll_interval())
    }

    pub fn with_daemon_url(mut self, url: impl Into<String>) -> Self {
        self.daemon_url = url.into();
        self
    }
}
