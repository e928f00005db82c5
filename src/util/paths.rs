//! Path utilities for schmux client data directories

use std::path::PathBuf;
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Must be called early in main() before any other path functions are used.
/// If custom_path is None, uses the default ~/.schmux location.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    // Ignore error if already set (shouldn't happen in normal usage)
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

/// Get the default data directory path (~/.schmux)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".schmux"))
        .unwrap_or_else(|| PathBuf::from(".schmux"))
}

/// Get the base data directory.
/// Returns the custom path if set via init_data_dir(), otherwise ~/.schmux
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the logs directory (~/.schmux/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (~/.schmux/logs/schmux-client.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("schmux-client.log")
}

/// Get the client config file path (~/.schmux/client.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("client.toml")
}

/// Durable cross-session preferences (~/.schmux/client-preferences.json)
pub fn preferences_path() -> PathBuf {
    data_dir().join("client-preferences.json")
}

/// Drafts that survive a client restart (~/.schmux/client-drafts.json)
pub fn drafts_path() -> PathBuf {
    data_dir().join("client-drafts.json")
}
