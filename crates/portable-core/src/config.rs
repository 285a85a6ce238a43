//! Centralized configuration for the portable launcher.
//!
//! Constants for network operations, installation, and the default
//! n8n environment table live here so the rest of the codebase never
//! hard-codes a timeout or directory name inline.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "n8n-portable";
    /// Repository queried for release metadata during upgrades.
    pub const GITHUB_REPO: &'static str = "n8n-io/n8n";
    /// npm package installed into the library prefix.
    pub const PACKAGE_NAME: &'static str = "n8n";
    /// Default Node.js runtime version bundled by the launcher.
    pub const RUNTIME_VERSION: &'static str = "22.19.0";
    /// Default port n8n listens on; used by the port stop strategy.
    pub const DEFAULT_PORT: u16 = 5678;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DOWNLOAD_RETRIES: u32 = 3;
    /// Delay between retry attempts grows linearly: `attempt * BACKOFF_STEP`.
    pub const BACKOFF_STEP: Duration = Duration::from_millis(1000);
    /// Progress is reported at most this often while streaming.
    pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    /// Hard cap on followed redirects per request.
    pub const MAX_REDIRECTS: usize = 10;
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const USER_AGENT: &'static str = "n8n-portable/0.3";
}

/// Installation and process-control configuration.
pub struct InstallConfig;

impl InstallConfig {
    /// npm installs can legitimately take minutes on a cold cache.
    pub const NPM_INSTALL_TIMEOUT: Duration = Duration::from_secs(900);
    pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    /// Window granted to a process after SIGTERM before SIGKILL.
    pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);
    /// Post-stop confirmation wait.
    pub const STOP_CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);
    /// Polling interval for wait_for loops.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const NPM_CACHE_DIR_NAME: &'static str = "npm-cache";
    pub const LOCK_FILE_NAME: &'static str = "launcher.lock";
}

/// Data subdirectories created before the server starts.
pub const DATA_SUBDIRS: [&str; 3] = ["database", "logs", "binary-data"];

/// Default environment for a fresh installation.
///
/// File-supplied configuration overrides these; they are merged
/// beneath whatever `config/.env` provides.
pub fn default_environment() -> Vec<(&'static str, &'static str)> {
    vec![
        ("N8N_HOST", "localhost"),
        ("N8N_PORT", "5678"),
        ("N8N_PROTOCOL", "http"),
        ("N8N_USER_FOLDER", "./data"),
        ("DB_TYPE", "sqlite"),
        ("DB_SQLITE_DATABASE", "./data/database/n8n.sqlite"),
        ("N8N_SECURE_COOKIE", "false"),
        ("N8N_ENCRYPTION_KEY", "portable-n8n-key-change-this"),
        ("N8N_LOG_LEVEL", "info"),
        ("N8N_LOG_OUTPUT", "file"),
        ("N8N_LOG_FILE_LOCATION", "./data/logs"),
        ("N8N_DISABLE_UI", "false"),
        ("N8N_SKIP_ASSETS_CACHE", "true"),
        ("N8N_DEFAULT_BINARY_DATA_MODE", "filesystem"),
        ("N8N_BINARY_DATA_STORAGE_PATH", "./data/binary-data"),
    ]
}
