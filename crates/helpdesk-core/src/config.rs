use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HELPDESK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Characters of a message body carried in `ticket_message_added` events.
    #[serde(default = "default_preview_chars")]
    pub message_preview_chars: usize,
    /// Newest entries scanned when building a requester's history view.
    #[serde(default = "default_user_history_limit")]
    pub user_history_limit: usize,
    /// Upper bound on the team roster loaded for auto-assignment.
    #[serde(default = "default_roster_limit")]
    pub auto_assign_roster_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_preview_chars: default_preview_chars(),
            user_history_limit: default_user_history_limit(),
            auto_assign_roster_limit: default_roster_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_page_limit")]
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// `compact` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: default_log_format(),
        }
    }
}

/// Engine-facing knobs derived from [`HelpdeskConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub message_preview_chars: usize,
    pub user_history_limit: usize,
    pub auto_assign_roster_limit: usize,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        HelpdeskConfig::default().engine_settings()
    }
}

impl HelpdeskConfig {
    #[must_use]
    pub const fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            message_preview_chars: self.engine.message_preview_chars,
            user_history_limit: self.engine.user_history_limit,
            auto_assign_roster_limit: self.engine.auto_assign_roster_limit,
            default_page_limit: self.pagination.default_limit,
            max_page_limit: self.pagination.max_limit,
        }
    }
}

/// Load a config file, falling back to defaults when it does not exist.
///
/// # Errors
///
/// Returns an error naming the path if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<HelpdeskConfig> {
    if !path.exists() {
        return Ok(HelpdeskConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<HelpdeskConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Pick the config path: CLI flag, then `HELPDESK_CONFIG`, then the user
/// config directory.
#[must_use]
pub fn resolve_config_path(
    cli_path: Option<&Path>,
    env_path: Option<String>,
    user_config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    user_config_dir.map(|dir| dir.join("helpdesk/config.toml"))
}

/// Resolve and load the effective configuration.
///
/// # Errors
///
/// Returns an error if the resolved file exists but cannot be read or parsed.
pub fn resolve_config(cli_path: Option<&Path>) -> Result<HelpdeskConfig> {
    let path = resolve_config_path(cli_path, env::var(CONFIG_ENV).ok(), dirs::config_dir());
    match path {
        Some(path) => load_config(&path),
        None => Ok(HelpdeskConfig::default()),
    }
}

const fn default_preview_chars() -> usize {
    120
}

const fn default_user_history_limit() -> usize {
    100
}

const fn default_roster_limit() -> usize {
    1000
}

const fn default_page_limit() -> usize {
    20
}

const fn default_max_page_limit() -> usize {
    100
}

fn default_db_path() -> PathBuf {
    PathBuf::from("helpdesk.sqlite3")
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_log_filter() -> String {
    "helpdesk=info,warn".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}
