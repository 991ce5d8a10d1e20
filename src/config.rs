//! Configuration module for the vault indexing and automation core.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.weave/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `WEAVE_` and use double underscores
//! to separate nested levels:
//! - `WEAVE_AUTO_COMMIT__DEBOUNCE_SECS=60` sets `auto_commit.debounce_secs`
//! - `WEAVE_SUMMARIZER__PROVIDER=openai` sets `summarizer.provider`
//! - `WEAVE_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-vault configuration directory.
pub const CONFIG_DIR: &str = ".weave";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Root of the document vault (where `.weave` is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_root: Option<PathBuf>,

    /// Directory holding the persisted index and commit state
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub workflows: WorkflowsConfig,

    #[serde(default)]
    pub auto_commit: AutoCommitConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

/// Logging levels: `default` applies globally, `modules` overrides per target.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// File extensions treated as vault documents
    #[serde(default = "default_extensions")]
    pub include_extensions: Vec<String>,

    /// Glob patterns excluded from scans and events
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// How often a dirty index is written to disk
    #[serde(default = "default_persist_interval")]
    pub persist_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period before a modified file is reported
    #[serde(default = "default_watch_debounce_ms")]
    pub debounce_ms: u64,

    /// Capacity of the ordered event queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowsConfig {
    /// Number of executions retained in memory
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Optional append-only JSONL log of finished executions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_log: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AutoCommitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after the last change before a batch is committed
    #[serde(default = "default_commit_debounce_secs")]
    pub debounce_secs: u64,

    /// Upper bound for the summary request
    #[serde(default = "default_summarize_timeout_secs")]
    pub summarize_timeout_secs: u64,

    /// Attempts after the first failed version-control write
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Only changes matching this glob are committed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_filter: Option<String>,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SummarizerConfig {
    /// `disabled` or `openai` (any OpenAI-compatible chat endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Paths beyond this count are summarized as "and N more"
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".weave/index")
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git/**".to_string(),
        ".weave/**".to_string(),
        ".obsidian/**".to_string(),
        "node_modules/**".to_string(),
    ]
}
fn default_persist_interval() -> u64 {
    30
}
fn default_watch_debounce_ms() -> u64 {
    500
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_history_capacity() -> usize {
    500
}
fn default_commit_debounce_secs() -> u64 {
    300
}
fn default_summarize_timeout_secs() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_author_name() -> String {
    "weave".to_string()
}
fn default_author_email() -> String {
    "weave@localhost".to_string()
}
fn default_provider() -> String {
    "disabled".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_paths() -> usize {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            vault_root: None,
            index_path: default_index_path(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            watcher: WatcherConfig::default(),
            workflows: WorkflowsConfig::default(),
            auto_commit: AutoCommitConfig::default(),
            summarizer: SummarizerConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            include_extensions: default_extensions(),
            ignore_patterns: default_ignore_patterns(),
            persist_interval_secs: default_persist_interval(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_watch_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            execution_log: None,
        }
    }
}

impl Default for AutoCommitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_secs: default_commit_debounce_secs(),
            summarize_timeout_secs: default_summarize_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            path_filter: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_paths: default_max_paths(),
        }
    }
}

impl AutoCommitConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn summarize_timeout(&self) -> Duration {
        Duration::from_secs(self.summarize_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_vault_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.vault_root.is_none() {
                    settings.vault_root = Self::detect_vault_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed("WEAVE_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Check settings for values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.auto_commit.debounce_secs == 0 {
            return Err("auto_commit.debounce_secs must be > 0".to_string());
        }
        if self.workflows.history_capacity == 0 {
            return Err("workflows.history_capacity must be > 0".to_string());
        }
        if self.watcher.queue_capacity == 0 {
            return Err("watcher.queue_capacity must be > 0".to_string());
        }
        match self.summarizer.provider.as_str() {
            "disabled" | "openai" => {}
            other => {
                return Err(format!(
                    "Unknown summarizer provider: '{other}'. Must be disabled or openai."
                ));
            }
        }
        if let Some(pattern) = &self.auto_commit.path_filter {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(format!("auto_commit.path_filter '{pattern}' is invalid: {e}"));
            }
        }
        Ok(())
    }

    /// Vault root, falling back to the current directory.
    pub fn vault_root(&self) -> PathBuf {
        self.vault_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Index directory resolved against the vault root.
    pub fn resolved_index_path(&self) -> PathBuf {
        if self.index_path.is_absolute() {
            self.index_path.clone()
        } else {
            self.vault_root().join(&self.index_path)
        }
    }

    /// Execution log path resolved against the vault root.
    pub fn resolved_execution_log(&self) -> Option<PathBuf> {
        self.workflows.execution_log.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.vault_root().join(p)
            }
        })
    }

    /// Find `.weave/settings.toml` searching from the current directory upwards
    fn find_vault_config() -> Option<PathBuf> {
        Self::detect_vault_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Directory containing `.weave`, searching upwards from the current directory
    pub fn detect_vault_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `vault_root/.weave`
    pub fn init_config_file(
        vault_root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = vault_root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            vault_root: Some(vault_root.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Ok(config_path)
    }
}
