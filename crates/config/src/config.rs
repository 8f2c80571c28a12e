//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Watch-root related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    /// Directory whose direct subdirectories are delivery units
    pub root: Option<PathBuf>,
    /// Seconds to wait after a folder-creation event before processing it
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Capacity of the folder notification queue between watcher and worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_settle_secs() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: None,
            settle_secs: default_settle_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Encoder executable (path or name resolved through PATH)
    #[serde(default = "default_encoder")]
    pub encoder: PathBuf,
    /// Resolution-probing executable
    #[serde(default = "default_prober")]
    pub prober: PathBuf,
    /// Upper bound for a single encode in seconds (0 = no limit)
    #[serde(default = "default_encode_timeout_secs")]
    pub encode_timeout_secs: u64,
    /// Cadence of synthetic progress heartbeats in seconds
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_encoder() -> PathBuf {
    PathBuf::from("HandBrakeCLI")
}

fn default_prober() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_encode_timeout_secs() -> u64 {
    6 * 60 * 60
}

fn default_heartbeat_secs() -> u64 {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            encoder: default_encoder(),
            prober: default_prober(),
            encode_timeout_secs: default_encode_timeout_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

/// Filename matcher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatcherConfig {
    /// Also accept `.mpg` inputs
    #[serde(default)]
    pub accept_mpg: bool,
}

/// Persisted state configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    /// Directory holding queue.json, current.json, completed.json, errors.json
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
    /// Reset every collection on graceful shutdown (default true)
    #[serde(default = "default_clear_on_shutdown")]
    pub clear_on_shutdown: bool,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_clear_on_shutdown() -> bool {
    true
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            clear_on_shutdown: default_clear_on_shutdown(),
        }
    }
}

/// Read-only HTTP status endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_bind")]
    pub bind: String,
}

fn default_status_bind() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_status_bind(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Default filter directive, used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - DROPCODER_WATCH_ROOT -> watch.root
    /// - DROPCODER_SETTLE_SECS -> watch.settle_secs
    /// - DROPCODER_ENCODER -> tools.encoder
    /// - DROPCODER_PROBER -> tools.prober
    /// - DROPCODER_ENCODE_TIMEOUT_SECS -> tools.encode_timeout_secs
    /// - DROPCODER_STATE_DIR -> state.dir
    /// - DROPCODER_ACCEPT_MPG -> matcher.accept_mpg
    /// - DROPCODER_STATUS_ENABLED -> status.enabled
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("DROPCODER_WATCH_ROOT") {
            if !val.is_empty() {
                self.watch.root = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("DROPCODER_SETTLE_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.watch.settle_secs = secs;
            }
        }

        if let Ok(val) = env::var("DROPCODER_ENCODER") {
            if !val.is_empty() {
                self.tools.encoder = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("DROPCODER_PROBER") {
            if !val.is_empty() {
                self.tools.prober = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("DROPCODER_ENCODE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.tools.encode_timeout_secs = secs;
            }
        }

        if let Ok(val) = env::var("DROPCODER_STATE_DIR") {
            if !val.is_empty() {
                self.state.dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("DROPCODER_ACCEPT_MPG") {
            if let Some(flag) = parse_flag(&val) {
                self.matcher.accept_mpg = flag;
            }
        }

        if let Ok(val) = env::var("DROPCODER_STATUS_ENABLED") {
            if let Some(flag) = parse_flag(&val) {
                self.status.enabled = flag;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            let mut config = Self::default();
            config.apply_env_overrides();
            return Ok(config);
        }
        Self::load(path)
    }
}

// Accept "true", "1", "yes" as true; "false", "0", "no" as false
fn parse_flag(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
