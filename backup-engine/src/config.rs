//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`BACKUP_NAME`, `BACKUP_LOG__LEVEL`, ...).

use crate::fs::matcher::Matcher;
use crate::utils::errors::{BackupError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logical backup name, used as the archive file name prefix
    pub name: String,

    /// Directory holding archives and the index (default: the config file's directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<PathBuf>,

    /// Abort the whole run on the first discovery or write error
    #[serde(default)]
    pub stop_on_any_error: bool,

    /// Compression level (1-22 for zstd)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    #[serde(default)]
    pub log: LogConfig,

    /// Locations to back up
    pub roots: Vec<RootConfig>,

    /// Patterns excluded from every root
    #[serde(default)]
    pub exclude: ExcludeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// Root directory
    pub path: PathBuf,

    /// File name patterns (empty = every name)
    #[serde(default)]
    pub name_patterns: Vec<String>,

    /// Full path patterns (empty = every path)
    #[serde(default)]
    pub path_patterns: Vec<String>,

    /// Descend into subdirectories
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeConfig {
    #[serde(default)]
    pub name_patterns: Vec<String>,

    #[serde(default)]
    pub path_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_compression_level() -> i32 {
    3
}

fn default_recursive() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Minimal configuration writing archives of `name` into `target_dir`.
    pub fn new(name: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Config {
            name: name.into(),
            target_dir: Some(target_dir.into()),
            stop_on_any_error: false,
            compression_level: default_compression_level(),
            log: LogConfig::default(),
            roots: Vec::new(),
            exclude: ExcludeConfig::default(),
        }
    }

    /// Add a root location.
    pub fn with_root(mut self, root: RootConfig) -> Self {
        self.roots.push(root);
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("BACKUP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| BackupError::Config(format!("{}: {e}", path.display())))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| BackupError::Config(format!("{}: {e}", path.display())))?;

        if config.target_dir.is_none() {
            let absolute = path.canonicalize().at(path)?;
            config.target_dir = absolute.parent().map(Path::to_path_buf);
        }

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BackupError::Config(format!("serialize: {e}")))?;
        std::fs::write(path, content).at(path)
    }

    /// Reject configurations that cannot produce a usable archive name or
    /// contain patterns that do not compile.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BackupError::Config("name must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(BackupError::Config(format!(
                "name {:?} must not contain path separators",
                self.name
            )));
        }
        if self.roots.is_empty() {
            return Err(BackupError::Config("at least one root is required".into()));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(BackupError::Config(format!(
                "compression_level {} is outside 1-22",
                self.compression_level
            )));
        }
        for root in &self.roots {
            Matcher::for_root(root, &self.exclude)?;
        }
        Ok(())
    }

    /// Directory that receives archives and the index side-file.
    pub fn target_dir(&self) -> &Path {
        self.target_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }
}

impl RootConfig {
    /// Recursive root matching every file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name_patterns: Vec::new(),
            path_patterns: Vec::new(),
            recursive: true,
        }
    }
}
