//! Configuration file handling for `~/.gatorconfig.json`.
//!
//! The file names the database and remembers which user is logged in.
//! Unlike most settings files it is required: `db_url` has no sensible
//! default, so a missing file is an error.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name of the config inside the home directory.
pub const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found at {}; create it with a \"db_url\" entry", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid JSON in config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("HOME environment variable not set")]
    HomeNotSet,
}

// ============================================================================
// Configuration Struct
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite location: a `sqlite:` URL, a file path, or `:memory:`.
    pub db_url: String,

    /// User that commands act on; set by `register` and `login`.
    #[serde(default)]
    pub current_user_name: Option<String>,

    /// Upper bound for one feed request in `agg`.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            current_user_name: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }

    /// `$HOME/.gatorconfig.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::HomeNotSet)?;
        Ok(PathBuf::from(home).join(CONFIG_FILE_NAME))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Load configuration from a JSON file.
    ///
    /// - Missing file → `Err(ConfigError::NotFound)`
    /// - Larger than 1 MB → `Err(ConfigError::TooLarge)`
    /// - Invalid JSON or missing `db_url` → `Err(ConfigError::Parse)`
    /// - Empty `db_url` or zero timeout → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            // Deleted between metadata and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_url.trim().is_empty() {
            return Err(ConfigError::Invalid("db_url must not be empty".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Make `name` the current user and persist the change to `path`.
    pub fn set_user(&mut self, name: &str, path: &Path) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.save(path)
    }

    /// Write the config to `path` via a temp file and rename, so a crash
    /// never leaves a half-written config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_vec_pretty(self)?;

        let suffix = uuid::Uuid::new_v4().simple();
        let temp_path = path.with_extension(format!("tmp.{suffix}"));

        let write_temp = || -> std::io::Result<()> {
            let mut temp_file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true) // Fails if the path exists (symlink race)
                .open(&temp_path)?;
            temp_file.write_all(&content)?;
            temp_file.write_all(b"\n")?;
            temp_file.sync_all()
        };

        if let Err(e) = write_temp().and_then(|()| std::fs::rename(&temp_path, path)) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
