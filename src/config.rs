//! Configuration loading for Accrual.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.accrual/config.toml`)
//! 3. User config (`~/.accrual/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. With no config at all, the store lives at
//! `.accrual/accepted-breaks.toml` under the project root.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AccrualError, FailOpen, Result};
use crate::store::{FileFormat, PerProjectFile, MAX_FILE_SIZE};

/// Name of the per-project and per-user configuration directory.
pub const CONFIG_DIR: &str = ".accrual";

/// Valid values for the store format field.
pub const VALID_FORMATS: &[&str] = &["auto", "toml", "json"];

/// Main configuration struct for Accrual.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where and how the accumulated items are persisted.
    pub store: StoreConfig,
}

/// Store file configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file path. Relative paths resolve against the project root.
    pub path: String,
    /// Encoding: "auto" (by extension), "toml" or "json".
    pub format: String,
    /// Largest store file that will be loaded, in bytes.
    pub max_file_size: u64,
}

impl StoreConfig {
    /// Check if a format value is valid.
    pub fn is_valid_format(value: &str) -> bool {
        VALID_FORMATS.contains(&value)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: format!("{}/accepted-breaks.toml", CONFIG_DIR),
            format: "auto".to_string(),
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain, using the current
    /// directory as the project root.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(err) => {
                tracing::warn!("current directory unavailable ({}), skipping project config", err);
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific project root.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.accrual/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = accrual_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    /// Load project config from `.accrual/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_optional(&cwd.join(CONFIG_DIR).join("config.toml"))
    }

    /// A missing file is silently skipped; a broken one is skipped with a warning.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_with(&format!("ignoring {}", path.display()), None)
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| AccrualError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| AccrualError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // ACCRUAL_STORE_PATH
        if let Ok(val) = env::var("ACCRUAL_STORE_PATH") {
            if val.trim().is_empty() {
                tracing::warn!(
                    "ACCRUAL_STORE_PATH is empty, using '{}'",
                    self.store.path
                );
            } else {
                self.store.path = val;
            }
        }

        // ACCRUAL_STORE_FORMAT
        if let Ok(val) = env::var("ACCRUAL_STORE_FORMAT") {
            if StoreConfig::is_valid_format(&val) {
                self.store.format = val;
            } else {
                tracing::warn!(
                    "Invalid ACCRUAL_STORE_FORMAT value '{}'. Valid values: {:?}. Using '{}'.",
                    val,
                    VALID_FORMATS,
                    self.store.format
                );
            }
        }

        // ACCRUAL_MAX_FILE_SIZE
        if let Ok(val) = env::var("ACCRUAL_MAX_FILE_SIZE") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => self.store.max_file_size = n,
                _ => tracing::warn!(
                    "Invalid ACCRUAL_MAX_FILE_SIZE value '{}'. \
                    Expected a positive integer. Using '{}'.",
                    val,
                    self.store.max_file_size
                ),
            }
        }
    }

    /// Merge another config into this one, field by field.
    ///
    /// Fields of `other` that differ from the defaults win. A layer therefore
    /// cannot reset a value back to its default once a lower layer changed it.
    fn merge(mut self, other: Config) -> Self {
        let defaults = StoreConfig::default();

        if other.store.path != defaults.path {
            self.store.path = other.store.path;
        }
        if other.store.format != defaults.format {
            if StoreConfig::is_valid_format(&other.store.format) {
                self.store.format = other.store.format;
            } else {
                tracing::warn!(
                    "Invalid store format '{}' in config. Valid values: {:?}.",
                    other.store.format,
                    VALID_FORMATS
                );
            }
        }
        if other.store.max_file_size != defaults.max_file_size {
            self.store.max_file_size = other.store.max_file_size;
        }

        self
    }

    /// Save configuration to the project config file.
    ///
    /// Writes to `.accrual/config.toml` in the given directory, creating the
    /// directory if needed.
    pub fn save_project(&self, cwd: &Path) -> Result<()> {
        let config_dir = cwd.join(CONFIG_DIR);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| AccrualError::storage(&config_dir, e))?;
        }

        let config_path = config_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| AccrualError::config(e.to_string()))?;

        // Atomic write: write to temp file, then rename
        let temp_path = config_dir.join(".config.toml.tmp");
        fs::write(&temp_path, &content).map_err(|e| AccrualError::storage(&temp_path, e))?;
        fs::rename(&temp_path, &config_path)
            .map_err(|e| AccrualError::storage(&config_path, e))?;

        Ok(())
    }

    /// Resolve the configured store path against `project_root`.
    pub fn store_path(&self, project_root: &Path) -> PathBuf {
        let path = PathBuf::from(&self.store.path);
        if path.is_absolute() {
            path
        } else {
            project_root.join(path)
        }
    }

    /// Open the configured store for `project_root`.
    pub fn store_file(&self, project_root: &Path) -> PerProjectFile {
        let file = PerProjectFile::new(self.store_path(project_root))
            .with_max_file_size(self.store.max_file_size);

        match FileFormat::parse(&self.store.format) {
            Some(format) => file.with_format(format),
            None => file,
        }
    }
}

/// Get the user-level Accrual directory.
///
/// `$ACCRUAL_HOME` wins when it is set and non-empty; otherwise
/// `~/.accrual`. Returns `None` when no home directory can be found.
pub fn accrual_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("ACCRUAL_HOME") {
        if home.is_empty() {
            tracing::warn!("ACCRUAL_HOME is empty, using default");
        } else {
            return Some(PathBuf::from(home));
        }
    }

    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}
