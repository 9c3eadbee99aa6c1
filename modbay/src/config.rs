//! User configuration from `~/.modbay/config.ini`.
//!
//! Missing file means defaults; saving writes the full file back. CLI
//! arguments override these values when given.

use crate::release::Stability;
use crate::repository::Repository;
use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default download timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("failed to write config file: {0}")]
    WriteError(std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Parsed user configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Metadata cache directory; `None` means `~/.modbay/cache`.
    pub cache_dir: Option<PathBuf>,
    /// Maximum pre-release level offered to the user.
    pub stability_tolerance: Stability,
    /// Per-request download timeout in seconds.
    pub download_timeout: u64,
    /// Extra repositories beyond the game's default list.
    pub extra_repositories: Vec<Repository>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile {
            cache_dir: None,
            stability_tolerance: Stability::Stable,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            extra_repositories: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (`~/.modbay/config.ini`).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path; missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::WriteError)?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(ConfigFileError::WriteError)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigFileError> {
        let mut config = ConfigFile::default();

        if let Some(general) = ini.section(Some("general")) {
            if let Some(dir) = general.get("cache_dir") {
                config.cache_dir = Some(PathBuf::from(dir));
            }
            if let Some(level) = general.get("stability_tolerance") {
                config.stability_tolerance = match level.to_ascii_lowercase().as_str() {
                    "stable" => Stability::Stable,
                    "testing" => Stability::Testing,
                    "development" => Stability::Development,
                    other => {
                        return Err(ConfigFileError::InvalidValue {
                            section: "general".to_string(),
                            key: "stability_tolerance".to_string(),
                            value: other.to_string(),
                            reason: "expected stable, testing or development".to_string(),
                        })
                    }
                };
            }
            if let Some(timeout) = general.get("download_timeout") {
                config.download_timeout =
                    timeout
                        .parse()
                        .map_err(|_| ConfigFileError::InvalidValue {
                            section: "general".to_string(),
                            key: "download_timeout".to_string(),
                            value: timeout.to_string(),
                            reason: "expected a number of seconds".to_string(),
                        })?;
            }
        }

        if let Some(repos) = ini.section(Some("repositories")) {
            for (name, value) in repos.iter() {
                // "uri" or "uri priority"
                let (uri, priority) = match value.rsplit_once(' ') {
                    Some((uri, prio)) if prio.parse::<i32>().is_ok() => {
                        (uri.trim(), prio.parse::<i32>().unwrap())
                    }
                    _ => (value.trim(), 0),
                };
                config
                    .extra_repositories
                    .push(Repository::new(name, uri, priority));
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.set_to(
            Some("general"),
            "stability_tolerance".to_string(),
            self.stability_tolerance.to_string(),
        );
        ini.set_to(
            Some("general"),
            "download_timeout".to_string(),
            self.download_timeout.to_string(),
        );
        if let Some(dir) = &self.cache_dir {
            ini.set_to(
                Some("general"),
                "cache_dir".to_string(),
                dir.display().to_string(),
            );
        }
        for repo in &self.extra_repositories {
            ini.set_to(
                Some("repositories"),
                repo.name.clone(),
                format!("{} {}", repo.uri, repo.priority),
            );
        }
        ini
    }
}

/// Path to the config directory (`~/.modbay`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modbay")
}

/// Path to the config file (`~/.modbay/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default metadata cache directory (`~/.modbay/cache`).
pub fn default_cache_dir() -> PathBuf {
    config_directory().join("cache")
}
