//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use examda_core::config::{ClientConfig, DEFAULT_API_BASE_URL};
use examda_core::util::{is_http_url, normalize_text_option};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const API_URL_ENV: &str = "EXAMDA_API_URL";
pub const DB_PATH_ENV: &str = "EXAMDA_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("examda").join(CONFIG_FILE_NAME))
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("examda")
        .join("examda.db")
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        match default_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()
            .ok_or_else(|| "Failed to resolve CLI config directory".to_string())?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Apply `EXAMDA_API_URL` and `EXAMDA_DB_PATH` over the file values.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var_os(DB_PATH_ENV).map(PathBuf::from),
        )
    }

    #[must_use]
    pub fn with_overrides(mut self, api_base_url: Option<String>, db_path: Option<PathBuf>) -> Self {
        if let Some(url) = normalize_text_option(api_base_url) {
            self.api_base_url = Some(url);
        }
        if let Some(path) = db_path.filter(|path| !path.as_os_str().is_empty()) {
            self.db_path = Some(path);
        }
        self
    }

    /// `--db-path` first, then the configured path, then the data directory.
    pub fn resolve_db_path(&self, cli_db_path: Option<PathBuf>) -> PathBuf {
        cli_db_path
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(default_db_path)
    }

    pub fn api_base_url(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn client_config(&self) -> Result<ClientConfig, String> {
        let mut config = ClientConfig {
            api_base_url: self.api_base_url(),
            ..ClientConfig::default()
        };
        if let Some(secs) = self.sync_interval_secs {
            config.sync_interval_secs = secs;
        }
        config.normalized().map_err(|error| error.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.api_base_url.as_deref() {
            if !is_http_url(url) {
                return Err("api_base_url must include http:// or https://".to_string());
            }
        }
        if self.sync_interval_secs == Some(0) {
            return Err("sync_interval_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
    }
}
