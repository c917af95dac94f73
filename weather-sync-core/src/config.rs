use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{duration::parse_duration, provider::UnitSystem};

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SECRET_KEY: &str = "token";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Controller configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// endpoint = "https://api.openweathermap.org/data/2.5/weather"
/// units = "imperial"
/// timeout_secs = 10
/// default_refresh_period = "5m"
/// default_secret_key = "token"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider "current weather" endpoint.
    pub endpoint: String,

    /// Unit system requested from the provider, e.g. "imperial" or "metric".
    pub units: String,

    /// Upper bound for a single provider request.
    pub timeout_secs: u64,

    /// Requeue period used when a location does not declare one.
    pub default_refresh_period: String,

    /// Secret attribute holding the API token when `secretRef.key` is empty.
    pub default_secret_key: String,

    /// Optional manifest used by `weather-sync run` / `get` when no path is given.
    pub manifest: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            units: UnitSystem::Imperial.as_str().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_refresh_period: "5m".to_string(),
            default_secret_key: DEFAULT_SECRET_KEY.to_string(),
            manifest: None,
        }
    }
}

/// Validated, ready-to-use view of [`Config`] handed to the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub endpoint: String,
    pub units: UnitSystem,
    pub timeout: Duration,
    pub default_refresh_period: Duration,
    pub default_secret_key: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            units: UnitSystem::Imperial,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_refresh_period: DEFAULT_REFRESH_PERIOD,
            default_secret_key: DEFAULT_SECRET_KEY.to_string(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-sync", "weather-sync")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check every field and convert into [`ReconcilerSettings`].
    pub fn settings(&self) -> Result<ReconcilerSettings> {
        let units = UnitSystem::try_from(self.units.as_str())?;

        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }

        let default_refresh_period = parse_duration(&self.default_refresh_period)
            .with_context(|| {
                format!("Invalid default_refresh_period '{}'", self.default_refresh_period)
            })?;
        if default_refresh_period.is_zero() {
            return Err(anyhow!("default_refresh_period must be greater than zero"));
        }

        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(anyhow!("endpoint must not be empty"));
        }

        let default_secret_key = if self.default_secret_key.is_empty() {
            DEFAULT_SECRET_KEY.to_string()
        } else {
            self.default_secret_key.clone()
        };

        Ok(ReconcilerSettings {
            endpoint: endpoint.to_string(),
            units,
            timeout: Duration::from_secs(self.timeout_secs),
            default_refresh_period,
            default_secret_key,
        })
    }
}
