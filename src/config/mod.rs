//! Configuration system for sysgauge

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::history::HistorySettings;
use crate::integrations::system::ALL_INTERFACES;
use crate::metrics::FacadeSettings;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub sampling: SamplingConfig,
    pub history: HistoryConfig,
    pub network: NetworkConfig,
    pub disk: DiskConfig,
    pub folder: FolderConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sysgauge").join("config.toml"))
    }

    pub fn history_settings(&self) -> HistorySettings {
        HistorySettings {
            capacity: self.history.capacity,
            min_interval: chrono::Duration::seconds(self.history.min_interval_secs as i64),
            retention: chrono::Duration::minutes(self.history.retention_minutes as i64),
        }
    }

    pub fn facade_settings(&self) -> FacadeSettings {
        FacadeSettings {
            window: chrono::Duration::minutes(self.history.window_minutes as i64),
            disk_path: self.disk.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Where history files live; `None` uses the platform data directory.
    pub data_dir: Option<PathBuf>,
}

/// Allowed refresh cadences for background sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RefreshInterval {
    #[serde(rename = "5s")]
    FiveSeconds,
    #[serde(rename = "10s")]
    TenSeconds,
    #[default]
    #[serde(rename = "15s")]
    FifteenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
}

impl RefreshInterval {
    pub fn as_duration(self) -> Duration {
        let secs = match self {
            Self::FiveSeconds => 5,
            Self::TenSeconds => 10,
            Self::FifteenSeconds => 15,
            Self::ThirtySeconds => 30,
            Self::OneMinute => 60,
            Self::FiveMinutes => 5 * 60,
            Self::FifteenMinutes => 15 * 60,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval: RefreshInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub min_interval_secs: u64,
    pub window_minutes: u64,
    pub retention_minutes: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 90,
            min_interval_secs: 10,
            window_minutes: 15,
            retention_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface name, or "all" for every non-loopback interface.
    pub interface: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: ALL_INTERFACES.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiskConfig {
    pub path: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FolderConfig {
    pub path: Option<PathBuf>,
}

/// Write the default configuration file
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("Configuration already exists. Use --force to overwrite.");
    }

    Config::default().save(path)?;
    println!("Created {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sampling]
            interval = "1m"

            [network]
            interface = "en0"
            "#,
        )
        .unwrap();

        assert_eq!(config.sampling.interval, RefreshInterval::OneMinute);
        assert_eq!(config.sampling.interval.as_duration(), Duration::from_secs(60));
        assert_eq!(config.network.interface, "en0");
        assert_eq!(config.history, HistoryConfig::default());
        assert_eq!(config.disk.path, PathBuf::from("/"));
    }

    #[test]
    fn test_rejects_unknown_interval() {
        assert!(toml::from_str::<Config>("[sampling]\ninterval = \"7s\"\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.history.capacity = 60;
        config.folder.path = Some(PathBuf::from("/tmp/downloads"));
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();
        let history = config.history_settings();
        assert_eq!(history.capacity, 90);
        assert_eq!(history.min_interval, chrono::Duration::seconds(10));
        assert_eq!(config.facade_settings().window, chrono::Duration::minutes(15));
    }
}
