use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "lifetimer";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// how often the foreground scanner re-checks alarms
    pub poll_interval_secs: u64,
    /// how late an alarm may still be rung by the scanner
    pub due_tolerance_secs: u32,
    pub snooze_minutes: u32,
    /// seed the sample alarms the first time the app runs
    #[serde(default = "always_true")]
    pub seed_sample_alarms: bool,
    /// where alarms are stored, defaults to the platform data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            due_tolerance_secs: 120,
            snooze_minutes: 5,
            seed_sample_alarms: true,
            data_dir: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the config, a missing file gives the defaults.
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(config) => Ok(toml::from_str(&config)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn save(&self, path: PathBuf) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, config).map_err(|source| ConfigError::Io { path, source })
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or(ConfigError::NoProjectDirs)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    /// `data_dir` if set, otherwise the platform data dir.
    pub fn data_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or(ConfigError::NoProjectDirs)?
            .data_dir()
            .to_path_buf())
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    /// Never shorter than one second.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    #[must_use]
    pub fn due_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.due_tolerance_secs))
    }
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}
