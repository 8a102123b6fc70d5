use std::{io, path::PathBuf};

use thiserror::Error;

/// Rejected alarm fields.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlarmError {
    #[error("hour {0} is out of range (0-23)")]
    Hour(u32),
    #[error("minute {0} is out of range (0-59)")]
    Minute(u32),
    #[error("volume {0} is out of range (0.0-1.0)")]
    Volume(f64),
    #[error("couldn't parse time {0:?}, expected HH:MM")]
    Time(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepeatError {
    #[error("unknown day {0:?}")]
    UnknownDay(String),
    #[error("weekday {0} is out of range (1=Sunday .. 7=Saturday)")]
    OutOfRange(u8),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("couldn't access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't serialize alarms: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("couldn't parse stored alarms: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("stored alarms are not valid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Reported by a notification scheduler that couldn't accept a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("fire time {0} is in the past")]
    InThePast(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't determine the platform config directory")]
    NoProjectDirs,
    #[error("couldn't access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
