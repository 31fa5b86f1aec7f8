//! Process configuration resolved from the environment.
//!
//! | Variable           | Default                        |
//! |--------------------|--------------------------------|
//! | `ROSTER_DB_PATH`   | `<temp dir>/roster.sqlite3`    |
//! | `ROSTER_LOG_LEVEL` | `debug` (debug) / `info`       |
//! | `ROSTER_LOG_DIR`   | unset: file logging is skipped |
//!
//! Blank values count as unset.

use crate::db::{open_db, DbResult};
use crate::logging::{default_log_level, init_logging, normalize_level, LoggingError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DB_PATH_VAR: &str = "ROSTER_DB_PATH";
pub const LOG_LEVEL_VAR: &str = "ROSTER_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "ROSTER_LOG_DIR";

const DEFAULT_DB_FILE: &str = "roster.sqlite3";

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, message } => write!(f, "invalid `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterConfig {
    pub db_path: PathBuf,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
}

impl RosterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let db_path = value(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE));

        let log_level = match value(LOG_LEVEL_VAR) {
            Some(raw) => normalize_level(&raw).map_err(|err| ConfigError::InvalidValue {
                key: LOG_LEVEL_VAR,
                message: err.to_string(),
            })?,
            None => default_log_level(),
        };

        let log_dir = value(LOG_DIR_VAR).map(PathBuf::from);
        if let Some(dir) = &log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: LOG_DIR_VAR,
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }

        Ok(Self {
            db_path,
            log_level,
            log_dir,
        })
    }

    /// Starts file logging when a log directory is configured. Returns
    /// whether logging is active.
    pub fn init_logging(&self) -> Result<bool, LoggingError> {
        let Some(dir) = self.log_dir.as_deref().and_then(Path::to_str) else {
            return Ok(false);
        };
        init_logging(self.log_level, dir)?;
        Ok(true)
    }

    /// Opens the configured database with migrations applied.
    pub fn open_db(&self) -> DbResult<Connection> {
        open_db(&self.db_path)
    }
}
