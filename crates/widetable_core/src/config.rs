//! Store and logging configuration.
//!
//! # Responsibility
//! - Carry table/index names explicitly instead of process-wide globals.
//! - Load overrides from the environment for binaries.
//!
//! # Invariants
//! - Table and index names are plain SQL identifiers; they are interpolated
//!   into SQL and must never carry quoting or whitespace.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const TABLE_NAME_ENV: &str = "WIDETABLE_TABLE_NAME";
pub const INDEX_NAME_ENV: &str = "WIDETABLE_INDEX_NAME";
pub const LOG_LEVEL_ENV: &str = "WIDETABLE_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "WIDETABLE_LOG_DIR";

pub const DEFAULT_TABLE_NAME: &str = "items";
pub const DEFAULT_INDEX_NAME: &str = "items_by_entity_kind";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidIdentifier { setting: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier { setting, value } => {
                write!(f, "invalid {setting} `{value}`: expected [A-Za-z_][A-Za-z0-9_]*")
            }
        }
    }
}

impl Error for ConfigError {}

/// Names of the wide table and its `EntityKind` secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub index_name: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }
}

impl TableConfig {
    /// Builds a validated config from explicit names.
    pub fn new(
        table_name: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            table_name: table_name.into(),
            index_name: index_name.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads names from `WIDETABLE_TABLE_NAME` / `WIDETABLE_INDEX_NAME`,
    /// falling back to defaults for unset or blank values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(
            env_or(TABLE_NAME_ENV, DEFAULT_TABLE_NAME),
            env_or(INDEX_NAME_ENV, DEFAULT_INDEX_NAME),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("table name", &self.table_name)?;
        validate_identifier("index name", &self.index_name)
    }
}

/// Logging setup; `log_dir = None` logs to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_or(LOG_LEVEL_ENV, &defaults.level),
            log_dir: non_blank_env(LOG_DIR_ENV).map(PathBuf::from),
        }
    }
}

pub fn validate_identifier(setting: &'static str, value: &str) -> Result<(), ConfigError> {
    if IDENTIFIER_RE.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            setting,
            value: value.to_string(),
        })
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    non_blank_env(name).unwrap_or_else(|| fallback.to_string())
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
