//! Composite key codec for the single wide table.
//!
//! # Responsibility
//! - Encode/decode partition keys (`{Kind}#{Id}`).
//! - Encode/decode sort keys (`V{version}#{Kind}#{Id}`).
//! - Build anonymous sort-key prefixes for range queries.
//!
//! # Invariants
//! - `version = 0` always addresses the current snapshot.
//! - Decoding never defaults: part-count mismatch, missing `V` prefix,
//!   non-numeric version and unknown kinds are all errors.
//! - Ids accepted by `validate_id` round-trip through encode/decode.

use crate::model::EntityKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const KEY_SEPARATOR: char = '#';
pub const SORT_KEY_VERSION_PREFIX: &str = "V";

/// Version number reserved for the current snapshot.
pub const CURRENT_VERSION: u64 = 0;

const PARTITION_KEY_PARTS: usize = 2;
const SORT_KEY_PARTS: usize = 3;

/// Decoded partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub kind: EntityKind,
    pub id: String,
}

/// Decoded sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub version: u64,
    pub kind: EntityKind,
    pub id: String,
}

/// Key decode/validation failure. Always treated as data corruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    PartCount {
        key: String,
        expected: usize,
        actual: usize,
    },
    MissingVersionPrefix(String),
    InvalidVersion(String),
    UnknownKind(String),
    InvalidId(String),
}

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PartCount {
                key,
                expected,
                actual,
            } => write!(
                f,
                "invalid key `{key}`: expected {expected} parts, found {actual}"
            ),
            Self::MissingVersionPrefix(key) => {
                write!(f, "invalid sort key `{key}`: missing version prefix")
            }
            Self::InvalidVersion(key) => write!(f, "invalid sort key `{key}`: bad version"),
            Self::UnknownKind(kind) => write!(f, "unknown entity kind `{kind}`"),
            Self::InvalidId(id) => write!(
                f,
                "invalid id `{id}`: ids must be non-empty and must not contain `{KEY_SEPARATOR}`"
            ),
        }
    }
}

impl Error for KeyError {}

pub fn encode_partition_key(kind: EntityKind, id: &str) -> String {
    format!("{kind}{KEY_SEPARATOR}{id}")
}

pub fn encode_sort_key(version: u64, kind: EntityKind, id: &str) -> String {
    format!("{}{id}", encode_anonymous_sort_key(version, kind))
}

/// Sort-key prefix matching every id of `kind` at `version`.
pub fn encode_anonymous_sort_key(version: u64, kind: EntityKind) -> String {
    format!("{SORT_KEY_VERSION_PREFIX}{version}{KEY_SEPARATOR}{kind}{KEY_SEPARATOR}")
}

pub fn decode_partition_key(partition_key: &str) -> Result<PartitionKey, KeyError> {
    let parts: Vec<&str> = partition_key.split(KEY_SEPARATOR).collect();
    if parts.len() != PARTITION_KEY_PARTS {
        return Err(KeyError::PartCount {
            key: partition_key.to_string(),
            expected: PARTITION_KEY_PARTS,
            actual: parts.len(),
        });
    }

    Ok(PartitionKey {
        kind: parts[0].parse()?,
        id: parts[1].to_string(),
    })
}

pub fn decode_sort_key(sort_key: &str) -> Result<SortKey, KeyError> {
    let parts: Vec<&str> = sort_key.split(KEY_SEPARATOR).collect();
    if parts.len() != SORT_KEY_PARTS {
        return Err(KeyError::PartCount {
            key: sort_key.to_string(),
            expected: SORT_KEY_PARTS,
            actual: parts.len(),
        });
    }

    let version_text = parts[0]
        .strip_prefix(SORT_KEY_VERSION_PREFIX)
        .ok_or_else(|| KeyError::MissingVersionPrefix(sort_key.to_string()))?;
    // `u64::from_str` tolerates a leading `+`, which would not re-encode.
    if version_text.is_empty() || !version_text.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(KeyError::InvalidVersion(sort_key.to_string()));
    }
    let version = version_text
        .parse::<u64>()
        .map_err(|_| KeyError::InvalidVersion(sort_key.to_string()))?;

    Ok(SortKey {
        version,
        kind: parts[1].parse()?,
        id: parts[2].to_string(),
    })
}

/// Checks that `id` can be embedded in a key and decoded back unchanged.
pub fn validate_id(id: &str) -> Result<(), KeyError> {
    if id.is_empty() || id.contains(KEY_SEPARATOR) {
        return Err(KeyError::InvalidId(id.to_string()));
    }
    Ok(())
}
