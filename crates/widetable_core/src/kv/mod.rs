//! Key-value client contract for the wide table.
//!
//! # Responsibility
//! - Describe the store primitives the versioned store relies on: point
//!   reads, prefix queries on the primary key and on the `EntityKind` index,
//!   and all-or-nothing multi-item transactions.
//! - Keep backend details (SQL, connections) behind one trait.
//!
//! # Invariants
//! - `transact_write` applies every operation or none.
//! - A failed `Update` condition cancels the whole transaction and reports
//!   the key whose condition failed.
//! - Two operations on the same key in one transaction are rejected.

pub mod sqlite;

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One stored item as an attribute map (`PK`, `SK`, `EntityKind`, ...).
pub type Item = serde_json::Map<String, serde_json::Value>;

pub type KvResult<T> = Result<T, KvError>;

pub const ATTR_PK: &str = "PK";
pub const ATTR_SK: &str = "SK";
pub const ATTR_ENTITY_KIND: &str = "EntityKind";

/// Primary key of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Reads `PK`/`SK` out of an attribute map.
    pub fn from_item(item: &Item) -> KvResult<Self> {
        let pk = string_attribute(item, ATTR_PK)?;
        let sk = string_attribute(item, ATTR_SK)?;
        Ok(Self::new(pk, sk))
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.pk, self.sk)
    }
}

/// Precondition attached to an `Update`, evaluated against the stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    AttributeNotExists(&'static str),
}

/// One operation inside `transact_write`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Unconditional full-item write; replaces any existing item.
    Put { item: Item },
    /// Sets attributes on an item, creating it when absent.
    Update {
        key: ItemKey,
        set: Item,
        condition: Option<Condition>,
    },
}

impl WriteOp {
    pub fn key(&self) -> KvResult<ItemKey> {
        match self {
            Self::Put { item } => ItemKey::from_item(item),
            Self::Update { key, .. } => Ok(key.clone()),
        }
    }
}

#[derive(Debug)]
pub enum KvError {
    Db(DbError),
    MissingTable(String),
    MissingIndex { table: String, index: String },
    /// Request rejected before touching the store.
    Validation(String),
    /// Stored attributes could not be read back as an item.
    InvalidItem(String),
    /// A condition failed; nothing in the transaction was applied.
    TransactionCanceled { failed: ItemKey },
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingTable(table) => write!(f, "table `{table}` does not exist"),
            Self::MissingIndex { table, index } => {
                write!(f, "index `{index}` does not exist on table `{table}`")
            }
            Self::Validation(message) => write!(f, "invalid request: {message}"),
            Self::InvalidItem(message) => write!(f, "invalid stored item: {message}"),
            Self::TransactionCanceled { failed } => {
                write!(f, "transaction canceled: condition failed on {failed}")
            }
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for KvError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store primitives used by `VersionedStore`.
///
/// Table and index names are passed per call, the way a DynamoDB request
/// names its table; the client itself holds only the connection.
pub trait KeyValueClient {
    /// Verifies that `table` and its `index` exist.
    fn describe_table(&self, table: &str, index: &str) -> KvResult<()>;

    /// Point read. `projection` limits the returned attributes.
    fn get_item(
        &self,
        table: &str,
        key: &ItemKey,
        projection: Option<&[&str]>,
    ) -> KvResult<Option<Item>>;

    /// Items under `pk` whose sort key starts with `sk_prefix`, by sort key.
    fn query(&self, table: &str, pk: &str, sk_prefix: &str) -> KvResult<Vec<Item>>;

    /// Items with `EntityKind = entity_kind` whose sort key starts with
    /// `sk_prefix`, across partitions.
    fn query_index(
        &self,
        table: &str,
        index: &str,
        entity_kind: &str,
        sk_prefix: &str,
    ) -> KvResult<Vec<Item>>;

    /// Applies `ops` atomically.
    fn transact_write(&self, table: &str, ops: &[WriteOp]) -> KvResult<()>;
}

impl<C: KeyValueClient + ?Sized> KeyValueClient for &C {
    fn describe_table(&self, table: &str, index: &str) -> KvResult<()> {
        (**self).describe_table(table, index)
    }

    fn get_item(
        &self,
        table: &str,
        key: &ItemKey,
        projection: Option<&[&str]>,
    ) -> KvResult<Option<Item>> {
        (**self).get_item(table, key, projection)
    }

    fn query(&self, table: &str, pk: &str, sk_prefix: &str) -> KvResult<Vec<Item>> {
        (**self).query(table, pk, sk_prefix)
    }

    fn query_index(
        &self,
        table: &str,
        index: &str,
        entity_kind: &str,
        sk_prefix: &str,
    ) -> KvResult<Vec<Item>> {
        (**self).query_index(table, index, entity_kind, sk_prefix)
    }

    fn transact_write(&self, table: &str, ops: &[WriteOp]) -> KvResult<()> {
        (**self).transact_write(table, ops)
    }
}

fn string_attribute(item: &Item, name: &str) -> KvResult<String> {
    item.get(name)
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| KvError::InvalidItem(format!("missing string attribute `{name}`")))
}
