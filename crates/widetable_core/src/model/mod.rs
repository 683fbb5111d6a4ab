//! Entity model for the single-table layout.
//!
//! # Responsibility
//! - Define entity kinds, item identifiers and the shared item envelope.
//! - Define the `Entity` projection contract used by the generic store.
//!
//! # Invariants
//! - Every stored item carries `PK`, `SK`, `EntityKind`, `CreatedAt` and
//!   `CreatedBy`; `LatestVersion` only on version-0 items.
//! - `DeletedAt`/`DeletedBy` are set together or not at all.
//! - Deletion is a tombstone, never a physical removal.

pub mod context;
pub mod job_log;
pub mod key;
pub mod person;
pub mod person_metadata;

use crate::model::context::AuditStamp;
use crate::model::key::{
    decode_partition_key, decode_sort_key, encode_partition_key, encode_sort_key, KeyError,
    PartitionKey, SortKey,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Attribute names of the item wire layout that the store reads or sets
/// directly; the rest are produced by `ItemEnvelope`'s serde names.
pub const ATTR_LATEST_VERSION: &str = "LatestVersion";
pub const ATTR_DELETED_AT: &str = "DeletedAt";
pub const ATTR_DELETED_BY: &str = "DeletedBy";

/// Entity/grouping discriminator embedded in keys and `EntityKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    PersonMetadata,
    Job,
    Log,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Person,
        EntityKind::PersonMetadata,
        EntityKind::Job,
        EntityKind::Log,
    ];

    /// Stable wire name. Part of the on-disk key format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::PersonMetadata => "PersonMetadata",
            Self::Job => "Job",
            Self::Log => "Log",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| KeyError::UnknownKind(value.to_string()))
    }
}

/// Logical address of one entity: `(PartitionKind, PartitionId, SortKind, SortId)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIdentifiers {
    pub partition_kind: EntityKind,
    pub partition_id: String,
    pub sort_kind: EntityKind,
    pub sort_id: String,
}

impl ItemIdentifiers {
    pub fn new(
        partition_kind: EntityKind,
        partition_id: impl Into<String>,
        sort_kind: EntityKind,
        sort_id: impl Into<String>,
    ) -> Self {
        Self {
            partition_kind,
            partition_id: partition_id.into(),
            sort_kind,
            sort_id: sort_id.into(),
        }
    }

    pub fn partition_key(&self) -> String {
        encode_partition_key(self.partition_kind, &self.partition_id)
    }

    pub fn sort_key(&self, version: u64) -> String {
        encode_sort_key(version, self.sort_kind, &self.sort_id)
    }
}

/// Attributes shared by every stored item, flattened into entity items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemEnvelope {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub entity_kind: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub latest_version: u64,
    pub created_at: String,
    pub created_by: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deleted_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deleted_by: String,
}

impl ItemEnvelope {
    /// Builds the envelope of a freshly written item (never tombstoned).
    pub fn new(
        ids: &ItemIdentifiers,
        version: u64,
        latest_version: u64,
        stamp: &AuditStamp,
    ) -> Self {
        Self {
            pk: ids.partition_key(),
            sk: ids.sort_key(version),
            entity_kind: ids.sort_kind.as_str().to_string(),
            latest_version,
            created_at: stamp.at.clone(),
            created_by: stamp.by.clone(),
            deleted_at: String::new(),
            deleted_by: String::new(),
        }
    }

    pub fn decode_keys(&self) -> Result<(PartitionKey, SortKey), KeyError> {
        Ok((decode_partition_key(&self.pk)?, decode_sort_key(&self.sk)?))
    }

    /// Read-side audit/version fields for a decoded sort key.
    pub fn meta(&self, sort_key: &SortKey) -> ViewMeta {
        ViewMeta {
            version: sort_key.version,
            latest_version: self.latest_version,
            created_at: self.created_at.clone(),
            created_by: self.created_by.clone(),
            deleted_at: self.deleted_at.clone(),
            deleted_by: self.deleted_by.clone(),
        }
    }
}

/// Audit and version fields exposed on every data view.
///
/// Empty `deleted_at`/`deleted_by` mean "not deleted".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMeta {
    pub version: u64,
    pub latest_version: u64,
    pub created_at: String,
    pub created_by: String,
    pub deleted_at: String,
    pub deleted_by: String,
}

impl ViewMeta {
    pub fn is_deleted(&self) -> bool {
        !self.deleted_at.is_empty()
    }
}

/// Projection capability set the versioned store is generic over.
///
/// `Item: Default` is the zero value: items are decoded with
/// `#[serde(default)]`, so attributes omitted on disk come back zeroed.
pub trait Entity {
    /// External write shape.
    type Payload: DeserializeOwned;
    /// Stored attribute-map shape.
    type Item: Serialize + DeserializeOwned + Default;
    /// Externally visible read shape.
    type View: Serialize;

    /// Builds a fully populated stored item.
    ///
    /// Called twice per write: `(0, new_version)` for the current item and
    /// `(new_version, 0)` for the historical snapshot.
    fn to_item(
        payload: &Self::Payload,
        ids: &ItemIdentifiers,
        version: u64,
        latest_version: u64,
        stamp: &AuditStamp,
    ) -> Self::Item;

    /// Decodes the composite key and assembles the read shape.
    fn to_view(item: Self::Item) -> Result<Self::View, KeyError>;
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}
