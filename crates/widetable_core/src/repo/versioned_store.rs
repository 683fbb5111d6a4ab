//! Versioned, soft-deleting store over a `KeyValueClient`.
//!
//! # Responsibility
//! - Point reads and prefix listings of current (version-0) items.
//! - `put`: write the current item and a new historical snapshot atomically.
//! - `delete`: tombstone the current item and the latest snapshot atomically,
//!   at most once.
//!
//! # Invariants
//! - `LatestVersion` on the current item names the newest snapshot and only
//!   grows. An absent counter reads as 0; a malformed one is an error.
//! - Snapshots are never rewritten except to receive the tombstone.
//! - Actor and timestamp come from the caller's `RequestContext`.
//! - No retries: client errors other than a failed delete condition surface
//!   unchanged.
//!
//! # Concurrency
//! The store holds no mutable state. Concurrent `put`s on one target race on
//! the counter read and the last commit owns the current item; when both read
//! the same counter they also write the same snapshot key, and the later
//! commit replaces the earlier snapshot. No condition is checked on this
//! path (last-writer-wins), so a put on a tombstoned target writes a fresh,
//! undeleted current item. Concurrent `delete`s are serialized by the
//! `DeletedAt` condition: one commits, the other gets `Conflict`.

use crate::config::TableConfig;
use crate::kv::{Condition, Item, ItemKey, KeyValueClient, KvError, WriteOp};
use crate::model::context::RequestContext;
use crate::model::key::{
    decode_sort_key, encode_anonymous_sort_key, encode_partition_key, validate_id, KeyError,
    CURRENT_VERSION, SORT_KEY_VERSION_PREFIX,
};
use crate::model::{
    Entity, EntityKind, ItemIdentifiers, ATTR_DELETED_AT, ATTR_DELETED_BY, ATTR_LATEST_VERSION,
};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// Caller did not supply a usable actor/timestamp.
    MissingContext(&'static str),
    /// Identifier cannot be embedded in a key.
    InvalidIdentifier(KeyError),
    NotFound { pk: String, sk: String },
    /// Delete precondition failed: the item is already tombstoned.
    Conflict { pk: String, sk: String },
    /// Stored key could not be decoded.
    Decode(KeyError),
    /// Stored attributes do not match the entity shape.
    InvalidItem(String),
    Kv(KvError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContext(field) => write!(f, "missing request context: {field}"),
            Self::InvalidIdentifier(err) => write!(f, "{err}"),
            Self::NotFound { pk, sk } => write!(f, "item not found: ({pk}, {sk})"),
            Self::Conflict { pk, sk } => write!(f, "item already deleted: ({pk}, {sk})"),
            Self::Decode(err) => write!(f, "corrupt stored key: {err}"),
            Self::InvalidItem(message) => write!(f, "corrupt stored item: {message}"),
            Self::Kv(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentifier(err) | Self::Decode(err) => Some(err),
            Self::Kv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<KvError> for StoreError {
    fn from(value: KvError) -> Self {
        match value {
            KvError::TransactionCanceled { failed } => Self::Conflict {
                pk: failed.pk,
                sk: failed.sk,
            },
            other => Self::Kv(other),
        }
    }
}

/// Generic versioned store. Construct once and share by reference.
pub struct VersionedStore<C: KeyValueClient> {
    client: C,
    table_name: String,
    index_name: String,
}

impl<C: KeyValueClient> VersionedStore<C> {
    /// Binds a client to a table after checking the table and index exist.
    pub fn try_new(client: C, config: &TableConfig) -> StoreResult<Self> {
        client.describe_table(&config.table_name, &config.index_name)?;
        Ok(Self {
            client,
            table_name: config.table_name.clone(),
            index_name: config.index_name.clone(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Reads the current snapshot.
    pub fn get_current<E: Entity>(
        &self,
        ctx: &RequestContext,
        ids: &ItemIdentifiers,
    ) -> StoreResult<E::View> {
        self.get_version::<E>(ctx, ids, CURRENT_VERSION)
    }

    /// Reads one snapshot; `CURRENT_VERSION` addresses the current item.
    pub fn get_version<E: Entity>(
        &self,
        ctx: &RequestContext,
        ids: &ItemIdentifiers,
        version: u64,
    ) -> StoreResult<E::View> {
        require_context(ctx)?;
        let key = item_key(ids, version);
        let item = self
            .client
            .get_item(&self.table_name, &key, None)?
            .ok_or(StoreError::NotFound {
                pk: key.pk,
                sk: key.sk,
            })?;
        decode_view::<E>(item)
    }

    /// Current items of `sort_kind` under one partition, in sort-key order.
    pub fn list_by_partition<E: Entity>(
        &self,
        ctx: &RequestContext,
        partition_kind: EntityKind,
        partition_id: &str,
        sort_kind: EntityKind,
    ) -> StoreResult<Vec<E::View>> {
        require_context(ctx)?;
        let items = self.client.query(
            &self.table_name,
            &encode_partition_key(partition_kind, partition_id),
            &encode_anonymous_sort_key(CURRENT_VERSION, sort_kind),
        )?;
        items.into_iter().map(decode_view::<E>).collect()
    }

    /// Current items of `sort_kind` across all partitions (secondary index).
    pub fn list_by_kind<E: Entity>(
        &self,
        ctx: &RequestContext,
        sort_kind: EntityKind,
    ) -> StoreResult<Vec<E::View>> {
        require_context(ctx)?;
        let items = self.client.query_index(
            &self.table_name,
            &self.index_name,
            sort_kind.as_str(),
            &encode_anonymous_sort_key(CURRENT_VERSION, sort_kind),
        )?;
        items.into_iter().map(decode_view::<E>).collect()
    }

    /// Historical snapshots of one target, oldest first.
    pub fn list_history<E: Entity>(
        &self,
        ctx: &RequestContext,
        ids: &ItemIdentifiers,
    ) -> StoreResult<Vec<E::View>> {
        require_context(ctx)?;
        let items =
            self.client
                .query(&self.table_name, &ids.partition_key(), SORT_KEY_VERSION_PREFIX)?;

        let mut snapshots = Vec::new();
        for item in items {
            let sort_key = item
                .get(crate::kv::ATTR_SK)
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::InvalidItem("missing `SK`".to_string()))?;
            let sort = decode_sort_key(sort_key).map_err(StoreError::Decode)?;
            if sort.version == CURRENT_VERSION
                || sort.kind != ids.sort_kind
                || sort.id != ids.sort_id
            {
                continue;
            }
            snapshots.push((sort.version, decode_view::<E>(item)?));
        }

        // Sort keys order lexicographically (`V10` < `V2`).
        snapshots.sort_by_key(|(version, _)| *version);
        Ok(snapshots.into_iter().map(|(_, view)| view).collect())
    }

    /// Writes `payload` as the new current item and as snapshot
    /// `LatestVersion + 1`. Returns the new version.
    pub fn put<E: Entity>(
        &self,
        ctx: &RequestContext,
        ids: &ItemIdentifiers,
        payload: &E::Payload,
    ) -> StoreResult<u64> {
        require_context(ctx)?;
        validate_ids(ids)?;
        let started_at = Instant::now();

        let current_key = item_key(ids, CURRENT_VERSION);
        let latest_version = self.read_latest_version(&current_key)?.unwrap_or(0);
        let new_version = latest_version.checked_add(1).ok_or_else(|| {
            StoreError::InvalidItem(format!("version counter exhausted on {current_key}"))
        })?;

        let stamp = ctx.stamp();
        let current = encode_item(&E::to_item(
            payload,
            ids,
            CURRENT_VERSION,
            new_version,
            &stamp,
        ))?;
        let snapshot = encode_item(&E::to_item(payload, ids, new_version, 0, &stamp))?;

        let ops = [
            WriteOp::Put { item: current },
            WriteOp::Put { item: snapshot },
        ];
        if let Err(err) = self.client.transact_write(&self.table_name, &ops) {
            error!(
                "event=item_put module=store status=error pk={} sk={} version={} duration_ms={} error={}",
                current_key.pk,
                current_key.sk,
                new_version,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }

        info!(
            "event=item_put module=store status=ok pk={} sk={} version={} duration_ms={}",
            current_key.pk,
            current_key.sk,
            new_version,
            started_at.elapsed().as_millis()
        );
        Ok(new_version)
    }

    /// Tombstones the current item and snapshot `LatestVersion`.
    ///
    /// Returns the tombstoned snapshot version. A repeated delete fails with
    /// `Conflict`; deleting an absent target fails with `NotFound`.
    pub fn delete(&self, ctx: &RequestContext, ids: &ItemIdentifiers) -> StoreResult<u64> {
        require_context(ctx)?;
        validate_ids(ids)?;
        let started_at = Instant::now();

        let current_key = item_key(ids, CURRENT_VERSION);
        let latest_version =
            self.read_latest_version(&current_key)?
                .ok_or_else(|| StoreError::NotFound {
                    pk: current_key.pk.clone(),
                    sk: current_key.sk.clone(),
                })?;

        let stamp = ctx.stamp();
        let mut tombstone = Item::new();
        tombstone.insert(ATTR_DELETED_AT.to_string(), Value::String(stamp.at));
        tombstone.insert(ATTR_DELETED_BY.to_string(), Value::String(stamp.by));

        let condition = Some(Condition::AttributeNotExists(ATTR_DELETED_AT));
        let mut ops = vec![WriteOp::Update {
            key: current_key.clone(),
            set: tombstone.clone(),
            condition,
        }];
        // A current item without a counter has no snapshot to tombstone, and
        // a second operation on the same key would be rejected.
        if latest_version != CURRENT_VERSION {
            ops.push(WriteOp::Update {
                key: item_key(ids, latest_version),
                set: tombstone,
                condition,
            });
        }

        match self.client.transact_write(&self.table_name, &ops) {
            Ok(()) => {
                info!(
                    "event=item_delete module=store status=ok pk={} sk={} version={} duration_ms={}",
                    current_key.pk,
                    current_key.sk,
                    latest_version,
                    started_at.elapsed().as_millis()
                );
                Ok(latest_version)
            }
            Err(KvError::TransactionCanceled { failed }) => {
                warn!(
                    "event=item_delete module=store status=conflict pk={} sk={}",
                    failed.pk, failed.sk
                );
                Err(StoreError::Conflict {
                    pk: failed.pk,
                    sk: failed.sk,
                })
            }
            Err(err) => {
                error!(
                    "event=item_delete module=store status=error pk={} sk={} duration_ms={} error={}",
                    current_key.pk,
                    current_key.sk,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// `None` when the current item is absent, `Some(0)` when it carries no
    /// counter.
    fn read_latest_version(&self, current_key: &ItemKey) -> StoreResult<Option<u64>> {
        let projected =
            self.client
                .get_item(&self.table_name, current_key, Some(&[ATTR_LATEST_VERSION][..]))?;
        let Some(item) = projected else {
            return Ok(None);
        };

        match item.get(ATTR_LATEST_VERSION) {
            None => Ok(Some(0)),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                StoreError::InvalidItem(format!(
                    "`{ATTR_LATEST_VERSION}` on {current_key} is not a non-negative integer: {value}"
                ))
            }),
        }
    }
}

fn require_context(ctx: &RequestContext) -> StoreResult<()> {
    if ctx.has_actor() {
        Ok(())
    } else {
        Err(StoreError::MissingContext("actor_id"))
    }
}

fn validate_ids(ids: &ItemIdentifiers) -> StoreResult<()> {
    validate_id(&ids.partition_id).map_err(StoreError::InvalidIdentifier)?;
    validate_id(&ids.sort_id).map_err(StoreError::InvalidIdentifier)
}

fn item_key(ids: &ItemIdentifiers, version: u64) -> ItemKey {
    ItemKey::new(ids.partition_key(), ids.sort_key(version))
}

fn encode_item<T: Serialize>(item: &T) -> StoreResult<Item> {
    match serde_json::to_value(item) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::InvalidItem(format!(
            "entity item serialized to a non-object: {other}"
        ))),
        Err(err) => Err(StoreError::InvalidItem(err.to_string())),
    }
}

fn decode_view<E: Entity>(item: Item) -> StoreResult<E::View> {
    let decoded: E::Item = serde_json::from_value(Value::Object(item))
        .map_err(|err| StoreError::InvalidItem(err.to_string()))?;
    E::to_view(decoded).map_err(StoreError::Decode)
}
