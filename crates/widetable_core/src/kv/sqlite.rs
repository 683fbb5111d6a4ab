//! SQLite-backed key-value client.
//!
//! # Responsibility
//! - Store each item as a JSON attribute map keyed by `(pk, sk)`.
//! - Serve prefix queries on the primary key and on the `EntityKind` index.
//! - Run `transact_write` inside one `IMMEDIATE` transaction.
//!
//! # Invariants
//! - A failed condition rolls back every operation of the transaction.
//! - Conditions see the item as committed before the transaction started.
//! - `entity_kind` always mirrors the item's `EntityKind` attribute.
//! - Table/index names are validated before being interpolated into SQL.

use crate::config::validate_identifier;
use crate::kv::{
    Condition, Item, ItemKey, KeyValueClient, KvError, KvResult, WriteOp, ATTR_ENTITY_KIND,
    ATTR_PK, ATTR_SK,
};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;
use std::collections::HashSet;

/// Key-value client over a migrated connection (see `db::open_db`).
pub struct SqliteKeyValueClient<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKeyValueClient<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl KeyValueClient for SqliteKeyValueClient<'_> {
    fn describe_table(&self, table: &str, index: &str) -> KvResult<()> {
        check_name("table name", table)?;
        check_name("index name", index)?;

        let table_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if table_exists != 1 {
            return Err(KvError::MissingTable(table.to_string()));
        }

        let index_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type = 'index' AND name = ?1 AND tbl_name = ?2
            );",
            [index, table],
            |row| row.get(0),
        )?;
        if index_exists != 1 {
            return Err(KvError::MissingIndex {
                table: table.to_string(),
                index: index.to_string(),
            });
        }

        Ok(())
    }

    fn get_item(
        &self,
        table: &str,
        key: &ItemKey,
        projection: Option<&[&str]>,
    ) -> KvResult<Option<Item>> {
        check_name("table name", table)?;
        let item = load_item(self.conn, table, key)?;
        Ok(item.map(|item| match projection {
            Some(names) => item
                .into_iter()
                .filter(|(name, _)| names.contains(&name.as_str()))
                .collect(),
            None => item,
        }))
    }

    fn query(&self, table: &str, pk: &str, sk_prefix: &str) -> KvResult<Vec<Item>> {
        check_name("table name", table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT attributes
             FROM {table}
             WHERE pk = ?1
               AND sk >= ?2
               AND substr(sk, 1, ?3) = ?2
             ORDER BY sk ASC;"
        ))?;
        let mut rows = stmt.query(params![pk, sk_prefix, prefix_len(sk_prefix)])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_attributes(&row.get::<_, String>(0)?)?);
        }
        Ok(items)
    }

    fn query_index(
        &self,
        table: &str,
        index: &str,
        entity_kind: &str,
        sk_prefix: &str,
    ) -> KvResult<Vec<Item>> {
        check_name("table name", table)?;
        check_name("index name", index)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT attributes
             FROM {table} INDEXED BY {index}
             WHERE entity_kind = ?1
               AND sk >= ?2
               AND substr(sk, 1, ?3) = ?2
             ORDER BY sk ASC, pk ASC;"
        ))?;
        let mut rows = stmt.query(params![entity_kind, sk_prefix, prefix_len(sk_prefix)])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_attributes(&row.get::<_, String>(0)?)?);
        }
        Ok(items)
    }

    fn transact_write(&self, table: &str, ops: &[WriteOp]) -> KvResult<()> {
        check_name("table name", table)?;

        let mut seen = HashSet::with_capacity(ops.len());
        for op in ops {
            let key = op.key()?;
            if !seen.insert(key.clone()) {
                return Err(KvError::Validation(format!(
                    "transaction contains more than one operation for item {key}"
                )));
            }
        }

        // `new_unchecked` because the client only borrows the connection;
        // IMMEDIATE takes the write lock up front so concurrent writers queue
        // on the busy timeout instead of failing lock upgrades.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for op in ops {
            match op {
                WriteOp::Put { item } => {
                    let key = ItemKey::from_item(item)?;
                    upsert_item(&tx, table, &key, item)?;
                }
                WriteOp::Update {
                    key,
                    set,
                    condition,
                } => {
                    let existing = load_item(&tx, table, key)?;
                    if let Some(condition) = condition {
                        check_condition(table, key, *condition, existing.as_ref())?;
                    }

                    let mut merged = existing.unwrap_or_else(|| {
                        let mut fresh = Item::new();
                        fresh.insert(ATTR_PK.to_string(), Value::String(key.pk.clone()));
                        fresh.insert(ATTR_SK.to_string(), Value::String(key.sk.clone()));
                        fresh
                    });
                    merged.extend(set.iter().map(|(name, value)| (name.clone(), value.clone())));
                    upsert_item(&tx, table, key, &merged)?;
                }
            }
        }
        tx.commit()?;

        debug!(
            "event=kv_transact module=kv status=ok table={} ops={}",
            table,
            ops.len()
        );
        Ok(())
    }
}

fn check_condition(
    table: &str,
    key: &ItemKey,
    condition: Condition,
    existing: Option<&Item>,
) -> KvResult<()> {
    if condition_holds(condition, existing) {
        return Ok(());
    }
    debug!(
        "event=kv_transact module=kv status=canceled table={} pk={} sk={}",
        table, key.pk, key.sk
    );
    Err(KvError::TransactionCanceled {
        failed: key.clone(),
    })
}

fn condition_holds(condition: Condition, existing: Option<&Item>) -> bool {
    match condition {
        Condition::AttributeNotExists(name) => {
            existing.map_or(true, |item| !item.contains_key(name))
        }
    }
}

fn load_item(conn: &Connection, table: &str, key: &ItemKey) -> KvResult<Option<Item>> {
    let attributes: Option<String> = conn
        .query_row(
            &format!("SELECT attributes FROM {table} WHERE pk = ?1 AND sk = ?2;"),
            params![key.pk, key.sk],
            |row| row.get(0),
        )
        .optional()?;
    attributes.as_deref().map(parse_attributes).transpose()
}

fn upsert_item(conn: &Connection, table: &str, key: &ItemKey, item: &Item) -> KvResult<()> {
    let entity_kind = item.get(ATTR_ENTITY_KIND).and_then(Value::as_str);
    let attributes = serde_json::to_string(item)
        .map_err(|err| KvError::InvalidItem(format!("item {key} is not serializable: {err}")))?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {table} (pk, sk, entity_kind, attributes)
             VALUES (?1, ?2, ?3, ?4);"
        ),
        params![key.pk, key.sk, entity_kind, attributes],
    )?;
    Ok(())
}

fn parse_attributes(text: &str) -> KvResult<Item> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(item)) => Ok(item),
        Ok(other) => Err(KvError::InvalidItem(format!(
            "expected an attribute object, found `{other}`"
        ))),
        Err(err) => Err(KvError::InvalidItem(format!(
            "attributes are not valid JSON: {err}"
        ))),
    }
}

fn check_name(setting: &'static str, value: &str) -> KvResult<()> {
    validate_identifier(setting, value).map_err(|err| KvError::Validation(err.to_string()))
}

fn prefix_len(prefix: &str) -> i64 {
    i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX)
}
