use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use widetable_core::db::{open_db, open_db_in_memory};
use widetable_core::kv::{Item, ItemKey, WriteOp};
use widetable_core::model::job_log::{JobLog, JobLogPayload};
use widetable_core::model::person::{Person, PersonPayload};
use widetable_core::{
    EntityKind, ItemIdentifiers, KeyValueClient, KvError, RequestContext, SqliteKeyValueClient,
    StoreError, TableConfig, VersionedStore,
};

fn ctx_at(offset_secs: i64) -> RequestContext {
    let instant = Utc
        .timestamp_opt(1_700_000_000 + offset_secs, 0)
        .single()
        .unwrap();
    RequestContext::new("tester", instant)
}

fn person_ids(id: &str) -> ItemIdentifiers {
    ItemIdentifiers::new(EntityKind::Person, id, EntityKind::Person, id)
}

fn log_ids(job_id: &str, log_id: &str) -> ItemIdentifiers {
    ItemIdentifiers::new(EntityKind::Job, job_id, EntityKind::Log, log_id)
}

fn person(given_name: &str) -> PersonPayload {
    PersonPayload {
        given_name: given_name.to_string(),
        family_name: "Lee".to_string(),
    }
}

fn store(conn: &Connection) -> VersionedStore<SqliteKeyValueClient<'_>> {
    VersionedStore::try_new(SqliteKeyValueClient::new(conn), &TableConfig::default()).unwrap()
}

#[test]
fn person_lifecycle_end_to_end() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let ids = person_ids("p1");

    assert_eq!(store.put::<Person>(&ctx_at(0), &ids, &person("Ann")).unwrap(), 1);
    assert_eq!(store.put::<Person>(&ctx_at(10), &ids, &person("Annie")).unwrap(), 2);

    let current = store.get_current::<Person>(&ctx_at(20), &ids).unwrap();
    assert_eq!(current.person_id, "p1");
    assert_eq!(current.given_name, "Annie");
    assert_eq!(current.meta.version, 0);
    assert_eq!(current.meta.latest_version, 2);
    assert_eq!(current.meta.created_by, "tester");
    assert_eq!(current.meta.created_at, "2023-11-14T22:13:30Z");
    assert!(!current.meta.is_deleted());

    let history = store.list_history::<Person>(&ctx_at(20), &ids).unwrap();
    let names: Vec<(&str, u64)> = history
        .iter()
        .map(|view| (view.given_name.as_str(), view.meta.version))
        .collect();
    assert_eq!(names, vec![("Ann", 1), ("Annie", 2)]);
    assert!(history.iter().all(|view| view.meta.latest_version == 0));

    assert_eq!(store.delete(&ctx_at(30), &ids).unwrap(), 2);
    let err = store.delete(&ctx_at(40), &ids).unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[test]
fn versions_grow_by_one_and_each_snapshot_is_retrievable() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let ids = person_ids("p1");

    for (step, name) in ["A", "B", "C"].into_iter().enumerate() {
        let version = store
            .put::<Person>(&ctx_at(step as i64), &ids, &person(name))
            .unwrap();
        assert_eq!(version, step as u64 + 1);
    }

    for (version, name) in [(1, "A"), (2, "B"), (3, "C")] {
        let snapshot = store
            .get_version::<Person>(&ctx_at(10), &ids, version)
            .unwrap();
        assert_eq!(snapshot.given_name, name);
        assert_eq!(snapshot.meta.version, version);
    }
    let current = store.get_current::<Person>(&ctx_at(10), &ids).unwrap();
    assert_eq!(current.given_name, "C");
    assert_eq!(current.meta.latest_version, 3);
}

#[test]
fn history_orders_versions_numerically() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let ids = person_ids("p1");

    for step in 0..11 {
        store
            .put::<Person>(&ctx_at(step), &ids, &person(&format!("n{step}")))
            .unwrap();
    }

    let versions: Vec<u64> = store
        .list_history::<Person>(&ctx_at(20), &ids)
        .unwrap()
        .iter()
        .map(|view| view.meta.version)
        .collect();
    assert_eq!(versions, (1..=11).collect::<Vec<u64>>());
}

#[test]
fn delete_tombstones_current_and_latest_snapshot_only() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let ids = person_ids("p1");
    store.put::<Person>(&ctx_at(0), &ids, &person("Ann")).unwrap();
    store.put::<Person>(&ctx_at(1), &ids, &person("Annie")).unwrap();

    let deleter = RequestContext::new("admin", ctx_at(5).request_timestamp);
    store.delete(&deleter, &ids).unwrap();

    let current = store.get_current::<Person>(&ctx_at(6), &ids).unwrap();
    assert_eq!(current.meta.deleted_at, "2023-11-14T22:13:25Z");
    assert_eq!(current.meta.deleted_by, "admin");
    assert_eq!(current.given_name, "Annie");

    let latest = store.get_version::<Person>(&ctx_at(6), &ids, 2).unwrap();
    assert!(latest.meta.is_deleted());
    let older = store.get_version::<Person>(&ctx_at(6), &ids, 1).unwrap();
    assert!(!older.meta.is_deleted());
}

#[test]
fn put_after_delete_writes_a_live_current_item() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let ids = person_ids("p1");
    store.put::<Person>(&ctx_at(0), &ids, &person("Ann")).unwrap();
    store.delete(&ctx_at(1), &ids).unwrap();

    assert_eq!(store.put::<Person>(&ctx_at(2), &ids, &person("Back")).unwrap(), 2);

    let current = store.get_current::<Person>(&ctx_at(3), &ids).unwrap();
    assert_eq!(current.given_name, "Back");
    assert_eq!(current.meta.latest_version, 2);
    assert!(!current.meta.is_deleted());

    let history = store.list_history::<Person>(&ctx_at(3), &ids).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].meta.is_deleted());
    assert!(!history[1].meta.is_deleted());
}

#[test]
fn missing_targets_are_not_found() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let ids = person_ids("ghost");

    assert!(matches!(
        store.get_current::<Person>(&ctx_at(0), &ids).unwrap_err(),
        StoreError::NotFound { .. }
    ));
    match store.delete(&ctx_at(0), &ids).unwrap_err() {
        StoreError::NotFound { pk, sk } => {
            assert_eq!(pk, "Person#ghost");
            assert_eq!(sk, "V0#Person#ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn blank_actor_is_rejected_before_any_io() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let anonymous = RequestContext::new("", ctx_at(0).request_timestamp);

    let err = store
        .put::<Person>(&anonymous, &person_ids("p1"), &person("Ann"))
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingContext("actor_id")));
    assert!(matches!(
        store.list_by_kind::<Person>(&anonymous, EntityKind::Person),
        Err(StoreError::MissingContext(_))
    ));
}

#[test]
fn ids_with_separator_are_rejected() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);

    let err = store
        .put::<Person>(&ctx_at(0), &person_ids("a#b"), &person("Ann"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentifier(_)));
}

#[test]
fn listings_return_current_items_only() {
    let conn = open_db_in_memory(&TableConfig::default()).unwrap();
    let store = store(&conn);
    let payload = JobLogPayload {
        person_id: "p1".to_string(),
        hours: 3,
    };

    for ids in [log_ids("j1", "l1"), log_ids("j1", "l2"), log_ids("j2", "l3")] {
        store.put::<JobLog>(&ctx_at(0), &ids, &payload).unwrap();
        store.put::<JobLog>(&ctx_at(1), &ids, &payload).unwrap();
    }
    store
        .put::<Person>(&ctx_at(0), &person_ids("p1"), &person("Ann"))
        .unwrap();

    let in_job = store
        .list_by_partition::<JobLog>(&ctx_at(2), EntityKind::Job, "j1", EntityKind::Log)
        .unwrap();
    let log_ids_in_job: Vec<&str> = in_job.iter().map(|view| view.log_id.as_str()).collect();
    assert_eq!(log_ids_in_job, vec!["l1", "l2"]);
    assert!(in_job
        .iter()
        .all(|view| view.meta.version == 0 && view.meta.latest_version == 2));

    let all_logs = store.list_by_kind::<JobLog>(&ctx_at(2), EntityKind::Log).unwrap();
    assert_eq!(all_logs.len(), 3);
    assert!(all_logs.iter().all(|view| view.meta.version == 0));
}

#[test]
fn duplicate_keys_in_one_transaction_write_nothing() {
    let config = TableConfig::default();
    let conn = open_db_in_memory(&config).unwrap();
    let client = SqliteKeyValueClient::new(&conn);

    let item = as_item(json!({"PK": "Person#p1", "SK": "V0#Person#p1", "EntityKind": "Person"}));
    let ops = [
        WriteOp::Put { item: item.clone() },
        WriteOp::Put { item },
    ];

    let err = client.transact_write(&config.table_name, &ops).unwrap_err();
    assert!(matches!(err, KvError::Validation(_)));
    assert!(client
        .get_item(
            &config.table_name,
            &ItemKey::new("Person#p1", "V0#Person#p1"),
            None
        )
        .unwrap()
        .is_none());
}

#[test]
fn failed_condition_rolls_back_earlier_operations() {
    let config = TableConfig::default();
    let conn = open_db_in_memory(&config).unwrap();
    let client = SqliteKeyValueClient::new(&conn);

    let tombstoned = as_item(json!({
        "PK": "Person#p2",
        "SK": "V0#Person#p2",
        "DeletedAt": "2024-01-01T00:00:00Z"
    }));
    client
        .transact_write(
            &config.table_name,
            &[WriteOp::Put { item: tombstoned }],
        )
        .unwrap();

    let mut set = Item::new();
    set.insert("DeletedBy".to_string(), json!("someone"));
    let ops = [
        WriteOp::Put {
            item: as_item(json!({"PK": "Person#p1", "SK": "V0#Person#p1"})),
        },
        WriteOp::Update {
            key: ItemKey::new("Person#p2", "V0#Person#p2"),
            set,
            condition: Some(widetable_core::kv::Condition::AttributeNotExists("DeletedAt")),
        },
    ];

    match client.transact_write(&config.table_name, &ops).unwrap_err() {
        KvError::TransactionCanceled { failed } => assert_eq!(failed.pk, "Person#p2"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(client
        .get_item(
            &config.table_name,
            &ItemKey::new("Person#p1", "V0#Person#p1"),
            None
        )
        .unwrap()
        .is_none());
}

#[test]
fn concurrent_deletes_commit_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widetable.db");
    let config = TableConfig::default();
    let ids = person_ids("p1");

    {
        let conn = open_db(&path, &config).unwrap();
        store(&conn)
            .put::<Person>(&ctx_at(0), &ids, &person("Ann"))
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            let config = config.clone();
            let ids = ids.clone();
            thread::spawn(move || {
                let conn = open_db(&path, &config).unwrap();
                let store = store(&conn);
                let ctx = RequestContext::new(format!("worker-{worker}"), Utc::now());
                barrier.wait();
                store.delete(&ctx, &ids).map(|_| ())
            })
        })
        .collect();

    let results: Vec<Result<(), StoreError>> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|result| matches!(result, Err(StoreError::Conflict { .. })))
            .count(),
        1
    );
}

#[test]
fn malformed_latest_version_is_an_invalid_item() {
    let config = TableConfig::default();
    let conn = open_db_in_memory(&config).unwrap();
    seed(
        &conn,
        json!({
            "PK": "Person#p1",
            "SK": "V0#Person#p1",
            "EntityKind": "Person",
            "LatestVersion": "x",
            "CreatedAt": "2023-11-14T22:13:20Z",
            "CreatedBy": "tester",
            "GivenName": "Ann"
        }),
    );
    let store = store(&conn);
    let ids = person_ids("p1");

    let err = store
        .put::<Person>(&ctx_at(0), &ids, &person("Annie"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidItem(_)));
    assert!(matches!(
        store.get_current::<Person>(&ctx_at(0), &ids).unwrap_err(),
        StoreError::InvalidItem(_)
    ));
    assert!(store.list_history::<Person>(&ctx_at(0), &ids).unwrap().is_empty());
}

#[test]
fn undecodable_sort_keys_surface_as_decode_errors() {
    let config = TableConfig::default();
    let conn = open_db_in_memory(&config).unwrap();
    let store = store(&conn);

    // Row stored under a valid key whose `SK` attribute disagrees.
    conn.execute(
        &format!(
            "INSERT INTO {} (pk, sk, entity_kind, attributes) VALUES (?1, ?2, ?3, ?4);",
            config.table_name
        ),
        rusqlite::params![
            "Person#p1",
            "V0#Person#p1",
            "Person",
            json!({"PK": "Person#p1", "SK": "V0#Person", "EntityKind": "Person"}).to_string()
        ],
    )
    .unwrap();
    assert!(matches!(
        store.get_current::<Person>(&ctx_at(0), &person_ids("p1")).unwrap_err(),
        StoreError::Decode(_)
    ));

    seed(
        &conn,
        json!({"PK": "Job#j1", "SK": "V0#Log#l1#extra", "EntityKind": "Log"}),
    );
    assert!(matches!(
        store
            .list_by_partition::<JobLog>(&ctx_at(0), EntityKind::Job, "j1", EntityKind::Log)
            .unwrap_err(),
        StoreError::Decode(_)
    ));

    seed(
        &conn,
        json!({"PK": "Person#p2", "SK": "Vx#Person#p2", "EntityKind": "Person"}),
    );
    assert!(matches!(
        store
            .list_history::<Person>(&ctx_at(0), &person_ids("p2"))
            .unwrap_err(),
        StoreError::Decode(_)
    ));
}

#[test]
fn delete_without_counter_tombstones_current_item_only() {
    let config = TableConfig::default();
    let conn = open_db_in_memory(&config).unwrap();
    seed(
        &conn,
        json!({
            "PK": "Person#p1",
            "SK": "V0#Person#p1",
            "EntityKind": "Person",
            "CreatedAt": "2023-11-14T22:13:20Z",
            "CreatedBy": "tester",
            "GivenName": "Ann"
        }),
    );
    let store = store(&conn);
    let ids = person_ids("p1");

    assert_eq!(store.delete(&ctx_at(5), &ids).unwrap(), 0);

    let current = store.get_current::<Person>(&ctx_at(6), &ids).unwrap();
    assert_eq!(current.meta.deleted_at, "2023-11-14T22:13:25Z");
    assert_eq!(current.meta.latest_version, 0);
    assert!(store.list_history::<Person>(&ctx_at(6), &ids).unwrap().is_empty());
}

#[test]
fn store_requires_existing_table_and_index() {
    let conn = Connection::open_in_memory().unwrap();
    let result = VersionedStore::try_new(SqliteKeyValueClient::new(&conn), &TableConfig::default());
    assert!(matches!(
        result,
        Err(StoreError::Kv(KvError::MissingTable(_)))
    ));
}

fn as_item(value: serde_json::Value) -> Item {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn seed(conn: &Connection, value: serde_json::Value) {
    SqliteKeyValueClient::new(conn)
        .transact_write(
            &TableConfig::default().table_name,
            &[WriteOp::Put {
                item: as_item(value),
            }],
        )
        .unwrap();
}
