//! Versioned single-table persistence for widetable.
//! Keys, versioning and soft-delete rules live here; adapters only translate
//! requests into `service` routes.

pub mod config;
pub mod db;
pub mod kv;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, LoggingConfig, TableConfig};
pub use kv::sqlite::SqliteKeyValueClient;
pub use kv::{KeyValueClient, KvError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::context::RequestContext;
pub use model::{Entity, EntityKind, ItemIdentifiers, ViewMeta};
pub use repo::versioned_store::{StoreError, StoreResult, VersionedStore};
pub use service::{EntityService, PathParams, Route, ServiceError, ServiceResult};
