//! Command-line adapter over the entity services.
//!
//! # Responsibility
//! - Translate subcommands into service routes and print JSON results.
//! - Take the actor and request timestamp at this edge.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use widetable_core::db::open_db;
use widetable_core::model::job_log::JobLog;
use widetable_core::model::person::Person;
use widetable_core::model::person_metadata::PersonMetadata;
use widetable_core::service::{self, PathParams, Route};
use widetable_core::{
    init_logging, EntityKind, ItemIdentifiers, KeyValueClient, LoggingConfig, RequestContext,
    SqliteKeyValueClient, TableConfig, VersionedStore,
};

/// Versioned wide-table store CLI
#[derive(Parser, Debug)]
#[command(name = "widetable")]
#[command(about = "Read and write versioned entities in a wide table", long_about = None)]
struct Cli {
    /// Path to the SQLite database file (created when missing)
    #[arg(long)]
    db: PathBuf,

    /// Actor recorded in CreatedBy/DeletedBy
    #[arg(long)]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Current item; without a sort id, the partition's item(s)
    Get(Target),
    /// Current items of one partition
    List(PartitionTarget),
    /// Current items of a sort kind across partitions
    ListKind {
        sort_kind: String,
    },
    /// Write a new version from a JSON body
    Put {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        body: String,
    },
    /// Tombstone the current item and its latest version
    Delete(Target),
    /// Historical versions, oldest first
    History(Target),
}

#[derive(Args, Debug)]
struct PartitionTarget {
    partition_kind: String,
    partition_id: String,
    sort_kind: String,
}

#[derive(Args, Debug)]
struct Target {
    #[command(flatten)]
    partition: PartitionTarget,
    sort_id: Option<String>,
}

impl Target {
    fn params(&self) -> PathParams {
        PathParams {
            partition_kind: self.partition.partition_kind.clone(),
            partition_id: self.partition.partition_id.clone(),
            sort_kind: self.partition.sort_kind.clone(),
            sort_id: self.sort_id.clone().unwrap_or_default(),
        }
    }

    fn route(&self, without_sort_id: Route, with_sort_id: Route) -> Route {
        if self.sort_id.is_some() {
            with_sort_id
        } else {
            without_sort_id
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LoggingConfig::from_env()).map_err(|err| anyhow!(err))?;
    let config = TableConfig::from_env()?;
    let conn = open_db(&cli.db, &config)
        .with_context(|| format!("failed to open {}", cli.db.display()))?;
    let store = VersionedStore::try_new(SqliteKeyValueClient::new(&conn), &config)?;
    let ctx = RequestContext::new(cli.actor.clone(), Utc::now());

    let output = run(&store, &ctx, &cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn run<C: KeyValueClient>(
    store: &VersionedStore<C>,
    ctx: &RequestContext,
    command: &Command,
) -> Result<Value> {
    match command {
        Command::Get(target) => {
            let route = target.route(Route::GetPartition, Route::GetItem);
            let service = service::new(store, &target.params(), route)?;
            Ok(service::handle(service.as_ref(), route, ctx, "")?.unwrap_or(Value::Null))
        }
        Command::List(partition) => {
            let params = PathParams {
                partition_kind: partition.partition_kind.clone(),
                partition_id: partition.partition_id.clone(),
                sort_kind: partition.sort_kind.clone(),
                sort_id: String::new(),
            };
            let service = service::new(store, &params, Route::GetPartition)?;
            Ok(service.get_partition(ctx)?)
        }
        Command::ListKind { sort_kind } => {
            let params = PathParams {
                sort_kind: sort_kind.clone(),
                ..PathParams::default()
            };
            let service = service::new(store, &params, Route::GetSortKind)?;
            Ok(service.get_sort_kind(ctx)?)
        }
        Command::Put { target, body } => {
            let route = target.route(Route::PutItem, Route::PutItemBySortId);
            let service = service::new(store, &target.params(), route)?;
            let version = service.put(ctx, body)?;
            Ok(json!({ "version": version }))
        }
        Command::Delete(target) => {
            let route = target.route(Route::DeleteItem, Route::DeleteItemBySortId);
            let service = service::new(store, &target.params(), route)?;
            let version = service.delete(ctx)?;
            Ok(json!({ "deletedVersion": version }))
        }
        Command::History(target) => history(store, ctx, target),
    }
}

fn history<C: KeyValueClient>(
    store: &VersionedStore<C>,
    ctx: &RequestContext,
    target: &Target,
) -> Result<Value> {
    let partition_kind: EntityKind = target.partition.partition_kind.parse()?;
    let sort_kind: EntityKind = target.partition.sort_kind.parse()?;
    let partition_id = target.partition.partition_id.clone();
    let sort_id = target
        .sort_id
        .clone()
        .unwrap_or_else(|| partition_id.clone());
    let ids = ItemIdentifiers::new(partition_kind, partition_id, sort_kind, sort_id);

    let views = match sort_kind {
        EntityKind::Person => serde_json::to_value(store.list_history::<Person>(ctx, &ids)?)?,
        EntityKind::PersonMetadata => {
            serde_json::to_value(store.list_history::<PersonMetadata>(ctx, &ids)?)?
        }
        EntityKind::Log => serde_json::to_value(store.list_history::<JobLog>(ctx, &ids)?)?,
        other => bail!("no history for sort kind {other}"),
    };
    Ok(views)
}
