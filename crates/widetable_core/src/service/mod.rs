//! Entity services behind the HTTP-style route table.
//!
//! # Responsibility
//! - Validate route path parameters against the entity a sort kind selects.
//! - Run the route's operation on the versioned store and return JSON.
//!
//! # Invariants
//! - A service is only constructed from parameters its route accepts.
//! - Every list result is ordered active-first, then most recent first.
//! - `Person` and `PersonMetadata` are addressed by partition id alone; their
//!   sort id is always the partition id.

pub mod job_log_service;
pub mod person_metadata_service;
pub mod person_service;

use crate::kv::KeyValueClient;
use crate::model::context::RequestContext;
use crate::model::key::validate_id;
use crate::model::{EntityKind, ItemIdentifiers, ViewMeta};
use crate::repo::sorter::sort_by_recency;
use crate::repo::versioned_store::{StoreError, VersionedStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Route keys served by the entity services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    DeleteItem,
    DeleteItemBySortId,
    GetPartition,
    GetItem,
    GetSortKind,
    PutItem,
    PutItemBySortId,
}

impl Route {
    pub const ALL: [Route; 7] = [
        Route::DeleteItem,
        Route::DeleteItemBySortId,
        Route::GetPartition,
        Route::GetItem,
        Route::GetSortKind,
        Route::PutItem,
        Route::PutItemBySortId,
    ];

    pub fn route_key(self) -> &'static str {
        match self {
            Self::DeleteItem => "DELETE /{PartitionKind}/{PartitionId}/{SortKind}",
            Self::DeleteItemBySortId => {
                "DELETE /{PartitionKind}/{PartitionId}/{SortKind}/{SortId}"
            }
            Self::GetPartition => "GET /{PartitionKind}/{PartitionId}/{SortKind}",
            Self::GetItem => "GET /{PartitionKind}/{PartitionId}/{SortKind}/{SortId}",
            Self::GetSortKind => "GET /{SortKind}",
            Self::PutItem => "PUT /{PartitionKind}/{PartitionId}/{SortKind}",
            Self::PutItemBySortId => "PUT /{PartitionKind}/{PartitionId}/{SortKind}/{SortId}",
        }
    }

    fn has_partition(self) -> bool {
        self != Self::GetSortKind
    }

    fn has_sort_id(self) -> bool {
        matches!(
            self,
            Self::DeleteItemBySortId | Self::GetItem | Self::PutItemBySortId
        )
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.route_key())
    }
}

impl FromStr for Route {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|route| route.route_key() == value)
            .ok_or_else(|| ServiceError::UnknownRoute(value.to_string()))
    }
}

/// Raw path parameters of one request. Parameters a route does not carry
/// are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    pub partition_kind: String,
    pub partition_id: String,
    pub sort_kind: String,
    pub sort_id: String,
}

#[derive(Debug)]
pub enum ServiceError {
    UnknownRoute(String),
    InvalidPartitionKind(String),
    InvalidPartitionId(String),
    InvalidSortKind(String),
    InvalidSortId(String),
    /// The entity does not serve this route.
    UnsupportedAction(Route),
    /// No service is bound to this sort kind.
    UnsupportedService(EntityKind),
    /// Request body is not a valid payload for the entity.
    InvalidPayload(serde_json::Error),
    /// A view could not be rendered as JSON.
    Encode(serde_json::Error),
    Store(StoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRoute(value) => write!(f, "unknown route: `{value}`"),
            Self::InvalidPartitionKind(value) => write!(f, "invalid partition kind: `{value}`"),
            Self::InvalidPartitionId(value) => write!(f, "invalid partition id: `{value}`"),
            Self::InvalidSortKind(value) => write!(f, "invalid sort kind: `{value}`"),
            Self::InvalidSortId(value) => write!(f, "invalid sort id: `{value}`"),
            Self::UnsupportedAction(route) => write!(f, "unsupported action: {route}"),
            Self::UnsupportedService(kind) => write!(f, "unsupported service: {kind}"),
            Self::InvalidPayload(err) => write!(f, "invalid request body: {err}"),
            Self::Encode(err) => write!(f, "failed to encode response: {err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPayload(err) | Self::Encode(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Operations of one entity service, bound to validated identifiers.
pub trait EntityService {
    /// Tombstones the addressed item; returns the tombstoned version.
    fn delete(&self, ctx: &RequestContext) -> ServiceResult<u64>;
    /// Everything the partition holds for this entity.
    fn get_partition(&self, ctx: &RequestContext) -> ServiceResult<Value>;
    fn get_item(&self, ctx: &RequestContext) -> ServiceResult<Value>;
    /// Current items of the sort kind across partitions.
    fn get_sort_kind(&self, ctx: &RequestContext) -> ServiceResult<Value>;
    /// Writes a new version from a JSON body; returns the version.
    fn put(&self, ctx: &RequestContext, body: &str) -> ServiceResult<u64>;
}

/// Builds the service selected by `params.sort_kind` and validates the
/// parameters `route` carries.
pub fn new<'s, C: KeyValueClient + 's>(
    store: &'s VersionedStore<C>,
    params: &PathParams,
    route: Route,
) -> ServiceResult<Box<dyn EntityService + 's>> {
    let sort_kind = EntityKind::from_str(&params.sort_kind)
        .map_err(|_| ServiceError::InvalidSortKind(params.sort_kind.clone()))?;

    match sort_kind {
        EntityKind::Person => Ok(Box::new(person_service::PersonService::new(
            store, params, route,
        )?)),
        EntityKind::PersonMetadata => Ok(Box::new(
            person_metadata_service::PersonMetadataService::new(store, params, route)?,
        )),
        EntityKind::Log => Ok(Box::new(job_log_service::JobLogService::new(
            store, params, route,
        )?)),
        other => Err(ServiceError::UnsupportedService(other)),
    }
}

/// Runs the operation `route` names. Writes return no body.
pub fn handle(
    service: &dyn EntityService,
    route: Route,
    ctx: &RequestContext,
    body: &str,
) -> ServiceResult<Option<Value>> {
    match route {
        Route::DeleteItem | Route::DeleteItemBySortId => {
            service.delete(ctx)?;
            Ok(None)
        }
        Route::GetPartition => service.get_partition(ctx).map(Some),
        Route::GetItem => service.get_item(ctx).map(Some),
        Route::GetSortKind => service.get_sort_kind(ctx).map(Some),
        Route::PutItem | Route::PutItemBySortId => {
            service.put(ctx, body)?;
            Ok(None)
        }
    }
}

/// How an entity derives its sort id from the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortIdRule {
    /// One item per partition; routes carrying a sort id are rejected.
    SameAsPartition,
    /// Writes must name the sort id.
    Required,
}

/// Validates `params` for `route` and resolves the item identifiers.
fn resolve_ids(
    params: &PathParams,
    route: Route,
    partition_kind: EntityKind,
    sort_kind: EntityKind,
    rule: SortIdRule,
) -> ServiceResult<ItemIdentifiers> {
    let mut ids = ItemIdentifiers::new(partition_kind, "", sort_kind, "");
    if params.sort_kind != sort_kind.as_str() {
        return Err(ServiceError::InvalidSortKind(params.sort_kind.clone()));
    }
    if !route.has_partition() {
        return Ok(ids);
    }

    if params.partition_kind != partition_kind.as_str() {
        return Err(ServiceError::InvalidPartitionKind(
            params.partition_kind.clone(),
        ));
    }
    validate_id(&params.partition_id)
        .map_err(|_| ServiceError::InvalidPartitionId(params.partition_id.clone()))?;
    ids.partition_id = params.partition_id.clone();

    match rule {
        SortIdRule::SameAsPartition => {
            if route.has_sort_id() {
                return Err(ServiceError::UnsupportedAction(route));
            }
            ids.sort_id = ids.partition_id.clone();
        }
        SortIdRule::Required => {
            if matches!(route, Route::DeleteItem | Route::PutItem) {
                return Err(ServiceError::UnsupportedAction(route));
            }
            if route.has_sort_id() {
                validate_id(&params.sort_id)
                    .map_err(|_| ServiceError::InvalidSortId(params.sort_id.clone()))?;
                ids.sort_id = params.sort_id.clone();
            }
        }
    }
    Ok(ids)
}

fn parse_payload<T: DeserializeOwned>(body: &str) -> ServiceResult<T> {
    serde_json::from_str(body).map_err(ServiceError::InvalidPayload)
}

fn to_json<T: Serialize>(value: &T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(ServiceError::Encode)
}

/// Orders views for presentation and renders them as a JSON array.
fn sorted_json<T: Serialize>(
    mut views: Vec<T>,
    meta: impl Fn(&T) -> &ViewMeta,
) -> ServiceResult<Value> {
    sort_by_recency(
        &mut views,
        |view| meta(view).deleted_at.as_str(),
        |view| meta(view).created_at.as_str(),
    );
    to_json(&views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(
        partition_kind: &str,
        partition_id: &str,
        sort_kind: &str,
        sort_id: &str,
    ) -> PathParams {
        PathParams {
            partition_kind: partition_kind.to_string(),
            partition_id: partition_id.to_string(),
            sort_kind: sort_kind.to_string(),
            sort_id: sort_id.to_string(),
        }
    }

    #[test]
    fn route_keys_round_trip() {
        for route in Route::ALL {
            assert_eq!(route.route_key().parse::<Route>().unwrap(), route);
        }
        assert!(matches!(
            "PATCH /{SortKind}".parse::<Route>(),
            Err(ServiceError::UnknownRoute(_))
        ));
    }

    #[test]
    fn single_item_entities_reuse_partition_id() {
        let ids = resolve_ids(
            &params("Person", "p1", "PersonMetadata", ""),
            Route::PutItem,
            EntityKind::Person,
            EntityKind::PersonMetadata,
            SortIdRule::SameAsPartition,
        )
        .unwrap();
        assert_eq!(ids.sort_id, "p1");

        let err = resolve_ids(
            &params("Person", "p1", "PersonMetadata", "p1"),
            Route::GetItem,
            EntityKind::Person,
            EntityKind::PersonMetadata,
            SortIdRule::SameAsPartition,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedAction(Route::GetItem)));
    }

    #[test]
    fn grouped_entities_require_sort_id_for_writes() {
        for route in [Route::DeleteItem, Route::PutItem] {
            let err = resolve_ids(
                &params("Job", "j1", "Log", ""),
                route,
                EntityKind::Job,
                EntityKind::Log,
                SortIdRule::Required,
            )
            .unwrap_err();
            assert!(matches!(err, ServiceError::UnsupportedAction(_)));
        }

        let err = resolve_ids(
            &params("Job", "j1", "Log", "a#b"),
            Route::PutItemBySortId,
            EntityKind::Job,
            EntityKind::Log,
            SortIdRule::Required,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSortId(_)));
    }

    #[test]
    fn sort_kind_route_ignores_partition_params() {
        let ids = resolve_ids(
            &params("", "", "Log", ""),
            Route::GetSortKind,
            EntityKind::Job,
            EntityKind::Log,
            SortIdRule::Required,
        )
        .unwrap();
        assert_eq!(ids.sort_kind, EntityKind::Log);
        assert!(ids.partition_id.is_empty());
    }
}
