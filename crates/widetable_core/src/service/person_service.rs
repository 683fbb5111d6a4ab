//! Person service: one person per `Person` partition.

use crate::kv::KeyValueClient;
use crate::model::context::RequestContext;
use crate::model::person::{Person, PersonPayload, PersonView};
use crate::model::{EntityKind, ItemIdentifiers};
use crate::repo::versioned_store::VersionedStore;
use crate::service::{
    parse_payload, resolve_ids, sorted_json, to_json, EntityService, PathParams, Route,
    ServiceError, ServiceResult, SortIdRule,
};
use serde_json::Value;

pub struct PersonService<'s, C: KeyValueClient> {
    store: &'s VersionedStore<C>,
    ids: ItemIdentifiers,
}

impl<'s, C: KeyValueClient> PersonService<'s, C> {
    pub fn new(
        store: &'s VersionedStore<C>,
        params: &PathParams,
        route: Route,
    ) -> ServiceResult<Self> {
        let ids = resolve_ids(
            params,
            route,
            EntityKind::Person,
            EntityKind::Person,
            SortIdRule::SameAsPartition,
        )?;
        Ok(Self { store, ids })
    }
}

impl<C: KeyValueClient> EntityService for PersonService<'_, C> {
    fn delete(&self, ctx: &RequestContext) -> ServiceResult<u64> {
        Ok(self.store.delete(ctx, &self.ids)?)
    }

    fn get_partition(&self, ctx: &RequestContext) -> ServiceResult<Value> {
        to_json(&self.store.get_current::<Person>(ctx, &self.ids)?)
    }

    fn get_item(&self, _ctx: &RequestContext) -> ServiceResult<Value> {
        Err(ServiceError::UnsupportedAction(Route::GetItem))
    }

    fn get_sort_kind(&self, ctx: &RequestContext) -> ServiceResult<Value> {
        let views = self
            .store
            .list_by_kind::<Person>(ctx, EntityKind::Person)?;
        sorted_json(views, |view: &PersonView| &view.meta)
    }

    fn put(&self, ctx: &RequestContext, body: &str) -> ServiceResult<u64> {
        let payload: PersonPayload = parse_payload(body)?;
        Ok(self.store.put::<Person>(ctx, &self.ids, &payload)?)
    }
}
