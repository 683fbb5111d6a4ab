//! Job log service: many `Log` items grouped under a `Job` partition.
//!
//! Writes must name the log id; `GET` on the partition lists the job's logs.

use crate::kv::KeyValueClient;
use crate::model::context::RequestContext;
use crate::model::job_log::{JobLog, JobLogPayload, JobLogView};
use crate::model::{EntityKind, ItemIdentifiers};
use crate::repo::versioned_store::VersionedStore;
use crate::service::{
    parse_payload, resolve_ids, sorted_json, to_json, EntityService, PathParams, Route,
    ServiceResult, SortIdRule,
};
use serde_json::Value;

pub struct JobLogService<'s, C: KeyValueClient> {
    store: &'s VersionedStore<C>,
    ids: ItemIdentifiers,
}

impl<'s, C: KeyValueClient> JobLogService<'s, C> {
    pub fn new(
        store: &'s VersionedStore<C>,
        params: &PathParams,
        route: Route,
    ) -> ServiceResult<Self> {
        let ids = resolve_ids(
            params,
            route,
            EntityKind::Job,
            EntityKind::Log,
            SortIdRule::Required,
        )?;
        Ok(Self { store, ids })
    }
}

impl<C: KeyValueClient> EntityService for JobLogService<'_, C> {
    fn delete(&self, ctx: &RequestContext) -> ServiceResult<u64> {
        Ok(self.store.delete(ctx, &self.ids)?)
    }

    fn get_partition(&self, ctx: &RequestContext) -> ServiceResult<Value> {
        let views = self.store.list_by_partition::<JobLog>(
            ctx,
            self.ids.partition_kind,
            &self.ids.partition_id,
            self.ids.sort_kind,
        )?;
        sorted_json(views, |view: &JobLogView| &view.meta)
    }

    fn get_item(&self, ctx: &RequestContext) -> ServiceResult<Value> {
        to_json(&self.store.get_current::<JobLog>(ctx, &self.ids)?)
    }

    fn get_sort_kind(&self, ctx: &RequestContext) -> ServiceResult<Value> {
        let views = self.store.list_by_kind::<JobLog>(ctx, EntityKind::Log)?;
        sorted_json(views, |view: &JobLogView| &view.meta)
    }

    fn put(&self, ctx: &RequestContext, body: &str) -> ServiceResult<u64> {
        let payload: JobLogPayload = parse_payload(body)?;
        Ok(self.store.put::<JobLog>(ctx, &self.ids, &payload)?)
    }
}
