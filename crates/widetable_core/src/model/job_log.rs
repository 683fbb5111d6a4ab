//! Work log entries: `Job#{jobId}` / `V{n}#Log#{logId}`.
//!
//! Logs are grouped under their job partition, so listing a job's logs is a
//! single partition query.

use crate::model::context::AuditStamp;
use crate::model::key::KeyError;
use crate::model::{Entity, ItemEnvelope, ItemIdentifiers, ViewMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct JobLog;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogPayload {
    pub person_id: String,
    pub hours: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JobLogItem {
    pub person_id: String,
    pub hours: u32,
    #[serde(flatten)]
    pub envelope: ItemEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogView {
    pub job_id: String,
    pub log_id: String,
    pub person_id: String,
    pub hours: u32,
    #[serde(flatten)]
    pub meta: ViewMeta,
}

impl Entity for JobLog {
    type Payload = JobLogPayload;
    type Item = JobLogItem;
    type View = JobLogView;

    fn to_item(
        payload: &JobLogPayload,
        ids: &ItemIdentifiers,
        version: u64,
        latest_version: u64,
        stamp: &AuditStamp,
    ) -> JobLogItem {
        JobLogItem {
            person_id: payload.person_id.clone(),
            hours: payload.hours,
            envelope: ItemEnvelope::new(ids, version, latest_version, stamp),
        }
    }

    fn to_view(item: JobLogItem) -> Result<JobLogView, KeyError> {
        let (partition, sort) = item.envelope.decode_keys()?;
        let meta = item.envelope.meta(&sort);
        Ok(JobLogView {
            job_id: partition.id,
            log_id: sort.id,
            person_id: item.person_id,
            hours: item.hours,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn view_takes_ids_from_keys() {
        let ids = ItemIdentifiers::new(EntityKind::Job, "j1", EntityKind::Log, "l7");
        let stamp = AuditStamp {
            at: "2024-01-01T00:00:00Z".to_string(),
            by: "actor".to_string(),
        };
        let payload = JobLogPayload {
            person_id: "p1".to_string(),
            hours: 6,
        };

        let view = JobLog::to_view(JobLog::to_item(&payload, &ids, 4, 0, &stamp)).unwrap();
        assert_eq!(view.job_id, "j1");
        assert_eq!(view.log_id, "l7");
        assert_eq!(view.hours, 6);
        assert_eq!(view.meta.version, 4);
        assert_eq!(view.meta.latest_version, 0);
    }

    #[test]
    fn item_serializes_with_pascal_case_attributes() {
        let ids = ItemIdentifiers::new(EntityKind::Job, "j1", EntityKind::Log, "l7");
        let stamp = AuditStamp {
            at: "2024-01-01T00:00:00Z".to_string(),
            by: "actor".to_string(),
        };
        let payload = JobLogPayload {
            person_id: "p1".to_string(),
            hours: 2,
        };

        let value = serde_json::to_value(JobLog::to_item(&payload, &ids, 0, 3, &stamp)).unwrap();
        assert_eq!(value["PersonId"], "p1");
        assert_eq!(value["Hours"], 2);
        assert_eq!(value["LatestVersion"], 3);
        assert_eq!(value["SK"], "V0#Log#l7");
    }
}
