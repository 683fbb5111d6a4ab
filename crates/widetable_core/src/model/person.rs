//! Person entity: `Person#{personId}` / `V{n}#Person#{personId}`.

use crate::model::context::AuditStamp;
use crate::model::key::KeyError;
use crate::model::{Entity, ItemEnvelope, ItemIdentifiers, ViewMeta};
use serde::{Deserialize, Serialize};

/// Marker type selecting the person projection.
#[derive(Debug, Clone, Copy)]
pub struct Person;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonPayload {
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PersonItem {
    pub given_name: String,
    pub family_name: String,
    #[serde(flatten)]
    pub envelope: ItemEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonView {
    pub person_id: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(flatten)]
    pub meta: ViewMeta,
}

impl Entity for Person {
    type Payload = PersonPayload;
    type Item = PersonItem;
    type View = PersonView;

    fn to_item(
        payload: &PersonPayload,
        ids: &ItemIdentifiers,
        version: u64,
        latest_version: u64,
        stamp: &AuditStamp,
    ) -> PersonItem {
        PersonItem {
            given_name: payload.given_name.clone(),
            family_name: payload.family_name.clone(),
            envelope: ItemEnvelope::new(ids, version, latest_version, stamp),
        }
    }

    fn to_view(item: PersonItem) -> Result<PersonView, KeyError> {
        let (partition, sort) = item.envelope.decode_keys()?;
        Ok(PersonView {
            person_id: partition.id,
            meta: item.envelope.meta(&sort),
            given_name: item.given_name,
            family_name: item.family_name,
        })
    }
}
