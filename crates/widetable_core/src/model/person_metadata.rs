//! Person metadata: one item per person, stored under the person partition.

use crate::model::context::AuditStamp;
use crate::model::key::KeyError;
use crate::model::{Entity, ItemEnvelope, ItemIdentifiers, ViewMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct PersonMetadata;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMetadataPayload {
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PersonMetadataItem {
    pub given_name: String,
    pub family_name: String,
    #[serde(flatten)]
    pub envelope: ItemEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMetadataView {
    pub person_id: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(flatten)]
    pub meta: ViewMeta,
}

impl Entity for PersonMetadata {
    type Payload = PersonMetadataPayload;
    type Item = PersonMetadataItem;
    type View = PersonMetadataView;

    fn to_item(
        payload: &PersonMetadataPayload,
        ids: &ItemIdentifiers,
        version: u64,
        latest_version: u64,
        stamp: &AuditStamp,
    ) -> PersonMetadataItem {
        PersonMetadataItem {
            given_name: payload.given_name.clone(),
            family_name: payload.family_name.clone(),
            envelope: ItemEnvelope::new(ids, version, latest_version, stamp),
        }
    }

    fn to_view(item: PersonMetadataItem) -> Result<PersonMetadataView, KeyError> {
        let (partition, sort) = item.envelope.decode_keys()?;
        Ok(PersonMetadataView {
            person_id: partition.id,
            meta: item.envelope.meta(&sort),
            given_name: item.given_name,
            family_name: item.family_name,
        })
    }
}
