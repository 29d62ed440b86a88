//! Converter for the DataCite-based RDM record model

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use madmp_common::madmp::{Dataset, Dmp};
use madmp_common::MadmpConfig;

use super::{
    ensure_can_update, licenses, mapping, owners, record_dataset_id, without_ownership,
    ConversionInput, RecordConverter,
};
use crate::error::SyncResult;
use crate::repository::{records, Identity, Record};
use crate::store::UnitOfWork;

pub struct RdmRecordConverter {
    config: Arc<MadmpConfig>,
}

impl RdmRecordConverter {
    pub const NAME: &'static str = "rdm";

    pub fn new(config: Arc<MadmpConfig>) -> Self {
        Self { config }
    }

    fn declares_datacite(&self, identifier: &str) -> bool {
        let normalize = |s: &str| s.trim().trim_end_matches('/').to_ascii_lowercase();
        let identifier = normalize(identifier);
        self.config
            .sync
            .datacite_schema_identifiers
            .iter()
            .any(|known| normalize(known) == identifier)
    }

    fn access_url(&self, record: &Record) -> Option<String> {
        let host = self.config.host.url.as_deref()?;
        let recid = record.recid()?;
        Some(format!("{}/records/{}", host.trim_end_matches('/'), recid))
    }
}

#[async_trait]
impl RecordConverter for RdmRecordConverter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn matches_dataset(&self, dataset: &Dataset, _dmp: &Dmp) -> bool {
        dataset.metadata_standard_ids().any(|id| self.declares_datacite(id))
    }

    fn matches_record(&self, record: &Record) -> bool {
        record.data["metadata"]["titles"].is_array() && record.data["access"].is_object()
    }

    fn convert_dataset(&self, input: &ConversionInput<'_>) -> SyncResult<Value> {
        let sync = &self.config.sync;
        let dataset = input.dataset;
        let distribution = input.distribution;

        let record_owners = owners::resolve_owners(input.dmp, sync, input.users)?;
        let access_right = mapping::map_access_right(distribution, sync);

        let mut metadata = Map::new();
        if let Some(contact) = &input.people.contact {
            metadata.insert("contact".to_string(), json!(contact));
        }
        metadata.insert(
            "resource_type".to_string(),
            mapping::map_resource_type(dataset, &self.config.translations),
        );
        metadata.insert("creators".to_string(), json!(input.people.creators));
        metadata.insert("titles".to_string(), json!([mapping::map_title(dataset, sync)]));
        metadata.insert("contributors".to_string(), json!(input.people.contributors));
        metadata.insert("dates".to_string(), json!([]));
        metadata.insert("language".to_string(), json!(mapping::map_language(dataset, sync)));
        metadata.insert(
            "licenses".to_string(),
            Value::Array(distribution.license.iter().map(licenses::translate_license).collect()),
        );
        metadata.insert(
            "descriptions".to_string(),
            json!([mapping::map_description(dataset, sync)]),
        );
        metadata.insert(
            "publication_date".to_string(),
            json!(input.today.format("%Y-%m-%d").to_string()),
        );
        if let Some(embargo) = mapping::embargo_date(distribution, input.today) {
            metadata.insert(
                "embargo_date".to_string(),
                json!(embargo.format("%Y-%m-%d").to_string()),
            );
        }

        Ok(json!({
            "access": {
                "access_right": access_right,
                "files_restricted": access_right != "open",
                "metadata_restricted": false,
                "owners": record_owners.owners,
                "created_by": record_owners.created_by,
            },
            "metadata": metadata,
        }))
    }

    fn convert_record(&self, record: &Record) -> Value {
        let metadata = &record.data["metadata"];
        let start_date = metadata["embargo_date"]
            .as_str()
            .or_else(|| metadata["publication_date"].as_str())
            .unwrap_or_default();

        let licenses: Vec<Value> = metadata["licenses"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|l| json!({"license_ref": l["uri"], "start_date": start_date}))
                    .collect()
            })
            .unwrap_or_default();

        let mut distribution = json!({
            "title": metadata["titles"][0]["title"],
            "description": metadata["descriptions"][0]["description"],
            "data_access": record.data["access"]["access_right"],
            "license": licenses,
            "host": {
                "url": self.config.host.url,
                "title": self.config.host.title,
            },
        });
        if let Some(url) = self.access_url(record) {
            distribution["access_url"] = json!(url);
        }

        json!({
            "distribution": [distribution],
            "dataset_id": [record_dataset_id(record)],
            "metadata": [self.metadata_model()],
        })
    }

    fn metadata_model(&self) -> Value {
        let identifier = self
            .config
            .sync
            .datacite_schema_identifiers
            .first()
            .cloned()
            .unwrap_or_default();

        json!({
            "description": "Datacite-based metadata model for RDM records",
            "language": "eng",
            "metadata_standard_id": {"identifier": identifier, "type": "url"},
        })
    }

    /// Merge new metadata into the original; owners, creator and the
    /// original publication date are kept
    async fn update_record(
        &self,
        uow: &mut UnitOfWork,
        original: &Record,
        data: &Value,
        identity: Identity,
    ) -> SyncResult<Option<Record>> {
        ensure_can_update(identity, original)?;

        let incoming = without_ownership(data);
        let mut merged = original.data.clone();
        if !merged.is_object() {
            merged = json!({});
        }

        for section in ["access", "metadata"] {
            let Some(new_fields) = incoming.get(section).and_then(Value::as_object) else {
                continue;
            };
            if !merged[section].is_object() {
                merged[section] = json!({});
            }
            if let Some(target) = merged[section].as_object_mut() {
                for (key, value) in new_fields {
                    if section == "metadata" && key == "publication_date" && target.contains_key(key) {
                        continue;
                    }
                    target.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(records::update_record(uow, original.id, &merged).await?)
    }
}
