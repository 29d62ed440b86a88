//! Fallback converter with a minimal flat record layout

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use madmp_common::madmp::{Dataset, Dmp};
use madmp_common::MadmpConfig;

use super::{
    ensure_can_update, mapping, owners, record_dataset_id, without_ownership, ConversionInput,
    RecordConverter,
};
use crate::error::SyncResult;
use crate::repository::{records, Identity, Record};
use crate::store::UnitOfWork;

/// Matches every dataset and every record
pub struct GenericRecordConverter {
    config: Arc<MadmpConfig>,
}

impl GenericRecordConverter {
    pub const NAME: &'static str = "generic";

    pub fn new(config: Arc<MadmpConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RecordConverter for GenericRecordConverter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn matches_dataset(&self, _dataset: &Dataset, _dmp: &Dmp) -> bool {
        true
    }

    fn matches_record(&self, _record: &Record) -> bool {
        true
    }

    fn convert_dataset(&self, input: &ConversionInput<'_>) -> SyncResult<Value> {
        let sync = &self.config.sync;
        let record_owners = owners::resolve_owners(input.dmp, sync, input.users)?;

        Ok(json!({
            "access": {
                "access_right": mapping::map_access_right(input.distribution, sync),
                "owners": record_owners.owners,
                "created_by": record_owners.created_by,
            },
            "metadata": {
                "title": input.dataset.title,
                "description": input.dataset.description,
                "language": mapping::map_language(input.dataset, sync),
                "dataset_id": input.dataset.id(),
                "contact": input.people.contact,
            },
        }))
    }

    fn convert_record(&self, record: &Record) -> Value {
        json!({
            "distribution": [{
                "title": record.data["metadata"]["title"],
                "description": record.data["metadata"]["description"],
                "data_access": record.data["access"]["access_right"],
                "host": {
                    "url": self.config.host.url,
                    "title": self.config.host.title,
                },
            }],
            "dataset_id": [record_dataset_id(record)],
            "metadata": [self.metadata_model()],
        })
    }

    fn metadata_model(&self) -> Value {
        json!({
            "description": "Generic flat metadata model",
            "language": "eng",
            "metadata_standard_id": {"identifier": "generic", "type": "other"},
        })
    }

    /// Replace the metadata section, keep everything else
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
        merged["metadata"] = incoming["metadata"].clone();
        if let Some(access_right) = incoming["access"].get("access_right") {
            if !merged["access"].is_object() {
                merged["access"] = json!({});
            }
            merged["access"]["access_right"] = access_right.clone();
        }

        Ok(records::update_record(uow, original.id, &merged).await?)
    }
}
