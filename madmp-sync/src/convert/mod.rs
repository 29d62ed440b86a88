//! Record converters
//!
//! A converter translates between maDMP datasets/distributions and repository
//! record documents, and creates or updates records through the repository.
//! Several converters may be registered; the [`ConverterRegistry`] picks the
//! first one that matches, or the mandatory fallback.

pub mod generic;
pub mod licenses;
pub mod mapping;
pub mod owners;
pub mod rdm;
pub mod registry;

pub use generic::GenericRecordConverter;
pub use mapping::MappedPeople;
pub use owners::{resolve_owners, RecordOwners, UserDirectory};
pub use rdm::RdmRecordConverter;
pub use registry::ConverterRegistry;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use madmp_common::madmp::{Dataset, Distribution, Dmp};

use crate::error::{SyncError, SyncResult};
use crate::repository::{records, Identity, Record};
use crate::store::UnitOfWork;

/// Everything a conversion may look at
///
/// People and user accounts are resolved once per document and passed in,
/// so converting stays free of I/O.
pub struct ConversionInput<'a> {
    pub distribution: &'a Distribution,
    pub dataset: &'a Dataset,
    pub dmp: &'a Dmp,
    pub people: &'a MappedPeople,
    pub users: &'a UserDirectory,
    pub today: NaiveDate,
}

#[async_trait]
pub trait RecordConverter: Send + Sync {
    /// Name used in configuration
    fn name(&self) -> &'static str;

    /// Whether this converter handles `dataset`; must not have side effects
    fn matches_dataset(&self, dataset: &Dataset, dmp: &Dmp) -> bool;

    /// Whether this converter understands the layout of `record`
    fn matches_record(&self, record: &Record) -> bool;

    /// Build record metadata for one distribution
    fn convert_dataset(&self, input: &ConversionInput<'_>) -> SyncResult<Value>;

    /// Describe a record as a partial maDMP dataset
    /// (`{"distribution": [...], "dataset_id": [...], "metadata": [...]}`)
    fn convert_record(&self, record: &Record) -> Value;

    /// The maDMP `metadata` entry describing this converter's metadata standard
    fn metadata_model(&self) -> Value;

    /// Persist a new draft record
    async fn create_record(
        &self,
        uow: &mut UnitOfWork,
        data: &Value,
        identity: Identity,
    ) -> SyncResult<Record> {
        ensure_can_create(identity)?;
        Ok(records::create_draft(uow.conn(), data).await?)
    }

    /// Apply `data` to an existing record, keeping ownership fields
    ///
    /// Returns `None` if the repository reports nothing to update.
    async fn update_record(
        &self,
        uow: &mut UnitOfWork,
        original: &Record,
        data: &Value,
        identity: Identity,
    ) -> SyncResult<Option<Record>>;
}

pub(crate) fn ensure_can_create(identity: Identity) -> SyncResult<()> {
    if identity.can_create_records() {
        Ok(())
    } else {
        Err(SyncError::PermissionDenied(format!(
            "{:?} may not create records",
            identity
        )))
    }
}

pub(crate) fn ensure_can_update(identity: Identity, record: &Record) -> SyncResult<()> {
    if identity.can_update(record) {
        Ok(())
    } else {
        Err(SyncError::PermissionDenied(format!(
            "{:?} may not update record {}",
            identity, record.id
        )))
    }
}

/// Copy of `data` without `access.owners` and `access.created_by`
pub(crate) fn without_ownership(data: &Value) -> Value {
    let mut data = data.clone();
    if let Some(access) = data.get_mut("access").and_then(Value::as_object_mut) {
        access.remove("owners");
        access.remove("created_by");
    }
    data
}

/// `dataset_id` entry for a record: its DOI when present, else its recid
pub(crate) fn record_dataset_id(record: &Record) -> Value {
    match record.pid("doi") {
        Some(doi) => serde_json::json!({"identifier": doi.pid_value, "type": "doi"}),
        None => serde_json::json!({
            "identifier": record.recid().unwrap_or_default(),
            "type": "other",
        }),
    }
}
