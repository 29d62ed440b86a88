//! Reconciliation engine
//!
//! Brings the stored DMP aggregate in line with one maDMP document:
//!
//! 1. resolve or create the DMP by its external id
//! 2. remember which datasets were linked before
//! 3. map contact and contributors once for the whole document
//! 4. for every dataset with a distribution hosted here: convert it, resolve
//!    or create the dataset entity, link it, and then discover, create or
//!    (in hard mode) update its record
//! 5. unlink datasets the document no longer mentions
//! 6. commit everything at once, or nothing
//!
//! Lifecycle events produced on the way are published only after the commit.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use madmp_common::madmp::Dmp;
use madmp_common::{MadmpConfig, MadmpEvent};

use crate::convert::mapping::matching_distributions;
use crate::convert::owners::document_emails;
use crate::convert::{ConversionInput, ConverterRegistry, MappedPeople, RecordConverter, UserDirectory};
use crate::error::{SyncError, SyncResult};
use crate::repository::{fetch_unassigned_record, Identity};
use crate::store::{DataManagementPlan, Dataset, Store, UnitOfWork};

/// How already-linked records are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Only dataset links are maintained
    #[default]
    Soft,
    /// Every linked record is refreshed from the document
    Hard,
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(SyncMode::Soft),
            "hard" => Ok(SyncMode::Hard),
            other => Err(SyncError::InvalidDocument(format!("unknown sync mode '{}'", other))),
        }
    }
}

/// What one reconciliation run did (dataset ids in document order)
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub dmp: DataManagementPlan,
    pub dmp_created: bool,
    pub created_datasets: Vec<String>,
    pub linked: Vec<String>,
    pub unlinked: Vec<String>,
    pub created_records: Vec<String>,
    pub discovered_records: Vec<String>,
    pub updated_records: Vec<String>,
    /// Events published on commit (or that would have been, for a dry run)
    #[serde(skip)]
    pub events: Vec<MadmpEvent>,
    pub committed: bool,
}

impl ReconcileOutcome {
    fn new(dmp: DataManagementPlan, dmp_created: bool) -> Self {
        Self {
            dmp,
            dmp_created,
            created_datasets: Vec::new(),
            linked: Vec::new(),
            unlinked: Vec::new(),
            created_records: Vec::new(),
            discovered_records: Vec::new(),
            updated_records: Vec::new(),
            events: Vec::new(),
            committed: false,
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    config: Arc<MadmpConfig>,
    converters: Arc<ConverterRegistry>,
    store: Store,
}

impl Reconciler {
    pub fn new(config: Arc<MadmpConfig>, converters: Arc<ConverterRegistry>, store: Store) -> Self {
        Self {
            config,
            converters,
            store,
        }
    }

    /// Engine with the converters named in the configuration
    pub fn from_config(config: Arc<MadmpConfig>, store: Store) -> SyncResult<Self> {
        let converters = Arc::new(ConverterRegistry::from_config(&config)?);
        Ok(Self::new(config, converters, store))
    }

    pub fn config(&self) -> &Arc<MadmpConfig> {
        &self.config
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reconcile `dmp` and commit
    ///
    /// `identity` defaults to [`Identity::System`].
    pub async fn reconcile(
        &self,
        dmp: &Dmp,
        mode: SyncMode,
        identity: Option<Identity>,
    ) -> SyncResult<ReconcileOutcome> {
        self.run(dmp, mode, identity, true).await
    }

    /// Reconcile `dmp` and roll everything back
    pub async fn dry_run(
        &self,
        dmp: &Dmp,
        mode: SyncMode,
        identity: Option<Identity>,
    ) -> SyncResult<ReconcileOutcome> {
        self.run(dmp, mode, identity, false).await
    }

    async fn run(
        &self,
        dmp: &Dmp,
        mode: SyncMode,
        identity: Option<Identity>,
        commit: bool,
    ) -> SyncResult<ReconcileOutcome> {
        if let Err(problems) = dmp.validate() {
            return Err(SyncError::InvalidDocument(problems.join("; ")));
        }

        let identity = identity.unwrap_or(Identity::System);
        let mut uow = self.store.begin().await?;

        let mut outcome = match self.apply(&mut uow, dmp, mode, identity).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(dmp_id = %dmp.id(), error = %e, "Reconciliation aborted, rolling back");
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        if commit {
            outcome.events = uow.commit().await?;
            outcome.committed = true;
        } else {
            outcome.events = uow.pending_events().to_vec();
            uow.rollback().await?;
        }

        info!(
            dmp_id = %outcome.dmp.dmp_id,
            mode = ?mode,
            committed = outcome.committed,
            created_datasets = outcome.created_datasets.len(),
            linked = outcome.linked.len(),
            unlinked = outcome.unlinked.len(),
            created_records = outcome.created_records.len(),
            discovered_records = outcome.discovered_records.len(),
            updated_records = outcome.updated_records.len(),
            "Reconciled DMP"
        );

        Ok(outcome)
    }

    async fn apply(
        &self,
        uow: &mut UnitOfWork,
        dmp: &Dmp,
        mode: SyncMode,
        identity: Identity,
    ) -> SyncResult<ReconcileOutcome> {
        let sync = &self.config.sync;
        let today = chrono::Utc::now().date_naive();

        let (plan, dmp_created) = match DataManagementPlan::get_by_dmp_id(uow.conn(), dmp.id()).await? {
            Some(plan) => (plan, false),
            None => (DataManagementPlan::create(uow, dmp.id(), &[], false).await?, true),
        };
        let mut outcome = ReconcileOutcome::new(plan.clone(), dmp_created);

        let mut old_datasets = plan.datasets(uow.conn()).await?;

        let people = MappedPeople::from_dmp(dmp, sync);
        let users = UserDirectory::load(uow.conn(), document_emails(dmp)).await?;

        for dataset_doc in &dmp.dataset {
            let dataset_id = dataset_doc.id();
            let distributions = matching_distributions(dataset_doc, &self.config);

            if distributions.is_empty() {
                debug!(dataset_id = %dataset_id, "No distribution hosted here, skipping");
                continue;
            }

            if distributions.len() > 1 && !sync.allow_multiple_distributions {
                return Err(SyncError::DuplicateDistribution {
                    dataset_id: dataset_id.to_string(),
                    count: distributions.len(),
                });
            }

            let mut conversions: Vec<(serde_json::Value, Arc<dyn RecordConverter>)> = Vec::new();
            for distribution in &distributions {
                let converter = self.converters.for_dataset(dataset_doc, dmp);
                let data = converter.convert_dataset(&ConversionInput {
                    distribution,
                    dataset: dataset_doc,
                    dmp,
                    people: &people,
                    users: &users,
                    today,
                })?;
                conversions.push((data, converter));
            }

            let (mut dataset, is_new) = match Dataset::get_by_dataset_id(uow.conn(), dataset_id).await? {
                Some(found) => {
                    old_datasets.retain(|old| old.id != found.id);
                    (found, false)
                }
                None => {
                    let created = Dataset::create(uow, dataset_id, None, &[], false).await?;
                    outcome.created_datasets.push(dataset_id.to_string());
                    (created, true)
                }
            };

            if plan.add_dataset(uow, &dataset).await? {
                outcome.linked.push(dataset_id.to_string());
            }

            let (data, converter) = &conversions[0];

            match dataset.record(uow.conn()).await? {
                None => {
                    let access_url = distributions[0].access_url.as_deref();
                    let record = match fetch_unassigned_record(uow.conn(), dataset_id, access_url).await? {
                        Some(existing) => {
                            debug!(dataset_id = %dataset_id, record_id = %existing.id, "Discovered unassigned record");
                            outcome.discovered_records.push(dataset_id.to_string());
                            existing
                        }
                        None => {
                            let created = converter.create_record(uow, data, identity).await?;
                            debug!(dataset_id = %dataset_id, record_id = %created.id, converter = converter.name(), "Created record");
                            outcome.created_records.push(dataset_id.to_string());
                            created
                        }
                    };
                    dataset
                        .set_record(uow, &record, &sync.preferred_pid_types, !is_new)
                        .await?;
                }
                Some(record) if mode == SyncMode::Hard => {
                    if converter.update_record(uow, &record, data, identity).await?.is_some() {
                        outcome.updated_records.push(dataset_id.to_string());
                    } else {
                        debug!(dataset_id = %dataset_id, record_id = %record.id, "Nothing to update");
                    }
                }
                Some(_) => {}
            }
        }

        for stale in old_datasets {
            if plan.remove_dataset(uow, &stale).await? {
                outcome.unlinked.push(stale.dataset_id);
            }
        }

        Ok(outcome)
    }
}
