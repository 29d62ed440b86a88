//! Lifecycle event observer
//!
//! | event                         | notification                      |
//! |-------------------------------|-----------------------------------|
//! | dataset added to a DMP        | POST dataset to the DMP endpoint  |
//! | dataset re-pointed to record  | PATCH dataset                     |
//! | record updated                | PATCH dataset referencing it      |
//! | dataset deleted               | DELETE dataset                    |
//! | record deleted                | DELETE dataset referencing it     |
//!
//! Everything else is only logged.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use madmp_common::MadmpEvent;

use super::{DmpToolClient, NotifyError};
use crate::convert::ConverterRegistry;
use crate::repository::{records, Record};
use crate::store::{Dataset, Store};

#[derive(Clone)]
pub struct Observer {
    store: Store,
    converters: Arc<ConverterRegistry>,
    client: DmpToolClient,
}

impl Observer {
    pub fn new(store: Store, converters: Arc<ConverterRegistry>, client: DmpToolClient) -> Self {
        Self {
            store,
            converters,
            client,
        }
    }

    /// React to one event
    ///
    /// Returns `true` if a notification was delivered.
    pub async fn handle(&self, event: &MadmpEvent) -> Result<bool, NotifyError> {
        if !self.client.config().send_notifications {
            return Ok(false);
        }

        match event {
            MadmpEvent::DatasetAddedToDmp { dmp_id, dataset_id, .. } => {
                let mut conn = self.store.acquire().await?;
                let Some(dataset) = Dataset::get_by_dataset_id(&mut conn, dataset_id).await? else {
                    return Ok(false);
                };
                let Some(record) = dataset.record(&mut conn).await? else {
                    debug!(dataset_id = %dataset_id, "Dataset has no record yet, nothing to announce");
                    return Ok(false);
                };
                drop(conn);

                self.client
                    .send_dataset_addition(dmp_id, &self.fragment(&record))
                    .await
            }

            MadmpEvent::DatasetRecordChanged {
                dataset_id,
                new_record: Some(record_id),
                ..
            } => {
                let Some(record) = self.load_record(*record_id, false).await? else {
                    return Ok(false);
                };
                self.client
                    .send_distribution_update(dataset_id, &self.fragment(&record))
                    .await
            }

            MadmpEvent::RecordUpdated { record_id, .. } => {
                let Some((record, dataset)) = self.record_with_dataset(*record_id, false).await? else {
                    return Ok(false);
                };
                self.client
                    .send_distribution_update(&dataset.dataset_id, &self.fragment(&record))
                    .await
            }

            MadmpEvent::DatasetDeleted {
                dataset_id, record_id, ..
            } => {
                let record = match record_id {
                    Some(id) => self.load_record(*id, true).await?,
                    None => None,
                };
                let body = match &record {
                    Some(record) => self.fragment(record),
                    None => json!({"dataset_id": [{"identifier": dataset_id, "type": "other"}]}),
                };
                self.client.send_distribution_deletion(dataset_id, &body).await
            }

            MadmpEvent::RecordDeleted { record_id, .. } => {
                let Some((record, dataset)) = self.record_with_dataset(*record_id, true).await? else {
                    return Ok(false);
                };
                self.client
                    .send_distribution_deletion(&dataset.dataset_id, &self.fragment(&record))
                    .await
            }

            other => {
                debug!(event = other.name(), "No notification for event");
                Ok(false)
            }
        }
    }

    /// Handle events in order, logging failures
    ///
    /// Returns the number of delivered notifications.
    pub async fn drain(&self, events: &[MadmpEvent]) -> usize {
        let mut delivered = 0;
        for event in events {
            match self.handle(event).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!(event = event.name(), error = %e, "Notification failed"),
            }
        }
        delivered
    }

    /// Consume events from the bus until it closes
    pub async fn run(self, mut rx: broadcast::Receiver<MadmpEvent>) {
        info!("Notification observer started");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle(&event).await {
                        warn!(event = event.name(), error = %e, "Notification failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Observer fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Notification observer stopped");
    }

    fn fragment(&self, record: &Record) -> Value {
        self.converters.for_record(record).convert_record(record)
    }

    async fn load_record(&self, id: Uuid, with_deleted: bool) -> Result<Option<Record>, NotifyError> {
        let mut conn = self.store.acquire().await?;
        let record = if with_deleted {
            records::get_record_with_deleted(&mut conn, id).await?
        } else {
            records::get_record(&mut conn, id).await?
        };
        Ok(record)
    }

    /// A record and the dataset referencing it, if both exist
    async fn record_with_dataset(
        &self,
        id: Uuid,
        with_deleted: bool,
    ) -> Result<Option<(Record, Dataset)>, NotifyError> {
        let Some(record) = self.load_record(id, with_deleted).await? else {
            return Ok(None);
        };

        let mut conn = self.store.acquire().await?;
        match Dataset::get_by_record(&mut conn, &record).await? {
            Some(dataset) => Ok(Some((record, dataset))),
            None => {
                debug!(record_id = %id, "Record not referenced by any dataset");
                Ok(None)
            }
        }
    }
}
