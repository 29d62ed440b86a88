//! Dataset entities
//!
//! A dataset is the local bookkeeping object for one dataset described in a
//! DMP. It points at its repository record through a PID (`record_pid_id`),
//! never at the record directly:
//!
//! - no PID: the dataset is an **orphan** (no record created yet)
//! - PID that no longer resolves to a live record: the dataset is a **zombie**

use madmp_common::uuid_utils;
use madmp_common::{Error, MadmpEvent, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use super::{DataManagementPlan, UnitOfWork};
use crate::repository::{self, pids, PersistentIdentifier, PidStatus, Record};

#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub id: Uuid,
    pub dataset_id: String,
    pub record_pid_id: Option<i64>,
}

/// Same entity, or same external id pointing at the same PID
impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            || (self.dataset_id == other.dataset_id && self.record_pid_id == other.record_pid_id)
    }
}

impl Eq for Dataset {}

const SELECT_DATASET: &str = "SELECT d.id, d.dataset_id, d.record_pid_id FROM dmp_dataset d";

impl Dataset {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let id: String = row.get("id");
        Ok(Self {
            id: uuid_utils::parse(&id)?,
            dataset_id: row.get("dataset_id"),
            record_pid_id: row.get("record_pid_id"),
        })
    }

    async fn fetch_all(conn: &mut SqliteConnection, sql: &str) -> Result<Vec<Self>> {
        let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
        rows.iter().map(Self::from_row).collect()
    }

    pub async fn get_by_dataset_id(conn: &mut SqliteConnection, dataset_id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("{} WHERE d.dataset_id = ?", SELECT_DATASET))
            .bind(dataset_id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    /// Find the dataset pointing at `pid`
    ///
    /// With `strict == false` a dataset pointing at any sibling PID (one that
    /// resolves to the same object) matches too.
    pub async fn get_by_record_pid(
        conn: &mut SqliteConnection,
        pid: &PersistentIdentifier,
        strict: bool,
    ) -> Result<Option<Self>> {
        let row = match (strict, pid.object_uuid) {
            (false, Some(object)) => {
                sqlx::query(&format!(
                    r#"{}
                    JOIN pidstore_pid p ON p.id = d.record_pid_id
                    WHERE d.record_pid_id = ? OR p.object_uuid = ?
                    ORDER BY d.created_at, d.id
                    LIMIT 1"#,
                    SELECT_DATASET
                ))
                .bind(pid.id)
                .bind(object.to_string())
                .fetch_optional(&mut *conn)
                .await?
            }
            _ => {
                sqlx::query(&format!("{} WHERE d.record_pid_id = ?", SELECT_DATASET))
                    .bind(pid.id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
        };

        row.as_ref().map(Self::from_row).transpose()
    }

    /// Find the dataset pointing at any PID of `record`
    pub async fn get_by_record(conn: &mut SqliteConnection, record: &Record) -> Result<Option<Self>> {
        let row = sqlx::query(&format!(
            r#"{}
            JOIN pidstore_pid p ON p.id = d.record_pid_id
            WHERE p.object_uuid = ?
            ORDER BY d.created_at, d.id
            LIMIT 1"#,
            SELECT_DATASET
        ))
        .bind(record.id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        Self::fetch_all(conn, &format!("{} ORDER BY d.dataset_id", SELECT_DATASET)).await
    }

    /// Datasets without a record reference
    pub async fn get_orphans(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        Self::fetch_all(
            conn,
            &format!("{} WHERE d.record_pid_id IS NULL ORDER BY d.dataset_id", SELECT_DATASET),
        )
        .await
    }

    /// Datasets whose record reference resolves to no live record
    pub async fn get_zombies(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        Self::fetch_all(
            conn,
            &format!(
                r#"{}
                LEFT JOIN pidstore_pid p ON p.id = d.record_pid_id
                LEFT JOIN records r ON r.id = p.object_uuid AND r.deleted_at IS NULL
                WHERE d.record_pid_id IS NOT NULL AND r.id IS NULL
                ORDER BY d.dataset_id"#,
                SELECT_DATASET
            ),
        )
        .await
    }

    /// Create a dataset, optionally pointing at `pid` and linked to `dmps`
    ///
    /// `quiet` suppresses all lifecycle events. Fails with
    /// [`Error::DuplicateKey`] if `dataset_id` (or `pid`) is already taken.
    pub async fn create(
        uow: &mut UnitOfWork,
        dataset_id: &str,
        pid: Option<&PersistentIdentifier>,
        dmps: &[DataManagementPlan],
        quiet: bool,
    ) -> Result<Self> {
        let dataset = Dataset {
            id: uuid_utils::generate(),
            dataset_id: dataset_id.to_string(),
            record_pid_id: pid.map(|p| p.id),
        };

        sqlx::query("INSERT INTO dmp_dataset (id, dataset_id, record_pid_id) VALUES (?, ?, ?)")
            .bind(dataset.id.to_string())
            .bind(&dataset.dataset_id)
            .bind(dataset.record_pid_id)
            .execute(uow.conn())
            .await
            .map_err(|e| Error::from_insert(e, "Dataset", dataset_id))?;

        info!(dataset_id = %dataset_id, "Created dataset");

        if !quiet {
            uow.emit(MadmpEvent::DatasetCreated {
                dataset_id: dataset.dataset_id.clone(),
                record_pid: pid.map(PersistentIdentifier::to_ref),
                timestamp: chrono::Utc::now(),
            });
        }

        for dmp in dmps {
            dmp.link(uow, &dataset, !quiet).await?;
        }

        Ok(dataset)
    }

    pub fn is_orphan(&self) -> bool {
        self.record_pid_id.is_none()
    }

    /// The PID this dataset points at
    pub async fn record_pid(&self, conn: &mut SqliteConnection) -> Result<Option<PersistentIdentifier>> {
        match self.record_pid_id {
            Some(id) => pids::get(conn, id).await,
            None => Ok(None),
        }
    }

    /// Resolve the record behind the PID reference
    pub async fn record(&self, conn: &mut SqliteConnection) -> Result<Option<Record>> {
        match self.record_pid(conn).await? {
            Some(pid) if pid.status != PidStatus::Deleted => {
                repository::records::get_by_pid(conn, &pid).await
            }
            _ => Ok(None),
        }
    }

    pub async fn has_record(&self, conn: &mut SqliteConnection) -> Result<bool> {
        Ok(self.record(conn).await?.is_some())
    }

    /// Has a PID reference, but it resolves to nothing
    pub async fn is_zombie(&self, conn: &mut SqliteConnection) -> Result<bool> {
        if self.is_orphan() {
            return Ok(false);
        }
        Ok(self.record(conn).await?.is_none())
    }

    /// Re-point this dataset at `record`
    ///
    /// The PID is chosen with [`select_record_pid`]. Emits a
    /// `DatasetRecordChanged` event when `emit` is set.
    pub async fn set_record(
        &mut self,
        uow: &mut UnitOfWork,
        record: &Record,
        preferred_pid_types: &[String],
        emit: bool,
    ) -> Result<PersistentIdentifier> {
        let new_pid = select_record_pid(record, &self.dataset_id, preferred_pid_types)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("record {} has no usable PID", record.id)))?;

        let old_pid = self.record_pid(uow.conn()).await?;

        sqlx::query(
            "UPDATE dmp_dataset SET record_pid_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(new_pid.id)
        .bind(self.id.to_string())
        .execute(uow.conn())
        .await
        .map_err(|e| {
            Error::from_insert(e, "Dataset record reference", new_pid.pid_value.clone())
        })?;

        self.record_pid_id = Some(new_pid.id);
        debug!(
            dataset_id = %self.dataset_id,
            pid_type = %new_pid.pid_type,
            pid_value = %new_pid.pid_value,
            "Dataset now points at record"
        );

        if emit {
            uow.emit(MadmpEvent::DatasetRecordChanged {
                dataset_id: self.dataset_id.clone(),
                old_record: old_pid.as_ref().and_then(|p| p.object_uuid),
                old_pid: old_pid.as_ref().map(PersistentIdentifier::to_ref),
                new_record: Some(record.id),
                new_pid: Some(new_pid.to_ref()),
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(new_pid)
    }

    /// DMPs this dataset is linked to
    pub async fn dmps(&self, conn: &mut SqliteConnection) -> Result<Vec<DataManagementPlan>> {
        DataManagementPlan::linked_to(conn, self.id).await
    }

    /// Delete the dataset and detach it from every DMP
    ///
    /// The record it points at is left untouched.
    pub async fn delete(self, uow: &mut UnitOfWork) -> Result<()> {
        let pid = self.record_pid(uow.conn()).await?;

        sqlx::query("DELETE FROM dmp_datamanagementplan_dataset WHERE dataset_id = ?")
            .bind(self.id.to_string())
            .execute(uow.conn())
            .await?;

        sqlx::query("DELETE FROM dmp_dataset WHERE id = ?")
            .bind(self.id.to_string())
            .execute(uow.conn())
            .await?;

        info!(dataset_id = %self.dataset_id, "Deleted dataset");
        uow.emit(MadmpEvent::DatasetDeleted {
            dataset_id: self.dataset_id,
            record_id: pid.as_ref().and_then(|p| p.object_uuid),
            record_pid: pid.as_ref().map(PersistentIdentifier::to_ref),
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }
}

/// Pick the PID a dataset should reference among a record's PIDs
///
/// Deleted PIDs are ignored. Order of preference:
/// 1. value equal to the dataset identifier (scheme prefix stripped)
/// 2. first type found in `preferred_pid_types`, in that order
/// 3. lowest PID row id (earliest minted)
pub fn select_record_pid<'a>(
    record: &'a Record,
    dataset_id: &str,
    preferred_pid_types: &[String],
) -> Option<&'a PersistentIdentifier> {
    let mut live: Vec<&PersistentIdentifier> = record
        .pids
        .iter()
        .filter(|p| p.status != PidStatus::Deleted)
        .collect();
    live.sort_by_key(|p| p.id);

    let stripped = repository::strip_identifier(dataset_id);
    if let Some(pid) = live.iter().find(|p| p.pid_value == stripped) {
        return Some(*pid);
    }

    for pid_type in preferred_pid_types {
        if let Some(pid) = live.iter().find(|p| &p.pid_type == pid_type) {
            return Some(*pid);
        }
    }

    live.first().copied()
}
