//! Data Management Plan entities and their dataset links

use madmp_common::uuid_utils;
use madmp_common::{Error, MadmpEvent, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;
use uuid::Uuid;

use super::{Dataset, UnitOfWork};
use crate::repository::{PersistentIdentifier, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataManagementPlan {
    pub id: Uuid,
    pub dmp_id: String,
}

const SELECT_DMP: &str = "SELECT m.id, m.dmp_id FROM dmp_datamanagementplan m";

impl DataManagementPlan {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let id: String = row.get("id");
        Ok(Self {
            id: uuid_utils::parse(&id)?,
            dmp_id: row.get("dmp_id"),
        })
    }

    pub async fn get_by_dmp_id(conn: &mut SqliteConnection, dmp_id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("{} WHERE m.dmp_id = ?", SELECT_DMP))
            .bind(dmp_id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        let rows = sqlx::query(&format!("{} ORDER BY m.dmp_id", SELECT_DMP))
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    /// DMPs linked to the dataset with internal id `dataset`
    pub(crate) async fn linked_to(conn: &mut SqliteConnection, dataset: Uuid) -> Result<Vec<Self>> {
        let rows = sqlx::query(&format!(
            r#"{}
            JOIN dmp_datamanagementplan_dataset l ON l.dmp_id = m.id
            WHERE l.dataset_id = ?
            ORDER BY m.dmp_id"#,
            SELECT_DMP
        ))
        .bind(dataset.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    /// DMPs whose datasets point at any PID of `record`
    pub async fn get_by_record(conn: &mut SqliteConnection, record: &Record) -> Result<Vec<Self>> {
        match Dataset::get_by_record(conn, record).await? {
            Some(dataset) => dataset.dmps(conn).await,
            None => Ok(Vec::new()),
        }
    }

    /// DMPs whose datasets point at `pid` (or, unless `strict`, a sibling of it)
    pub async fn get_by_record_pid(
        conn: &mut SqliteConnection,
        pid: &PersistentIdentifier,
        strict: bool,
    ) -> Result<Vec<Self>> {
        match Dataset::get_by_record_pid(conn, pid, strict).await? {
            Some(dataset) => dataset.dmps(conn).await,
            None => Ok(Vec::new()),
        }
    }

    /// Create a DMP, optionally linked to `datasets`
    ///
    /// `quiet` suppresses all lifecycle events. Fails with
    /// [`Error::DuplicateKey`] if `dmp_id` is already taken.
    pub async fn create(
        uow: &mut UnitOfWork,
        dmp_id: &str,
        datasets: &[Dataset],
        quiet: bool,
    ) -> Result<Self> {
        let dmp = DataManagementPlan {
            id: uuid_utils::generate(),
            dmp_id: dmp_id.to_string(),
        };

        sqlx::query("INSERT INTO dmp_datamanagementplan (id, dmp_id) VALUES (?, ?)")
            .bind(dmp.id.to_string())
            .bind(&dmp.dmp_id)
            .execute(uow.conn())
            .await
            .map_err(|e| Error::from_insert(e, "DataManagementPlan", dmp_id))?;

        info!(dmp_id = %dmp_id, "Created DMP");

        if !quiet {
            uow.emit(MadmpEvent::DmpCreated {
                dmp_id: dmp.dmp_id.clone(),
                timestamp: chrono::Utc::now(),
            });
        }

        for dataset in datasets {
            dmp.link(uow, dataset, !quiet).await?;
        }

        Ok(dmp)
    }

    /// Linked datasets, ordered by external id
    pub async fn datasets(&self, conn: &mut SqliteConnection) -> Result<Vec<Dataset>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.dataset_id, d.record_pid_id
            FROM dmp_dataset d
            JOIN dmp_datamanagementplan_dataset l ON l.dataset_id = d.id
            WHERE l.dmp_id = ?
            ORDER BY d.dataset_id
            "#,
        )
        .bind(self.id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(Dataset::from_row).collect()
    }

    pub async fn has_dataset(&self, conn: &mut SqliteConnection, dataset: &Dataset) -> Result<bool> {
        let linked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dmp_datamanagementplan_dataset WHERE dmp_id = ? AND dataset_id = ?)",
        )
        .bind(self.id.to_string())
        .bind(dataset.id.to_string())
        .fetch_one(&mut *conn)
        .await?;

        Ok(linked)
    }

    /// Link `dataset`; returns false if it was already linked
    pub async fn add_dataset(&self, uow: &mut UnitOfWork, dataset: &Dataset) -> Result<bool> {
        self.link(uow, dataset, true).await
    }

    pub(crate) async fn link(&self, uow: &mut UnitOfWork, dataset: &Dataset, emit: bool) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO dmp_datamanagementplan_dataset (dmp_id, dataset_id) VALUES (?, ?)",
        )
        .bind(self.id.to_string())
        .bind(dataset.id.to_string())
        .execute(uow.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.touch(uow).await?;
        info!(dmp_id = %self.dmp_id, dataset_id = %dataset.dataset_id, "Linked dataset to DMP");

        if emit {
            uow.emit(MadmpEvent::DatasetAddedToDmp {
                dmp_id: self.dmp_id.clone(),
                dataset_id: dataset.dataset_id.clone(),
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(true)
    }

    /// Unlink `dataset`; returns false if it was not linked
    pub async fn remove_dataset(&self, uow: &mut UnitOfWork, dataset: &Dataset) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM dmp_datamanagementplan_dataset WHERE dmp_id = ? AND dataset_id = ?",
        )
        .bind(self.id.to_string())
        .bind(dataset.id.to_string())
        .execute(uow.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.touch(uow).await?;
        info!(dmp_id = %self.dmp_id, dataset_id = %dataset.dataset_id, "Unlinked dataset from DMP");

        uow.emit(MadmpEvent::DatasetRemovedFromDmp {
            dmp_id: self.dmp_id.clone(),
            dataset_id: dataset.dataset_id.clone(),
            timestamp: chrono::Utc::now(),
        });

        Ok(true)
    }

    /// Delete the DMP, detaching its datasets
    ///
    /// Datasets and records survive. Returns the detached dataset ids.
    pub async fn delete(self, uow: &mut UnitOfWork) -> Result<Vec<String>> {
        let dataset_ids: Vec<String> = self
            .datasets(uow.conn())
            .await?
            .into_iter()
            .map(|d| d.dataset_id)
            .collect();

        sqlx::query("DELETE FROM dmp_datamanagementplan_dataset WHERE dmp_id = ?")
            .bind(self.id.to_string())
            .execute(uow.conn())
            .await?;

        sqlx::query("DELETE FROM dmp_datamanagementplan WHERE id = ?")
            .bind(self.id.to_string())
            .execute(uow.conn())
            .await?;

        info!(dmp_id = %self.dmp_id, detached = dataset_ids.len(), "Deleted DMP");
        uow.emit(MadmpEvent::DmpDeleted {
            dmp_id: self.dmp_id,
            dataset_ids: dataset_ids.clone(),
            timestamp: chrono::Utc::now(),
        });

        Ok(dataset_ids)
    }

    async fn touch(&self, uow: &mut UnitOfWork) -> Result<()> {
        sqlx::query("UPDATE dmp_datamanagementplan SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(self.id.to_string())
            .execute(uow.conn())
            .await?;
        Ok(())
    }
}
