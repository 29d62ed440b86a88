//! Persistent identifiers
//!
//! A PID maps `(pid_type, pid_value)` to the UUID of the object it resolves
//! to. One record usually has several PIDs (its `recid`, maybe a DOI); those
//! are "siblings" of each other.

use madmp_common::uuid_utils;
use madmp_common::{Error, PidRef, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Registration status of a PID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PidStatus {
    Reserved,
    Registered,
    Deleted,
}

impl PidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PidStatus::Reserved => "K",
            PidStatus::Registered => "R",
            PidStatus::Deleted => "D",
        }
    }

    fn from_code(code: &str) -> Result<Self> {
        match code {
            "K" => Ok(PidStatus::Reserved),
            "R" => Ok(PidStatus::Registered),
            "D" => Ok(PidStatus::Deleted),
            other => Err(Error::Corrupt(format!("unknown PID status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistentIdentifier {
    pub id: i64,
    pub pid_type: String,
    pub pid_value: String,
    pub object_uuid: Option<Uuid>,
    pub status: PidStatus,
}

impl PersistentIdentifier {
    pub fn to_ref(&self) -> PidRef {
        PidRef {
            id: self.id,
            pid_type: self.pid_type.clone(),
            pid_value: self.pid_value.clone(),
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let object_uuid: Option<String> = row.get("object_uuid");
        let status: String = row.get("status");

        Ok(Self {
            id: row.get("id"),
            pid_type: row.get("pid_type"),
            pid_value: row.get("pid_value"),
            object_uuid: object_uuid.as_deref().map(uuid_utils::parse).transpose()?,
            status: PidStatus::from_code(&status)?,
        })
    }
}

const SELECT_PID: &str = "SELECT id, pid_type, pid_value, object_uuid, status FROM pidstore_pid";

/// Register a new PID pointing at `object_uuid`
pub async fn mint(
    conn: &mut SqliteConnection,
    pid_type: &str,
    pid_value: &str,
    object_uuid: Uuid,
) -> Result<PersistentIdentifier> {
    let result = sqlx::query(
        "INSERT INTO pidstore_pid (pid_type, pid_value, object_uuid, status) VALUES (?, ?, ?, 'R')",
    )
    .bind(pid_type)
    .bind(pid_value)
    .bind(object_uuid.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::from_insert(e, "PersistentIdentifier", format!("{}:{}", pid_type, pid_value)))?;

    Ok(PersistentIdentifier {
        id: result.last_insert_rowid(),
        pid_type: pid_type.to_string(),
        pid_value: pid_value.to_string(),
        object_uuid: Some(object_uuid),
        status: PidStatus::Registered,
    })
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<PersistentIdentifier>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PID))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(PersistentIdentifier::from_row).transpose()
}

/// Look a PID up by its type and value
pub async fn resolve(
    conn: &mut SqliteConnection,
    pid_type: &str,
    pid_value: &str,
) -> Result<Option<PersistentIdentifier>> {
    let row = sqlx::query(&format!("{} WHERE pid_type = ? AND pid_value = ?", SELECT_PID))
        .bind(pid_type)
        .bind(pid_value)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(PersistentIdentifier::from_row).transpose()
}

/// All PIDs with the given value, regardless of type, oldest first
pub async fn find_by_value(
    conn: &mut SqliteConnection,
    pid_value: &str,
) -> Result<Vec<PersistentIdentifier>> {
    let rows = sqlx::query(&format!("{} WHERE pid_value = ? ORDER BY id", SELECT_PID))
        .bind(pid_value)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(PersistentIdentifier::from_row).collect()
}

/// All PIDs resolving to `object_uuid`, oldest first
pub async fn for_object(
    conn: &mut SqliteConnection,
    object_uuid: Uuid,
) -> Result<Vec<PersistentIdentifier>> {
    let rows = sqlx::query(&format!("{} WHERE object_uuid = ? ORDER BY id", SELECT_PID))
        .bind(object_uuid.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(PersistentIdentifier::from_row).collect()
}

/// Mark every PID of an object as deleted
pub async fn delete_for_object(conn: &mut SqliteConnection, object_uuid: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE pidstore_pid SET status = 'D' WHERE object_uuid = ?")
        .bind(object_uuid.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use madmp_common::db::init_memory_database;

    #[tokio::test]
    async fn test_mint_and_resolve() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let object = Uuid::new_v4();

        let pid = mint(&mut conn, "doi", "10.1234/abc", object).await.unwrap();
        let found = resolve(&mut conn, "doi", "10.1234/abc").await.unwrap().unwrap();

        assert_eq!(found, pid);
        assert_eq!(found.object_uuid, Some(object));
        assert_eq!(found.status, PidStatus::Registered);
    }

    #[tokio::test]
    async fn test_duplicate_mint_is_duplicate_key() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        mint(&mut conn, "recid", "abcde-12345", Uuid::new_v4()).await.unwrap();
        let err = mint(&mut conn, "recid", "abcde-12345", Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_siblings_ordered_by_id() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let object = Uuid::new_v4();

        let first = mint(&mut conn, "recid", "aaaaa-aaaaa", object).await.unwrap();
        let second = mint(&mut conn, "doi", "10.1/x", object).await.unwrap();
        mint(&mut conn, "recid", "bbbbb-bbbbb", Uuid::new_v4()).await.unwrap();

        let siblings = for_object(&mut conn, object).await.unwrap();
        assert_eq!(siblings, vec![first, second]);

        assert_eq!(delete_for_object(&mut conn, object).await.unwrap(), 2);
        let siblings = for_object(&mut conn, object).await.unwrap();
        assert!(siblings.iter().all(|p| p.status == PidStatus::Deleted));
    }
}
