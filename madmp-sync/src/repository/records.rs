//! Repository records
//!
//! A record is an opaque JSON document with a draft flag and a revision
//! counter. Every record gets a `recid` PID when it is created; deleting a
//! record is a soft delete that also marks its PIDs deleted.

use madmp_common::uuid_utils;
use madmp_common::{MadmpEvent, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use super::pids::{self, PersistentIdentifier};
use crate::store::UnitOfWork;

/// PID type minted for every new record
pub const RECID_PID_TYPE: &str = "recid";

static RECORD_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^/]*/records/([^/?#]+)").expect("static regex"));

static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^/]*/(.*)$").expect("static regex"));

#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub id: Uuid,
    pub data: Value,
    pub is_draft: bool,
    pub revision: i64,
    /// All PIDs resolving to this record, oldest first
    pub pids: Vec<PersistentIdentifier>,
}

impl Record {
    /// First PID of the given type
    pub fn pid(&self, pid_type: &str) -> Option<&PersistentIdentifier> {
        self.pids.iter().find(|p| p.pid_type == pid_type)
    }

    pub fn recid(&self) -> Option<&str> {
        self.pid(RECID_PID_TYPE).map(|p| p.pid_value.as_str())
    }

    /// User ids listed as owners in `access.owners`
    pub fn owners(&self) -> Vec<i64> {
        self.data["access"]["owners"]
            .as_array()
            .map(|owners| owners.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default()
    }

    fn from_row(row: &SqliteRow, pids: Vec<PersistentIdentifier>) -> Result<Self> {
        let id: String = row.get("id");
        let json: String = row.get("json");

        Ok(Self {
            id: uuid_utils::parse(&id)?,
            data: serde_json::from_str(&json).map_err(|e| {
                madmp_common::Error::Corrupt(format!("record {} holds invalid JSON: {}", id, e))
            })?,
            is_draft: row.get("is_draft"),
            revision: row.get("revision"),
            pids,
        })
    }
}

/// Store a new draft record and mint its `recid`
pub async fn create_draft(conn: &mut SqliteConnection, data: &Value) -> Result<Record> {
    let id = uuid_utils::generate();

    sqlx::query("INSERT INTO records (id, json, is_draft, revision) VALUES (?, ?, 1, 1)")
        .bind(id.to_string())
        .bind(data.to_string())
        .execute(&mut *conn)
        .await?;

    let recid = pids::mint(conn, RECID_PID_TYPE, &uuid_utils::recid_from(&id), id).await?;
    debug!(record_id = %id, recid = %recid.pid_value, "Created draft record");

    Ok(Record {
        id,
        data: data.clone(),
        is_draft: true,
        revision: 1,
        pids: vec![recid],
    })
}

/// Load a live (not deleted) record
pub async fn get_record(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Record>> {
    load(conn, id, false).await
}

/// Load a record even if it was soft-deleted
///
/// Deletion notifications still need the last known metadata.
pub async fn get_record_with_deleted(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Record>> {
    load(conn, id, true).await
}

async fn load(conn: &mut SqliteConnection, id: Uuid, with_deleted: bool) -> Result<Option<Record>> {
    let row = sqlx::query(
        "SELECT id, json, is_draft, revision FROM records WHERE id = ? AND (? OR deleted_at IS NULL)",
    )
    .bind(id.to_string())
    .bind(with_deleted)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let pids = pids::for_object(conn, id).await?;
            Ok(Some(Record::from_row(&row, pids)?))
        }
        None => Ok(None),
    }
}

/// Resolve a PID to its live record
pub async fn get_by_pid(
    conn: &mut SqliteConnection,
    pid: &PersistentIdentifier,
) -> Result<Option<Record>> {
    match pid.object_uuid {
        Some(object) => get_record(conn, object).await,
        None => Ok(None),
    }
}

/// Replace a record's metadata
///
/// Always writes and bumps the revision, even when `data` is unchanged.
/// Returns `None` when the record does not exist or was deleted.
pub async fn update_record(uow: &mut UnitOfWork, id: Uuid, data: &Value) -> Result<Option<Record>> {
    let result = sqlx::query(
        r#"
        UPDATE records
        SET json = ?, revision = revision + 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(data.to_string())
    .bind(id.to_string())
    .execute(uow.conn())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    uow.emit(MadmpEvent::RecordUpdated {
        record_id: id,
        timestamp: chrono::Utc::now(),
    });

    get_record(uow.conn(), id).await
}

/// Soft-delete a record and its PIDs
pub async fn delete_record(uow: &mut UnitOfWork, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE records SET deleted_at = CURRENT_TIMESTAMP WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .execute(uow.conn())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    pids::delete_for_object(uow.conn(), id).await?;
    uow.emit(MadmpEvent::RecordDeleted {
        record_id: id,
        timestamp: chrono::Utc::now(),
    });

    Ok(true)
}

/// Strip an `http(s)://<host>/` prefix from an identifier
///
/// `https://doi.org/10.1/x` becomes `10.1/x`; anything else is returned as is.
pub fn strip_identifier(identifier: &str) -> &str {
    SCHEME_PREFIX
        .captures(identifier)
        .and_then(|c| c.get(1))
        .map_or(identifier, |m| m.as_str())
}

/// Find an existing record that no dataset points at yet
///
/// Tries the `recid` in a `.../records/<recid>` access URL first, then any
/// PID whose value equals the (stripped) dataset identifier.
pub async fn fetch_unassigned_record(
    conn: &mut SqliteConnection,
    dataset_identifier: &str,
    access_url: Option<&str>,
) -> Result<Option<Record>> {
    let mut candidates: Vec<PersistentIdentifier> = Vec::new();

    if let Some(recid) = access_url
        .and_then(|url| RECORD_URL.captures(url))
        .and_then(|c| c.get(1))
    {
        if let Some(pid) = pids::resolve(conn, RECID_PID_TYPE, recid.as_str()).await? {
            candidates.push(pid);
        }
    }

    candidates.extend(pids::find_by_value(conn, strip_identifier(dataset_identifier)).await?);

    for pid in candidates {
        let Some(record) = get_by_pid(conn, &pid).await? else {
            continue;
        };

        if is_assigned(conn, record.id).await? {
            debug!(record_id = %record.id, "Skipping record already linked to a dataset");
            continue;
        }

        return Ok(Some(record));
    }

    Ok(None)
}

/// True if some dataset references any PID of this record
async fn is_assigned(conn: &mut SqliteConnection, record_id: Uuid) -> Result<bool> {
    let assigned: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM dmp_dataset d
            JOIN pidstore_pid p ON p.id = d.record_pid_id
            WHERE p.object_uuid = ?
        )
        "#,
    )
    .bind(record_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    Ok(assigned)
}
