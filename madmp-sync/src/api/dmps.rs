//! DMP endpoints
//!
//! - `POST /dmps[?sync=hard][&dry_run=true]` reconciles the `{"dmp": ...}` body
//! - `GET /dmps` lists every DMP with its datasets
//! - `GET /dmps/:dmp_id` shows one DMP
//! - `DELETE /dmps/:dmp_id` deletes a DMP; its datasets and records stay

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use madmp_common::madmp::MadmpDocument;

use super::{ApiError, ApiResult};
use crate::error::SyncError;
use crate::reconcile::{ReconcileOutcome, SyncMode};
use crate::repository::Identity;
use crate::store::{DataManagementPlan, Dataset};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileParams {
    /// `soft` (default) or `hard`
    pub sync: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// State of one dataset link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Linked,
    Orphan,
    Zombie,
}

#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub dataset_id: String,
    pub status: DatasetStatus,
    pub record_id: Option<Uuid>,
    pub record_pid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DmpSummary {
    pub dmp_id: String,
    pub datasets: Vec<DatasetSummary>,
}

impl DatasetSummary {
    pub async fn load(conn: &mut SqliteConnection, dataset: &Dataset) -> madmp_common::Result<Self> {
        let pid = dataset.record_pid(conn).await?;
        let record = dataset.record(conn).await?;

        let status = match (&pid, &record) {
            (None, _) => DatasetStatus::Orphan,
            (Some(_), None) => DatasetStatus::Zombie,
            (Some(_), Some(_)) => DatasetStatus::Linked,
        };

        Ok(Self {
            dataset_id: dataset.dataset_id.clone(),
            status,
            record_id: record.map(|r| r.id),
            record_pid: pid.map(|p| format!("{}:{}", p.pid_type, p.pid_value)),
        })
    }
}

impl DmpSummary {
    pub async fn load(conn: &mut SqliteConnection, plan: &DataManagementPlan) -> madmp_common::Result<Self> {
        let mut datasets = Vec::new();
        for dataset in plan.datasets(conn).await? {
            datasets.push(DatasetSummary::load(conn, &dataset).await?);
        }

        Ok(Self {
            dmp_id: plan.dmp_id.clone(),
            datasets,
        })
    }
}

/// POST /dmps
///
/// 201 when the DMP was new, 200 otherwise.
pub async fn reconcile_dmp(
    State(state): State<AppState>,
    Query(params): Query<ReconcileParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ReconcileOutcome>)> {
    let mode = match params.sync.as_deref() {
        Some(value) => value.parse::<SyncMode>()?,
        None => SyncMode::Soft,
    };

    let document: MadmpDocument = serde_json::from_slice(&body)
        .map_err(|e| SyncError::InvalidDocument(e.to_string()))?;

    let outcome = if params.dry_run {
        state
            .reconciler
            .dry_run(&document.dmp, mode, Some(Identity::System))
            .await?
    } else {
        state
            .reconciler
            .reconcile(&document.dmp, mode, Some(Identity::System))
            .await?
    };

    let status = if outcome.dmp_created && outcome.committed {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(outcome)))
}

/// GET /dmps
pub async fn list_dmps(State(state): State<AppState>) -> ApiResult<Json<Vec<DmpSummary>>> {
    let mut conn = state.store.acquire().await?;

    let mut summaries = Vec::new();
    for plan in DataManagementPlan::list_all(&mut conn).await? {
        summaries.push(DmpSummary::load(&mut conn, &plan).await?);
    }

    Ok(Json(summaries))
}

/// GET /dmps/:dmp_id
pub async fn get_dmp(
    State(state): State<AppState>,
    Path(dmp_id): Path<String>,
) -> ApiResult<Json<DmpSummary>> {
    let mut conn = state.store.acquire().await?;

    let plan = DataManagementPlan::get_by_dmp_id(&mut conn, &dmp_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("DMP '{}'", dmp_id)))?;

    Ok(Json(DmpSummary::load(&mut conn, &plan).await?))
}

#[derive(Debug, Serialize)]
pub struct DeletedDmp {
    pub dmp_id: String,
    pub unlinked: Vec<String>,
}

/// DELETE /dmps/:dmp_id
pub async fn delete_dmp(
    State(state): State<AppState>,
    Path(dmp_id): Path<String>,
) -> ApiResult<Json<DeletedDmp>> {
    let mut uow = state.store.begin().await?;

    let Some(plan) = DataManagementPlan::get_by_dmp_id(uow.conn(), &dmp_id).await? else {
        uow.rollback().await?;
        return Err(ApiError::NotFound(format!("DMP '{}'", dmp_id)));
    };

    let unlinked = plan.delete(&mut uow).await?;
    uow.commit().await?;

    info!(dmp_id = %dmp_id, datasets = unlinked.len(), "DMP deleted via API");
    Ok(Json(DeletedDmp { dmp_id, unlinked }))
}
