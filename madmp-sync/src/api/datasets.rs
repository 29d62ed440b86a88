//! Dataset maintenance endpoints

use axum::{extract::State, Json};

use super::dmps::DatasetSummary;
use super::ApiResult;
use crate::store::Dataset;
use crate::AppState;

/// GET /datasets/zombies
///
/// Datasets whose PID no longer resolves to a live record.
pub async fn list_zombies(State(state): State<AppState>) -> ApiResult<Json<Vec<DatasetSummary>>> {
    let mut conn = state.store.acquire().await?;

    let mut summaries = Vec::new();
    for dataset in Dataset::get_zombies(&mut conn).await? {
        summaries.push(DatasetSummary::load(&mut conn, &dataset).await?);
    }

    Ok(Json(summaries))
}

/// GET /datasets/orphans
pub async fn list_orphans(State(state): State<AppState>) -> ApiResult<Json<Vec<DatasetSummary>>> {
    let mut conn = state.store.acquire().await?;

    let mut summaries = Vec::new();
    for dataset in Dataset::get_orphans(&mut conn).await? {
        summaries.push(DatasetSummary::load(&mut conn, &dataset).await?);
    }

    Ok(Json(summaries))
}
