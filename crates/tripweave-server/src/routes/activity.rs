use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{Activity, CallerIdentity};
use crate::routes::AppState;
use crate::services::activity;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/trips/{trip_id}/activity?limit=20
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Vec<Activity>>> {
    Ok(Json(activity::feed(&state.db, &caller, &trip_id, query.limit)?))
}
