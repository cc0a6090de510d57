use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::error::AppResult;
use crate::models::{CallerIdentity, Presence};
use crate::routes::extract::JsonBody;
use crate::routes::AppState;
use crate::services::presence::{self, Heartbeat};

pub async fn active(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<Vec<Presence>>> {
    Ok(Json(presence::active_users(&state.db, &caller, &trip_id)?))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    body: Option<JsonBody<Heartbeat>>,
) -> AppResult<Json<Presence>> {
    let input = body.map(|JsonBody(b)| b).unwrap_or_default();
    let presence =
        presence::heartbeat(&state.db, state.notifier.as_ref(), &caller, &trip_id, input).await?;
    Ok(Json(presence))
}
