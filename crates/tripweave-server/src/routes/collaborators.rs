use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use crate::error::AppResult;
use crate::models::{CallerIdentity, Collaborator};
use crate::routes::extract::JsonBody;
use crate::routes::AppState;
use crate::services::collaboration::{self, InviteInput, InviteOutcome, RoleInput};

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<Vec<Collaborator>>> {
    Ok(Json(collaboration::list_collaborators(&state.db, &caller, &trip_id)?))
}

/// POST /api/v1/trips/{trip_id}/collaborators
///
/// Known users are added at once; anyone else gets a pending invitation link.
pub async fn invite(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<InviteInput>,
) -> AppResult<(StatusCode, Json<InviteOutcome>)> {
    let outcome = collaboration::invite(
        &state.db,
        state.notifier.as_ref(),
        &state.config,
        &caller,
        &trip_id,
        body,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((trip_id, collaborator_id)): Path<(String, String)>,
    JsonBody(body): JsonBody<RoleInput>,
) -> AppResult<Json<Collaborator>> {
    let collaborator = collaboration::change_role(
        &state.db,
        state.notifier.as_ref(),
        &caller,
        &trip_id,
        &collaborator_id,
        body,
    )
    .await?;
    Ok(Json(collaborator))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((trip_id, collaborator_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    collaboration::remove_collaborator(
        &state.db,
        state.notifier.as_ref(),
        &caller,
        &trip_id,
        &collaborator_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
