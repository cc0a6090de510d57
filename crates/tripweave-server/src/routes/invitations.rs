use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use crate::error::AppResult;
use crate::models::{CallerIdentity, PendingInvitation};
use crate::routes::AppState;
use crate::services::collaboration::{self, Accepted, InvitationPreview};

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<Vec<PendingInvitation>>> {
    Ok(Json(collaboration::list_invitations(&state.db, &caller, &trip_id)?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((trip_id, invitation_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    collaboration::cancel_invitation(&state.db, &caller, &trip_id, &invitation_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/invite/{token} (public)
pub async fn preview(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<InvitationPreview>> {
    Ok(Json(collaboration::preview_invitation(&state.db, &token)?))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(token): Path<String>,
) -> AppResult<Json<Accepted>> {
    let accepted =
        collaboration::accept_invitation(&state.db, state.notifier.as_ref(), &caller, &token)
            .await?;
    Ok(Json(accepted))
}
