use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppResult;
use crate::routes::AppState;
use crate::services::trips::{self, SharedTrip};

/// GET /api/v1/share/{share_id} (public, read-only)
pub async fn view(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> AppResult<Json<SharedTrip>> {
    Ok(Json(trips::shared_trip(&state.db, &share_id)?))
}
