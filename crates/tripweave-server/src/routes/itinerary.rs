use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use crate::error::AppResult;
use crate::models::{CallerIdentity, ItineraryItem};
use crate::routes::extract::JsonBody;
use crate::routes::AppState;
use crate::services::itinerary::{self, AddOutcome, CostUpdate, NewItem, ReorderRequest};

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<Vec<ItineraryItem>>> {
    Ok(Json(itinerary::list_items(&state.db, &caller, &trip_id)?))
}

/// POST /api/v1/trips/{trip_id}/items
///
/// Answers 200 with `status: needs_dates` when the trip has no date range yet.
pub async fn add(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<NewItem>,
) -> AppResult<(StatusCode, Json<AddOutcome>)> {
    let outcome =
        itinerary::add_item(&state.db, state.notifier.as_ref(), &caller, &trip_id, body).await?;
    let status = match outcome {
        AddOutcome::Added { .. } => StatusCode::CREATED,
        AddOutcome::NeedsDates { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((trip_id, item_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    itinerary::delete_item(&state.db, state.notifier.as_ref(), &caller, &trip_id, &item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_cost(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((trip_id, item_id)): Path<(String, String)>,
    JsonBody(body): JsonBody<CostUpdate>,
) -> AppResult<Json<ItineraryItem>> {
    let item = itinerary::update_cost(
        &state.db,
        state.notifier.as_ref(),
        &caller,
        &trip_id,
        &item_id,
        body,
    )
    .await?;
    Ok(Json(item))
}

pub async fn reorder(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<ReorderRequest>,
) -> AppResult<Json<Vec<ItineraryItem>>> {
    let items =
        itinerary::reorder_day(&state.db, state.notifier.as_ref(), &caller, &trip_id, body).await?;
    Ok(Json(items))
}
