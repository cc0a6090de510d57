use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{CallerIdentity, Trip};
use crate::routes::extract::JsonBody;
use crate::routes::AppState;
use crate::services::trips::{
    self, CreateTripInput, ShareState, TripDetail, TripSummary, UpdateTripInput,
};

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub is_public: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> AppResult<Json<Vec<TripSummary>>> {
    Ok(Json(trips::list_trips(&state.db, &caller)?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    JsonBody(body): JsonBody<CreateTripInput>,
) -> AppResult<(StatusCode, Json<Trip>)> {
    let trip = trips::create_trip(&state.db, &caller, body)?;
    Ok((StatusCode::CREATED, Json(trip)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<TripDetail>> {
    Ok(Json(trips::get_trip(&state.db, &caller, &trip_id)?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<UpdateTripInput>,
) -> AppResult<Json<Trip>> {
    let trip =
        trips::update_trip(&state.db, state.notifier.as_ref(), &caller, &trip_id, body).await?;
    Ok(Json(trip))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<StatusCode> {
    trips::delete_trip(&state.db, state.notifier.as_ref(), &caller, &trip_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn share(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<ShareRequest>,
) -> AppResult<Json<ShareState>> {
    Ok(Json(trips::set_sharing(
        &state.db,
        &caller,
        &trip_id,
        body.is_public,
    )?))
}
