use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::routes::AppState;
use crate::services::geocode::{self, Place};

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/v1/geocode?q=eiffel
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> AppResult<Json<Vec<Place>>> {
    let places = geocode::search(
        &state.http,
        &state.config.geocoder_url,
        &state.config.geocoder_user_agent,
        &query.q,
    )
    .await?;
    Ok(Json(places))
}
