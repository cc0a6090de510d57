use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const MIN_QUERY_LEN: usize = 3;
pub const MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Search hit as returned by a Nominatim-compatible geocoder.
/// Coordinates arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct SearchHit {
    display_name: String,
    lat: String,
    lon: String,
}

impl SearchHit {
    fn into_place(self) -> Option<Place> {
        Some(Place {
            latitude: self.lat.trim().parse().ok()?,
            longitude: self.lon.trim().parse().ok()?,
            display_name: self.display_name,
        })
    }
}

fn to_places(hits: Vec<SearchHit>) -> Vec<Place> {
    hits.into_iter()
        .filter_map(SearchHit::into_place)
        .take(MAX_RESULTS)
        .collect()
}

/// Looks up places matching `query`. Queries shorter than three characters
/// return nothing without calling the geocoder.
pub async fn search(
    client: &Client,
    geocoder_url: &str,
    user_agent: &str,
    query: &str,
) -> AppResult<Vec<Place>> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Ok(Vec::new());
    }

    let limit = MAX_RESULTS.to_string();
    let response = client
        .get(format!("{geocoder_url}/search"))
        .query(&[("q", query), ("format", "json"), ("limit", limit.as_str())])
        .header("Accept", "application/json")
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|e| AppError::Internal(format!("Geocoder request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::Internal(format!(
            "Geocoder returned {}",
            response.status()
        )));
    }

    let hits: Vec<SearchHit> = response
        .json()
        .await
        .map_err(|e| AppError::Internal(format!("Geocoder parse failed: {e}")))?;

    Ok(to_places(hits))
}
