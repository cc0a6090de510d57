use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{row_to_item, row_to_trip, CallerIdentity, ItineraryItem, Trip, ITEM_COLS, TRIP_COLS};
use crate::services::access::{self, Role};
use crate::services::activity::{self, Entity};
use crate::services::notify::{self, Notifier};
use crate::services::{users, validate};

pub const DEFAULT_BASE_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize)]
pub struct CreateTripInput {
    pub destination: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub base_currency: Option<String>,
}

/// Absent fields are left alone; `null` dates clear the stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTripInput {
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub start_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub end_date: Option<Option<String>>,
    pub base_currency: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct TripSummary {
    #[serde(flatten)]
    pub trip: Trip,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct TripDetail {
    #[serde(flatten)]
    pub trip: Trip,
    pub role: Role,
    pub days: Vec<String>,
    pub items: Vec<ItineraryItem>,
}

#[derive(Debug, Serialize)]
pub struct ShareState {
    pub is_public: bool,
    pub share_id: Option<String>,
    pub share_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SharedItem {
    pub name: String,
    pub description: Option<String>,
    pub date: String,
    pub order: i64,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MapPoint {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
}

/// Read-only view of a public trip.
#[derive(Debug, Serialize)]
pub struct SharedTrip {
    pub destination: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub items: Vec<SharedItem>,
    pub points: Vec<MapPoint>,
}

pub fn create_trip(
    pool: &DbPool,
    caller: &CallerIdentity,
    input: CreateTripInput,
) -> AppResult<Trip> {
    let destination = input.destination.trim().to_string();
    if destination.is_empty() {
        return Err(AppError::Validation("Destination is required".into()));
    }
    let start = validate::parse_optional_day(input.start_date.as_deref())?;
    let end = validate::parse_optional_day(input.end_date.as_deref())?;
    validate::check_date_range(start, end)?;
    let base_currency = match input.base_currency.as_deref() {
        Some(code) => validate::normalize_currency(code)?,
        None => DEFAULT_BASE_CURRENCY.to_string(),
    };

    let conn = pool.get()?;
    let user = users::ensure_user(&conn, caller)?;

    let now = now_timestamp();
    let trip = Trip {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        destination,
        start_date: start.map(validate::format_day),
        end_date: end.map(validate::format_day),
        is_public: false,
        share_id: None,
        base_currency,
        created_at: now.clone(),
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO trips (id, user_id, destination, start_date, end_date, is_public, base_currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
        rusqlite::params![
            trip.id,
            trip.user_id,
            trip.destination,
            trip.start_date,
            trip.end_date,
            trip.base_currency,
            trip.created_at,
            trip.updated_at
        ],
    )?;

    activity::record(
        &conn,
        &trip.id,
        &user.id,
        "created",
        Entity::Trip(&trip.id),
        Some(json!({ "destination": trip.destination })),
    )?;

    tracing::info!("Trip {} created by {}", trip.id, user.id);
    Ok(trip)
}

/// Trips the caller owns or collaborates on, newest first.
pub fn list_trips(pool: &DbPool, caller: &CallerIdentity) -> AppResult<Vec<TripSummary>> {
    let conn = pool.get()?;
    let user = users::ensure_user(&conn, caller)?;

    let cols = TRIP_COLS
        .split(", ")
        .map(|c| format!("t.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {cols}, c.role
         FROM trips t
         LEFT JOIN trip_collaborators c ON c.trip_id = t.id AND c.user_id = ?1
         WHERE t.user_id = ?1 OR c.user_id IS NOT NULL
         ORDER BY t.created_at DESC"
    ))?;
    let rows = stmt.query_map(rusqlite::params![user.id], |row| {
        let trip = row_to_trip(row)?;
        let collaborator_role: Option<crate::models::CollaboratorRole> = row.get(10)?;
        let role = if trip.user_id == user.id {
            Role::Owner
        } else {
            collaborator_role.map(Role::from).unwrap_or(Role::None)
        };
        Ok(TripSummary { trip, role })
    })?;
    let trips: Result<Vec<_>, _> = rows.collect();
    Ok(trips?)
}

pub fn list_items(conn: &rusqlite::Connection, trip_id: &str) -> AppResult<Vec<ItineraryItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLS} FROM itinerary_items WHERE trip_id = ?1 ORDER BY date, sort_order, created_at"
    ))?;
    let rows = stmt.query_map(rusqlite::params![trip_id], row_to_item)?;
    let items: Result<Vec<_>, _> = rows.collect();
    Ok(items?)
}

/// Calendar days of the trip's date range; empty when dates are unset.
pub fn trip_days(trip: &Trip) -> AppResult<Vec<String>> {
    match (&trip.start_date, &trip.end_date) {
        (Some(start), Some(end)) => {
            let start = validate::parse_day(start)?;
            let end = validate::parse_day(end)?;
            Ok(validate::days_between(start, end)
                .into_iter()
                .map(validate::format_day)
                .collect())
        }
        _ => Ok(Vec::new()),
    }
}

pub fn get_trip(pool: &DbPool, caller: &CallerIdentity, trip_id: &str) -> AppResult<TripDetail> {
    let conn = pool.get()?;
    let access = access::resolve_access(&conn, caller, trip_id)?.require_view()?;
    let items = list_items(&conn, trip_id)?;
    let days = trip_days(&access.trip)?;
    Ok(TripDetail {
        trip: access.trip,
        role: access.role,
        days,
        items,
    })
}

pub async fn update_trip(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    input: UpdateTripInput,
) -> AppResult<Trip> {
    let trip = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_owner("edit trip details")?;
        let mut trip = access.trip;

        if let Some(destination) = &input.destination {
            let destination = destination.trim();
            if destination.is_empty() {
                return Err(AppError::Validation("Destination cannot be empty".into()));
            }
            trip.destination = destination.to_string();
        }
        if let Some(start) = &input.start_date {
            trip.start_date = validate::parse_optional_day(start.as_deref())?.map(validate::format_day);
        }
        if let Some(end) = &input.end_date {
            trip.end_date = validate::parse_optional_day(end.as_deref())?.map(validate::format_day);
        }
        validate::check_date_range(
            validate::parse_optional_day(trip.start_date.as_deref())?,
            validate::parse_optional_day(trip.end_date.as_deref())?,
        )?;
        if let Some(code) = &input.base_currency {
            trip.base_currency = validate::normalize_currency(code)?;
        }
        trip.updated_at = now_timestamp();

        conn.execute(
            "UPDATE trips SET destination = ?1, start_date = ?2, end_date = ?3, base_currency = ?4, updated_at = ?5 WHERE id = ?6",
            rusqlite::params![
                trip.destination,
                trip.start_date,
                trip.end_date,
                trip.base_currency,
                trip.updated_at,
                trip.id
            ],
        )?;

        activity::record(
            &conn,
            &trip.id,
            &access.user.id,
            "updated",
            Entity::Trip(&trip.id),
            Some(json!({
                "destination": input.destination,
                "start_date": input.start_date,
                "end_date": input.end_date,
                "base_currency": input.base_currency,
            })),
        )?;
        trip
    };

    notify::notify_trip(
        notifier,
        &trip.id,
        notify::TRIP_UPDATE,
        json!({
            "type": "trip-updated",
            "updates": {
                "destination": trip.destination,
                "start_date": trip.start_date,
                "end_date": trip.end_date,
                "base_currency": trip.base_currency,
            }
        }),
    )
    .await;

    Ok(trip)
}

/// Deletes the trip; the schema cascades to every dependent row.
pub async fn delete_trip(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<()> {
    {
        let conn = pool.get()?;
        access::resolve_access(&conn, caller, trip_id)?.require_owner("delete this trip")?;
        conn.execute("DELETE FROM trips WHERE id = ?1", rusqlite::params![trip_id])?;
    }
    tracing::info!("Trip {trip_id} deleted");

    notify::notify_trip(notifier, trip_id, notify::TRIP_UPDATE, json!({ "type": "trip-deleted" })).await;
    Ok(())
}

/// Makes the trip public or private. The share id is minted once and reused.
pub fn set_sharing(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
    make_public: bool,
) -> AppResult<ShareState> {
    let conn = pool.get()?;
    let access = access::resolve_access(&conn, caller, trip_id)?.require_owner("change sharing")?;
    let now = now_timestamp();

    let share_id = if make_public {
        let share_id = access
            .trip
            .share_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        conn.execute(
            "UPDATE trips SET is_public = 1, share_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![share_id, now, trip_id],
        )?;
        Some(share_id)
    } else {
        conn.execute(
            "UPDATE trips SET is_public = 0, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, trip_id],
        )?;
        access.trip.share_id
    };

    let share_url = match (&share_id, make_public) {
        (Some(id), true) => Some(format!("/share/{id}")),
        _ => None,
    };

    Ok(ShareState {
        is_public: make_public,
        share_id,
        share_url,
    })
}

pub fn shared_trip(pool: &DbPool, share_id: &str) -> AppResult<SharedTrip> {
    let conn = pool.get()?;
    let trip = conn
        .query_row(
            &format!("SELECT {TRIP_COLS} FROM trips WHERE share_id = ?1 AND is_public = 1"),
            rusqlite::params![share_id],
            row_to_trip,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound("This trip is private or does not exist".into())
            }
            e => AppError::Database(e),
        })?;

    let items = list_items(&conn, &trip.id)?;
    let points = items
        .iter()
        .filter_map(|item| match (item.latitude, item.longitude) {
            (Some(lat), Some(lng)) => Some(MapPoint {
                id: item.id.clone(),
                name: item.name.clone(),
                lat,
                lng,
                address: item.address.clone(),
            }),
            _ => None,
        })
        .collect();

    Ok(SharedTrip {
        destination: trip.destination,
        start_date: trip.start_date,
        end_date: trip.end_date,
        items: items
            .into_iter()
            .map(|item| SharedItem {
                name: item.name,
                description: item.description,
                date: item.date,
                order: item.order,
                address: item.address,
            })
            .collect(),
        points,
    })
}
