//! Itinerary mutations: add, remove, cost updates and per-day reordering.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::models::{row_to_item, CallerIdentity, ItineraryItem, ITEM_COLS};
use crate::services::access;
use crate::services::activity::{self, Entity};
use crate::services::notify::{self, Notifier};
use crate::services::trips::{self, DEFAULT_BASE_CURRENCY};
use crate::services::validate;

#[derive(Debug, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub date: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CostUpdate {
    pub cost_cents: Option<i64>,
    pub cost_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub date: String,
    pub item_ids: Vec<String>,
}

/// Result of an add. A dateless trip is a normal outcome, not an error.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddOutcome {
    Added { item: ItineraryItem },
    NeedsDates { message: String },
}

pub const NEEDS_DATES_MESSAGE: &str = "Set trip dates before adding itinerary items";

/// Next order for a day: one past the current maximum, 1 on an empty day.
pub fn next_order(conn: &Connection, trip_id: &str, date: &str) -> AppResult<i64> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), 0) FROM itinerary_items WHERE trip_id = ?1 AND date = ?2",
        rusqlite::params![trip_id, date],
        |row| row.get(0),
    )?;
    Ok(max + 1)
}

fn load_item(conn: &Connection, trip_id: &str, item_id: &str) -> AppResult<ItineraryItem> {
    conn.query_row(
        &format!("SELECT {ITEM_COLS} FROM itinerary_items WHERE id = ?1 AND trip_id = ?2"),
        rusqlite::params![item_id, trip_id],
        row_to_item,
    )
    .or_not_found("Itinerary item")
}

pub fn list_items(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Vec<ItineraryItem>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;
    trips::list_items(&conn, trip_id)
}

pub async fn add_item(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    input: NewItem,
) -> AppResult<AddOutcome> {
    let item = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Item name is required".into()));
        }

        let (start, end) = match (&access.trip.start_date, &access.trip.end_date) {
            (Some(start), Some(end)) => (validate::parse_day(start)?, validate::parse_day(end)?),
            _ => {
                return Ok(AddOutcome::NeedsDates {
                    message: NEEDS_DATES_MESSAGE.to_string(),
                })
            }
        };

        let day = validate::parse_day(&input.date)?;
        if day < start || day > end {
            return Err(AppError::Validation(
                "Item date must fall within the trip dates".into(),
            ));
        }
        validate::check_coordinates(input.latitude, input.longitude)?;

        let date = validate::format_day(day);
        let now = now_timestamp();
        let item = ItineraryItem {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.to_string(),
            name,
            description: validate::clean_text(input.description),
            order: next_order(&conn, trip_id, &date)?,
            date,
            latitude: input.latitude,
            longitude: input.longitude,
            address: validate::clean_text(input.address),
            cost_cents: None,
            cost_currency: None,
            created_at: now.clone(),
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO itinerary_items (id, trip_id, name, description, date, latitude, longitude, address, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                item.id,
                item.trip_id,
                item.name,
                item.description,
                item.date,
                item.latitude,
                item.longitude,
                item.address,
                item.order,
                item.created_at,
                item.updated_at
            ],
        )?;

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "added_item",
            Entity::Item(&item.id),
            Some(json!({ "name": item.name })),
        )?;
        item
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "itinerary-item-added", "item": item }),
    )
    .await;

    Ok(AddOutcome::Added { item })
}

/// Removes an item. Orders of the remaining items are left as they are.
pub async fn delete_item(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    item_id: &str,
) -> AppResult<()> {
    {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;
        let item = load_item(&conn, trip_id, item_id)?;

        conn.execute(
            "DELETE FROM itinerary_items WHERE id = ?1 AND trip_id = ?2",
            rusqlite::params![item_id, trip_id],
        )?;

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "removed_item",
            Entity::Item(item_id),
            Some(json!({ "name": item.name })),
        )?;
    }

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "itinerary-item-removed", "item_id": item_id }),
    )
    .await;

    Ok(())
}

pub async fn update_cost(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    item_id: &str,
    input: CostUpdate,
) -> AppResult<ItineraryItem> {
    let item = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;
        let mut item = load_item(&conn, trip_id, item_id)?;

        match input.cost_cents {
            None => {
                item.cost_cents = None;
                item.cost_currency = None;
            }
            Some(cents) if cents < 0 => {
                return Err(AppError::Validation("Cost cannot be negative".into()));
            }
            Some(cents) if cents > validate::MAX_AMOUNT_CENTS => {
                return Err(AppError::Validation("Cost is too large".into()));
            }
            Some(cents) => {
                item.cost_cents = Some(cents);
                item.cost_currency = Some(match input.cost_currency.as_deref() {
                    Some(code) if !code.trim().is_empty() => validate::normalize_currency(code)?,
                    _ => DEFAULT_BASE_CURRENCY.to_string(),
                });
            }
        }
        item.updated_at = now_timestamp();

        conn.execute(
            "UPDATE itinerary_items SET cost_cents = ?1, cost_currency = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![item.cost_cents, item.cost_currency, item.updated_at, item.id],
        )?;

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "updated_item_cost",
            Entity::Item(&item.id),
            Some(json!({
                "name": item.name,
                "cost_cents": item.cost_cents,
                "cost_currency": item.cost_currency,
            })),
        )?;
        item
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "itinerary-item-updated", "item": item }),
    )
    .await;

    Ok(item)
}

/// Renumbers the listed items of one day to 1..n in the given sequence.
///
/// Ids that are not on that day are dropped; unlisted items of the day keep
/// their order. All updates commit together.
pub async fn reorder_day(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    request: ReorderRequest,
) -> AppResult<Vec<ItineraryItem>> {
    if request.item_ids.is_empty() {
        return Err(AppError::Validation("No items to reorder".into()));
    }
    let date = validate::format_day(validate::parse_day(&request.date)?);

    let (items, ordered) = {
        let mut conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;

        let on_day: HashSet<String> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM itinerary_items WHERE trip_id = ?1 AND date = ?2",
            )?;
            let ids = stmt.query_map(rusqlite::params![trip_id, date], |row| {
                row.get::<_, String>(0)
            })?;
            ids.collect::<Result<HashSet<_>, _>>()?
        };

        let mut seen = HashSet::new();
        let ordered: Vec<String> = request
            .item_ids
            .into_iter()
            .filter(|id| on_day.contains(id) && seen.insert(id.clone()))
            .collect();

        let now = now_timestamp();
        let tx = conn.transaction()?;
        for (index, id) in ordered.iter().enumerate() {
            tx.execute(
                "UPDATE itinerary_items SET sort_order = ?1, updated_at = ?2 WHERE id = ?3 AND trip_id = ?4",
                rusqlite::params![index as i64 + 1, now, id, trip_id],
            )?;
        }
        activity::record(
            &tx,
            trip_id,
            &access.user.id,
            "reordered_items",
            Entity::Trip(trip_id),
            Some(json!({ "date": date, "item_ids": ordered })),
        )?;
        tx.commit()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLS} FROM itinerary_items WHERE trip_id = ?1 AND date = ?2 ORDER BY sort_order, created_at"
        ))?;
        let rows = stmt.query_map(rusqlite::params![trip_id, date], row_to_item)?;
        let items = rows.collect::<Result<Vec<_>, _>>()?;
        (items, ordered)
    };

    if ordered.is_empty() {
        tracing::debug!("Reorder on trip {trip_id} matched no items for {date}");
    }

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "itinerary-reordered", "date": date, "item_ids": ordered }),
    )
    .await;

    Ok(items)
}
