//! Append-only, display-only trip activity feed.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{now_timestamp, DbPool};
use crate::error::AppResult;
use crate::models::{Activity, CallerIdentity};
use crate::services::access;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// What an activity row refers to.
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    Trip(&'a str),
    Item(&'a str),
    Collaborator(Option<&'a str>),
    Invitation(&'a str),
    Budget,
    Expense(&'a str),
}

impl Entity<'_> {
    fn parts(&self) -> (&'static str, Option<&str>) {
        match *self {
            Entity::Trip(id) => ("trip", Some(id)),
            Entity::Item(id) => ("itinerary_item", Some(id)),
            Entity::Collaborator(id) => ("collaborator", id),
            Entity::Invitation(id) => ("invitation", Some(id)),
            Entity::Budget => ("budget", None),
            Entity::Expense(id) => ("expense", Some(id)),
        }
    }
}

pub fn record(
    conn: &Connection,
    trip_id: &str,
    user_id: &str,
    action: &str,
    entity: Entity<'_>,
    metadata: Option<serde_json::Value>,
) -> AppResult<()> {
    let (entity_type, entity_id) = entity.parts();
    conn.execute(
        "INSERT INTO trip_activity (id, trip_id, user_id, action, entity_type, entity_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            trip_id,
            user_id,
            action,
            entity_type,
            entity_id,
            metadata.map(|m| m.to_string()),
            now_timestamp()
        ],
    )?;
    Ok(())
}

pub fn list(conn: &Connection, trip_id: &str, limit: i64) -> AppResult<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.trip_id, a.user_id, a.action, a.entity_type, a.entity_id, a.metadata, a.created_at,
                u.email, u.first_name, u.last_name
         FROM trip_activity a
         JOIN users u ON u.id = a.user_id
         WHERE a.trip_id = ?1
         ORDER BY a.created_at DESC, a.rowid DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![trip_id, limit], |row| {
        let metadata: Option<String> = row.get(6)?;
        Ok(Activity {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            user_id: row.get(2)?,
            action: row.get(3)?,
            entity_type: row.get(4)?,
            entity_id: row.get(5)?,
            // Metadata is free-form; unparseable text is surfaced as a plain string.
            metadata: metadata.map(|m| {
                serde_json::from_str(&m).unwrap_or(serde_json::Value::String(m))
            }),
            created_at: row.get(7)?,
            actor_email: row.get(8)?,
            actor_first_name: row.get(9)?,
            actor_last_name: row.get(10)?,
        })
    })?;
    let activity: Result<Vec<_>, _> = rows.collect();
    Ok(activity?)
}

pub fn feed(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
    limit: Option<i64>,
) -> AppResult<Vec<Activity>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    list(&conn, trip_id, limit)
}
