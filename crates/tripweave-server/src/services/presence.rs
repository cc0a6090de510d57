use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{now_timestamp, timestamp, DbPool};
use crate::error::AppResult;
use crate::models::{CallerIdentity, Presence};
use crate::services::access;
use crate::services::notify::{self, Notifier};

/// How recently a user must have been seen to count as active.
pub const ACTIVE_WINDOW_SECS: i64 = 120;

#[derive(Debug, Default, Deserialize)]
pub struct Heartbeat {
    pub is_active: Option<bool>,
}

pub async fn heartbeat(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    input: Heartbeat,
) -> AppResult<Presence> {
    let is_active = input.is_active.unwrap_or(true);

    let presence = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_view()?;
        let now = now_timestamp();

        conn.execute(
            "INSERT INTO user_presence (id, trip_id, user_id, last_seen_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(trip_id, user_id) DO UPDATE SET last_seen_at = excluded.last_seen_at, is_active = excluded.is_active",
            rusqlite::params![Uuid::new_v4().to_string(), trip_id, access.user.id, now, is_active],
        )?;

        Presence {
            user_id: access.user.id,
            email: access.user.email,
            first_name: access.user.first_name,
            last_name: access.user.last_name,
            last_seen_at: now,
            is_active,
        }
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::USER_PRESENCE,
        json!({
            "user_id": presence.user_id,
            "email": presence.email,
            "first_name": presence.first_name,
            "last_name": presence.last_name,
            "is_active": presence.is_active,
        }),
    )
    .await;

    Ok(presence)
}

/// Users marked active and seen within the active window, most recent first.
pub fn active_users(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Vec<Presence>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;
    let cutoff = timestamp(Utc::now() - Duration::seconds(ACTIVE_WINDOW_SECS));

    let mut stmt = conn.prepare(
        "SELECT p.user_id, u.email, u.first_name, u.last_name, p.last_seen_at, p.is_active
         FROM user_presence p
         JOIN users u ON u.id = p.user_id
         WHERE p.trip_id = ?1 AND p.is_active = 1 AND p.last_seen_at >= ?2
         ORDER BY p.last_seen_at DESC",
    )?;
    let rows = stmt.query_map(rusqlite::params![trip_id, cutoff], |row| {
        Ok(Presence {
            user_id: row.get(0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            last_seen_at: row.get(4)?,
            is_active: row.get(5)?,
        })
    })?;
    let presences: Result<Vec<_>, _> = rows.collect();
    Ok(presences?)
}
