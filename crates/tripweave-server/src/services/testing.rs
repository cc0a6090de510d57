//! Fixtures shared by the service tests.

use std::sync::Mutex;

use async_trait::async_trait;
use rstest::fixture;
use rusqlite::Connection;

use crate::db::{create_memory_pool, now_timestamp, DbPool};
use crate::models::{CallerIdentity, CollaboratorRole, User};
use crate::services::notify::{Notifier, NotifyError};
use crate::services::users;

#[fixture]
pub fn pool() -> DbPool {
    create_memory_pool()
}

pub fn caller(subject: &str) -> CallerIdentity {
    CallerIdentity {
        subject: subject.to_string(),
        email: format!("{subject}@example.com"),
        first_name: None,
        last_name: None,
    }
}

pub fn seed_user(conn: &Connection, subject: &str) -> User {
    users::ensure_user(conn, &caller(subject)).unwrap()
}

/// Inserts a dateless trip owned by `owner` and returns its id.
pub fn seed_trip(conn: &Connection, owner: &User, destination: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO trips (id, user_id, destination, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, owner.id, destination, now, now],
    )
    .unwrap();
    id
}

pub fn seed_dated_trip(conn: &Connection, owner: &User, start: &str, end: &str) -> String {
    let id = seed_trip(conn, owner, "Paris");
    conn.execute(
        "UPDATE trips SET start_date = ?1, end_date = ?2 WHERE id = ?3",
        rusqlite::params![start, end, id],
    )
    .unwrap();
    id
}

pub fn add_collaborator(conn: &Connection, trip_id: &str, user: &User, role: CollaboratorRole) {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO trip_collaborators (id, trip_id, user_id, role, invited_at, accepted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5, ?5)",
        rusqlite::params![uuid::Uuid::new_v4().to_string(), trip_id, user.id, role, now],
    )
    .unwrap();
}

pub fn count(conn: &Connection, sql: &str, trip_id: &str) -> i64 {
    conn.query_row(sql, rusqlite::params![trip_id], |row| row.get(0))
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct Published {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Published>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<Published> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport("connection refused".into()));
        }
        self.events.lock().unwrap().push(Published {
            channel: channel.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
