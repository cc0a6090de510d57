//! Caller-to-trip access resolution.
//!
//! Every operation resolves access once on entry and branches on the returned
//! [`Role`]. Nothing is cached between requests.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{AppError, AppResult, OptionalRow};
use crate::models::{
    row_to_trip, row_to_user, CallerIdentity, CollaboratorRole, Trip, User, TRIP_COLS, USER_COLS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
    None,
}

impl Role {
    pub fn can_view(self) -> bool {
        !matches!(self, Role::None)
    }

    pub fn can_edit(self) -> bool {
        matches!(self, Role::Owner | Role::Editor)
    }

    pub fn is_owner(self) -> bool {
        matches!(self, Role::Owner)
    }
}

impl From<CollaboratorRole> for Role {
    /// A collaborator row carrying `owner` edits and invites like an editor;
    /// managing the trip itself stays with the user who owns the trip row.
    fn from(role: CollaboratorRole) -> Self {
        match role {
            CollaboratorRole::Owner | CollaboratorRole::Editor => Role::Editor,
            CollaboratorRole::Viewer => Role::Viewer,
        }
    }
}

/// Outcome of resolving a caller against a trip.
#[derive(Debug, Clone)]
pub struct Access {
    pub user: User,
    pub trip: Trip,
    pub role: Role,
}

impl Access {
    pub fn require_view(self) -> AppResult<Self> {
        if self.role.can_view() {
            Ok(self)
        } else {
            // Hide the trip's existence from callers with no relationship to it.
            Err(AppError::NotFound("Trip not found".into()))
        }
    }

    pub fn require_edit(self) -> AppResult<Self> {
        if self.role.can_edit() {
            Ok(self)
        } else if self.role.can_view() {
            Err(AppError::Unauthorized(
                "You don't have permission to edit this trip".into(),
            ))
        } else {
            Err(AppError::NotFound("Trip not found".into()))
        }
    }

    pub fn require_owner(self, action: &str) -> AppResult<Self> {
        if self.role.is_owner() {
            Ok(self)
        } else if self.role.can_view() {
            Err(AppError::Unauthorized(format!(
                "Only the trip owner can {action}"
            )))
        } else {
            Err(AppError::NotFound("Trip not found".into()))
        }
    }
}

/// Looks up the internal user for an asserted identity.
pub fn find_user(conn: &Connection, caller: &CallerIdentity) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE external_id = ?1"),
        rusqlite::params![caller.subject],
        row_to_user,
    )
    .optional()?
    .ok_or(AppError::Unauthenticated)
}

pub fn load_trip(conn: &Connection, trip_id: &str) -> AppResult<Trip> {
    conn.query_row(
        &format!("SELECT {TRIP_COLS} FROM trips WHERE id = ?1"),
        rusqlite::params![trip_id],
        row_to_trip,
    )
    .or_not_found("Trip")
}

/// Role of `user` on `trip`: ownership first, then collaborator membership.
pub fn role_for(conn: &Connection, user: &User, trip: &Trip) -> AppResult<Role> {
    if trip.user_id == user.id {
        return Ok(Role::Owner);
    }

    let collaborator_role: Option<CollaboratorRole> = conn
        .query_row(
            "SELECT role FROM trip_collaborators WHERE trip_id = ?1 AND user_id = ?2",
            rusqlite::params![trip.id, user.id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(collaborator_role.map(Role::from).unwrap_or(Role::None))
}

pub fn resolve_access(
    conn: &Connection,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Access> {
    let user = find_user(conn, caller)?;
    let trip = load_trip(conn, trip_id)?;
    let role = role_for(conn, &user, &trip)?;
    Ok(Access { user, trip, role })
}
