//! Collaborator management and the invitation lifecycle.
//!
//! Inviting a known email adds the collaborator immediately. Unknown emails
//! get a pending invitation whose token is shared out of band and accepted
//! later by whoever signs in with that email.

use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{now_timestamp, timestamp, DbPool};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::models::{
    row_to_collaborator, row_to_invitation, CallerIdentity, Collaborator, CollaboratorRole,
    PendingInvitation, COLLABORATOR_COLS, INVITATION_COLS,
};
use crate::services::access::{self, Role};
use crate::services::activity::{self, Entity};
use crate::services::notify::{self, Notifier};
use crate::services::{users, validate};

pub const INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct InviteInput {
    pub email: String,
    pub role: Option<CollaboratorRole>,
}

#[derive(Debug, Deserialize)]
pub struct RoleInput {
    pub role: CollaboratorRole,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InviteOutcome {
    Added {
        collaborator: Collaborator,
    },
    Pending {
        invitation: PendingInvitation,
        invite_link: String,
    },
}

#[derive(Debug, Serialize)]
pub struct InvitationPreview {
    pub trip_id: String,
    pub destination: String,
    pub email: String,
    pub role: CollaboratorRole,
    pub expires_at: String,
    pub invited_by_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub trip_id: String,
    pub already_collaborator: bool,
}

fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn invitable_role(role: CollaboratorRole) -> AppResult<CollaboratorRole> {
    match role {
        CollaboratorRole::Editor | CollaboratorRole::Viewer => Ok(role),
        CollaboratorRole::Owner => Err(AppError::Validation(
            "Role must be editor or viewer".into(),
        )),
    }
}

fn load_collaborator(conn: &Connection, trip_id: &str, collaborator_id: &str) -> AppResult<Collaborator> {
    conn.query_row(
        &format!(
            "SELECT {COLLABORATOR_COLS} FROM trip_collaborators c JOIN users u ON u.id = c.user_id
             WHERE c.id = ?1 AND c.trip_id = ?2"
        ),
        rusqlite::params![collaborator_id, trip_id],
        row_to_collaborator,
    )
    .or_not_found("Collaborator")
}

fn is_collaborator(conn: &Connection, trip_id: &str, user_id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM trip_collaborators WHERE trip_id = ?1 AND user_id = ?2)",
        rusqlite::params![trip_id, user_id],
        |row| row.get(0),
    )?)
}

/// Looks up an invitation by token, rejecting unknown and expired ones.
fn live_invitation(conn: &Connection, token: &str, now: &str) -> AppResult<PendingInvitation> {
    let invitation = conn
        .query_row(
            &format!("SELECT {INVITATION_COLS} FROM pending_invitations WHERE token = ?1"),
            rusqlite::params![token],
            row_to_invitation,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("Invalid invitation".into()))?;

    if invitation.expires_at.as_str() <= now {
        return Err(AppError::Expired(
            "This invitation has expired. Ask the trip owner for a new one".into(),
        ));
    }
    Ok(invitation)
}

pub async fn invite(
    pool: &DbPool,
    notifier: &dyn Notifier,
    config: &Config,
    caller: &CallerIdentity,
    trip_id: &str,
    input: InviteInput,
) -> AppResult<InviteOutcome> {
    let email = validate::normalize_email(&input.email)?;
    let role = invitable_role(input.role.unwrap_or(CollaboratorRole::Viewer))?;

    let outcome = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?;
        if !access.role.can_edit() {
            return Err(match access.role {
                Role::None => AppError::NotFound("Trip not found".into()),
                _ => AppError::Unauthorized(
                    "You don't have permission to invite collaborators".into(),
                ),
            });
        }
        let now = now_timestamp();

        if let Some(invitee) = users::find_by_email(&conn, &email)? {
            if invitee.id == access.trip.user_id {
                return Err(AppError::Conflict("That user owns this trip".into()));
            }
            if is_collaborator(&conn, trip_id, &invitee.id)? {
                return Err(AppError::Conflict("User is already a collaborator".into()));
            }

            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO trip_collaborators (id, trip_id, user_id, role, invited_by, invited_at, accepted_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6, ?6)",
                rusqlite::params![id, trip_id, invitee.id, role, access.user.id, now],
            )
            .map_err(|e| AppError::conflict_on_constraint(e, "User is already a collaborator"))?;

            activity::record(
                &conn,
                trip_id,
                &access.user.id,
                "invited_collaborator",
                Entity::Collaborator(Some(invitee.id.as_str())),
                Some(json!({ "email": email, "role": role })),
            )?;

            InviteOutcome::Added {
                collaborator: load_collaborator(&conn, trip_id, &id)?,
            }
        } else {
            let existing = conn
                .query_row(
                    &format!("SELECT {INVITATION_COLS} FROM pending_invitations WHERE trip_id = ?1 AND email = ?2"),
                    rusqlite::params![trip_id, email],
                    row_to_invitation,
                )
                .optional()?;
            if let Some(existing) = existing {
                if existing.expires_at > now {
                    return Err(AppError::Conflict(
                        "Invitation already sent to this email".into(),
                    ));
                }
                conn.execute(
                    "DELETE FROM pending_invitations WHERE id = ?1",
                    rusqlite::params![existing.id],
                )?;
            }

            let invitation = PendingInvitation {
                id: Uuid::new_v4().to_string(),
                trip_id: trip_id.to_string(),
                email: email.clone(),
                role,
                invited_by: access.user.id.clone(),
                token: generate_token(),
                expires_at: timestamp(Utc::now() + Duration::days(INVITATION_TTL_DAYS)),
                created_at: now,
            };
            conn.execute(
                &format!("INSERT INTO pending_invitations ({INVITATION_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                rusqlite::params![
                    invitation.id,
                    invitation.trip_id,
                    invitation.email,
                    invitation.role,
                    invitation.invited_by,
                    invitation.token,
                    invitation.expires_at,
                    invitation.created_at
                ],
            )
            .map_err(|e| AppError::conflict_on_constraint(e, "Invitation already sent to this email"))?;

            activity::record(
                &conn,
                trip_id,
                &access.user.id,
                "invited_collaborator",
                Entity::Collaborator(None),
                Some(json!({ "email": email, "role": role, "pending": true })),
            )?;

            let invite_link = config.invite_link(&invitation.token);
            InviteOutcome::Pending {
                invitation,
                invite_link,
            }
        }
    };

    if let InviteOutcome::Added { collaborator } = &outcome {
        notify::notify_trip(
            notifier,
            trip_id,
            notify::COLLABORATOR_UPDATE,
            json!({ "type": "collaborator-added", "collaborator": collaborator }),
        )
        .await;
    }

    Ok(outcome)
}

/// Public details of an invitation, shown before the invitee signs in.
pub fn preview_invitation(pool: &DbPool, token: &str) -> AppResult<InvitationPreview> {
    let conn = pool.get()?;
    let invitation = live_invitation(&conn, token, &now_timestamp())?;

    let destination: String = conn
        .query_row(
            "SELECT destination FROM trips WHERE id = ?1",
            rusqlite::params![invitation.trip_id],
            |row| row.get(0),
        )
        .or_not_found("Trip")?;
    let invited_by_email: Option<String> = conn
        .query_row(
            "SELECT email FROM users WHERE id = ?1",
            rusqlite::params![invitation.invited_by],
            |row| row.get(0),
        )
        .optional()?;

    Ok(InvitationPreview {
        trip_id: invitation.trip_id,
        destination,
        email: invitation.email,
        role: invitation.role,
        expires_at: invitation.expires_at,
        invited_by_email,
    })
}

pub async fn accept_invitation(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    token: &str,
) -> AppResult<Accepted> {
    let (accepted, collaborator) = {
        let mut conn = pool.get()?;
        let user = users::ensure_user(&conn, caller)?;
        let now = now_timestamp();

        let tx = conn.transaction()?;
        let invitation = live_invitation(&tx, token, &now)?;

        let trip_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM trips WHERE id = ?1)",
            rusqlite::params![invitation.trip_id],
            |row| row.get(0),
        )?;
        if !trip_exists {
            return Err(AppError::NotFound("Trip not found".into()));
        }

        let current = user.email.trim().to_lowercase();
        if current != invitation.email {
            return Err(AppError::EmailMismatch {
                invited: invitation.email,
                current,
            });
        }

        if is_collaborator(&tx, &invitation.trip_id, &user.id)? {
            tx.execute(
                "DELETE FROM pending_invitations WHERE id = ?1",
                rusqlite::params![invitation.id],
            )?;
            tx.commit()?;
            return Ok(Accepted {
                trip_id: invitation.trip_id,
                already_collaborator: true,
            });
        }

        let collaborator_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO trip_collaborators (id, trip_id, user_id, role, invited_by, invited_at, accepted_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
            rusqlite::params![
                collaborator_id,
                invitation.trip_id,
                user.id,
                invitation.role,
                invitation.invited_by,
                invitation.created_at,
                now
            ],
        )?;
        tx.execute(
            "DELETE FROM pending_invitations WHERE id = ?1",
            rusqlite::params![invitation.id],
        )?;
        activity::record(
            &tx,
            &invitation.trip_id,
            &user.id,
            "accepted_invitation",
            Entity::Collaborator(Some(collaborator_id.as_str())),
            Some(json!({ "role": invitation.role })),
        )?;
        let collaborator = load_collaborator(&tx, &invitation.trip_id, &collaborator_id)?;
        tx.commit()?;

        tracing::info!("User {} joined trip {}", user.id, invitation.trip_id);
        (
            Accepted {
                trip_id: invitation.trip_id,
                already_collaborator: false,
            },
            collaborator,
        )
    };

    notify::notify_trip(
        notifier,
        &accepted.trip_id,
        notify::COLLABORATOR_UPDATE,
        json!({ "type": "collaborator-added", "collaborator": collaborator }),
    )
    .await;

    Ok(accepted)
}

/// Withdraws a pending invitation. Allowed for the inviter and the trip owner.
pub fn cancel_invitation(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
    invitation_id: &str,
) -> AppResult<()> {
    let conn = pool.get()?;
    let access = access::resolve_access(&conn, caller, trip_id)?.require_view()?;

    let invitation = conn
        .query_row(
            &format!("SELECT {INVITATION_COLS} FROM pending_invitations WHERE id = ?1 AND trip_id = ?2"),
            rusqlite::params![invitation_id, trip_id],
            row_to_invitation,
        )
        .or_not_found("Invitation")?;

    if !access.role.is_owner() && invitation.invited_by != access.user.id {
        return Err(AppError::Unauthorized(
            "Only the inviter or the trip owner can cancel this invitation".into(),
        ));
    }

    conn.execute(
        "DELETE FROM pending_invitations WHERE id = ?1",
        rusqlite::params![invitation.id],
    )?;
    activity::record(
        &conn,
        trip_id,
        &access.user.id,
        "cancelled_invitation",
        Entity::Invitation(&invitation.id),
        Some(json!({ "email": invitation.email })),
    )?;
    Ok(())
}

pub async fn remove_collaborator(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    collaborator_id: &str,
) -> AppResult<()> {
    {
        let conn = pool.get()?;
        let access =
            access::resolve_access(&conn, caller, trip_id)?.require_owner("remove collaborators")?;
        let collaborator = load_collaborator(&conn, trip_id, collaborator_id)?;

        conn.execute(
            "DELETE FROM trip_collaborators WHERE id = ?1 AND trip_id = ?2",
            rusqlite::params![collaborator.id, trip_id],
        )?;
        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "removed_collaborator",
            Entity::Collaborator(Some(collaborator.id.as_str())),
            Some(json!({ "email": collaborator.email })),
        )?;
    }

    notify::notify_trip(
        notifier,
        trip_id,
        notify::COLLABORATOR_UPDATE,
        json!({ "type": "collaborator-removed", "collaborator_id": collaborator_id }),
    )
    .await;

    Ok(())
}

pub async fn change_role(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    collaborator_id: &str,
    input: RoleInput,
) -> AppResult<Collaborator> {
    let role = invitable_role(input.role)?;

    let collaborator = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_owner("update roles")?;
        load_collaborator(&conn, trip_id, collaborator_id)?;

        conn.execute(
            "UPDATE trip_collaborators SET role = ?1, updated_at = ?2 WHERE id = ?3 AND trip_id = ?4",
            rusqlite::params![role, now_timestamp(), collaborator_id, trip_id],
        )?;
        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "updated_collaborator_role",
            Entity::Collaborator(Some(collaborator_id)),
            Some(json!({ "role": role })),
        )?;
        load_collaborator(&conn, trip_id, collaborator_id)?
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::COLLABORATOR_UPDATE,
        json!({
            "type": "collaborator-role-updated",
            "collaborator_id": collaborator_id,
            "role": role,
        }),
    )
    .await;

    Ok(collaborator)
}

pub fn list_collaborators(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Vec<Collaborator>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {COLLABORATOR_COLS} FROM trip_collaborators c JOIN users u ON u.id = c.user_id
         WHERE c.trip_id = ?1 ORDER BY c.created_at"
    ))?;
    let rows = stmt.query_map(rusqlite::params![trip_id], row_to_collaborator)?;
    let collaborators: Result<Vec<_>, _> = rows.collect();
    Ok(collaborators?)
}

pub fn list_invitations(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Vec<PendingInvitation>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {INVITATION_COLS} FROM pending_invitations WHERE trip_id = ?1 ORDER BY created_at"
    ))?;
    let rows = stmt.query_map(rusqlite::params![trip_id], row_to_invitation)?;
    let invitations: Result<Vec<_>, _> = rows.collect();
    Ok(invitations?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{
        add_collaborator, caller, count, pool, seed_trip, seed_user, RecordingNotifier,
    };
    use chrono::DateTime;
    use rstest::rstest;

    fn invite_input(email: &str, role: CollaboratorRole) -> InviteInput {
        InviteInput {
            email: email.to_string(),
            role: Some(role),
        }
    }

    async fn pending(pool: &DbPool, trip: &str, email: &str) -> (PendingInvitation, String) {
        match invite(
            pool,
            &RecordingNotifier::default(),
            &Config::for_tests(),
            &caller("owner"),
            trip,
            invite_input(email, CollaboratorRole::Editor),
        )
        .await
        .unwrap()
        {
            InviteOutcome::Pending { invitation, invite_link } => (invitation, invite_link),
            other => panic!("expected pending invitation, got {other:?}"),
        }
    }

    fn owned_trip(pool: &DbPool) -> String {
        let conn = pool.get().unwrap();
        let owner = seed_user(&conn, "owner");
        seed_trip(&conn, &owner, "Lisbon")
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_email_gets_week_long_pending_invite(pool: DbPool) {
        let trip = owned_trip(&pool);
        let before = Utc::now();
        let (invitation, link) = pending(&pool, &trip, " New@Example.com ").await;

        assert_eq!(invitation.email, "new@example.com");
        assert_eq!(invitation.token.len(), 64);
        assert_eq!(link, format!("http://localhost:3000/invite/{}", invitation.token));

        let expires = DateTime::parse_from_rfc3339(&invitation.expires_at).unwrap();
        let ttl = expires.with_timezone(&Utc) - before;
        assert!(ttl >= Duration::days(7) - Duration::seconds(1));
        assert!(ttl <= Duration::days(7) + Duration::seconds(5));
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_pending_invite_conflicts(pool: DbPool) {
        let trip = owned_trip(&pool);
        pending(&pool, &trip, "new@example.com").await;

        let again = invite(
            &pool,
            &RecordingNotifier::default(),
            &Config::for_tests(),
            &caller("owner"),
            &trip,
            invite_input("NEW@example.com", CollaboratorRole::Viewer),
        )
        .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        // A racing insert that slipped past the read still hits the unique index.
        let conn = pool.get().unwrap();
        let raced = conn
            .execute(
                "INSERT INTO pending_invitations (id, trip_id, email, role, invited_by, token, expires_at, created_at)
                 SELECT 'raced', trip_id, email, role, invited_by, 'other-token', expires_at, created_at
                 FROM pending_invitations WHERE trip_id = ?1",
                rusqlite::params![trip],
            )
            .map_err(|e| AppError::conflict_on_constraint(e, "Invitation already sent to this email"));
        assert!(matches!(raced, Err(AppError::Conflict(_))));
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM pending_invitations WHERE trip_id = ?1", &trip),
            1
        );
    }

    #[rstest]
    #[tokio::test]
    async fn expired_pending_invite_is_replaced(pool: DbPool) {
        let trip = owned_trip(&pool);
        let (first, _) = pending(&pool, &trip, "new@example.com").await;
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "UPDATE pending_invitations SET expires_at = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                rusqlite::params![first.id],
            )
            .unwrap();
        }
        let (second, _) = pending(&pool, &trip, "new@example.com").await;
        assert_ne!(first.token, second.token);

        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM pending_invitations WHERE trip_id = ?1", &trip), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn known_email_is_added_immediately(pool: DbPool) {
        let trip = owned_trip(&pool);
        {
            let conn = pool.get().unwrap();
            seed_user(&conn, "friend");
        }
        let notifier = RecordingNotifier::default();

        let outcome = invite(
            &pool,
            &notifier,
            &Config::for_tests(),
            &caller("owner"),
            &trip,
            invite_input("friend@example.com", CollaboratorRole::Viewer),
        )
        .await
        .unwrap();
        let InviteOutcome::Added { collaborator } = outcome else {
            panic!("expected immediate add");
        };
        assert_eq!(collaborator.role, CollaboratorRole::Viewer);
        assert!(collaborator.accepted_at.is_some());

        let events = notifier.events();
        assert_eq!(events[0].event, "collaborator-update");
        assert_eq!(events[0].payload["type"], "collaborator-added");

        let again = invite(
            &pool,
            &notifier,
            &Config::for_tests(),
            &caller("owner"),
            &trip,
            invite_input("friend@example.com", CollaboratorRole::Editor),
        )
        .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn invite_rules(pool: DbPool) {
        let trip = owned_trip(&pool);
        {
            let conn = pool.get().unwrap();
            let viewer = seed_user(&conn, "viewer");
            add_collaborator(&conn, &trip, &viewer, CollaboratorRole::Viewer);
        }
        let notifier = RecordingNotifier::default();
        let config = Config::for_tests();

        let owner_self = invite(&pool, &notifier, &config, &caller("owner"), &trip, invite_input("owner@example.com", CollaboratorRole::Editor)).await;
        assert!(matches!(owner_self, Err(AppError::Conflict(_))));

        let as_owner_role = invite(&pool, &notifier, &config, &caller("owner"), &trip, invite_input("x@example.com", CollaboratorRole::Owner)).await;
        assert!(matches!(as_owner_role, Err(AppError::Validation(_))));

        let bad_email = invite(&pool, &notifier, &config, &caller("owner"), &trip, invite_input("not-an-email", CollaboratorRole::Viewer)).await;
        assert!(matches!(bad_email, Err(AppError::Validation(_))));

        let by_viewer = invite(&pool, &notifier, &config, &caller("viewer"), &trip, invite_input("x@example.com", CollaboratorRole::Viewer)).await;
        assert!(matches!(by_viewer, Err(AppError::Unauthorized(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn accepting_adds_exactly_one_collaborator(pool: DbPool) {
        let trip = owned_trip(&pool);
        let (invitation, _) = pending(&pool, &trip, "new@example.com").await;
        let notifier = RecordingNotifier::default();

        let preview = preview_invitation(&pool, &invitation.token).unwrap();
        assert_eq!(preview.destination, "Lisbon");
        assert_eq!(preview.role, CollaboratorRole::Editor);
        assert_eq!(preview.invited_by_email.as_deref(), Some("owner@example.com"));

        let accepted = accept_invitation(&pool, &notifier, &caller("new"), &invitation.token)
            .await
            .unwrap();
        assert_eq!(accepted.trip_id, trip);
        assert!(!accepted.already_collaborator);

        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM trip_collaborators WHERE trip_id = ?1", &trip), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM pending_invitations WHERE trip_id = ?1", &trip), 0);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM trip_activity WHERE trip_id = ?1 AND action = 'accepted_invitation'", &trip),
            1
        );
        let role: String = conn
            .query_row("SELECT role FROM trip_collaborators WHERE trip_id = ?1", rusqlite::params![trip], |r| r.get(0))
            .unwrap();
        assert_eq!(role, "editor");
        drop(conn);

        assert_eq!(notifier.events()[0].payload["type"], "collaborator-added");
        let reused = accept_invitation(&pool, &notifier, &caller("new"), &invitation.token).await;
        assert!(matches!(reused, Err(AppError::NotFound(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn expired_invitation_adds_nobody(pool: DbPool) {
        let trip = owned_trip(&pool);
        let (invitation, _) = pending(&pool, &trip, "new@example.com").await;
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "UPDATE pending_invitations SET expires_at = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                rusqlite::params![invitation.id],
            )
            .unwrap();
        }

        let preview = preview_invitation(&pool, &invitation.token);
        assert!(matches!(preview, Err(AppError::Expired(_))));
        let result = accept_invitation(&pool, &RecordingNotifier::default(), &caller("new"), &invitation.token).await;
        assert!(matches!(result, Err(AppError::Expired(_))));

        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM trip_collaborators WHERE trip_id = ?1", &trip), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn email_mismatch_is_reported_not_corrected(pool: DbPool) {
        let trip = owned_trip(&pool);
        let (invitation, _) = pending(&pool, &trip, "new@example.com").await;

        let result = accept_invitation(&pool, &RecordingNotifier::default(), &caller("someone"), &invitation.token).await;
        match result {
            Err(AppError::EmailMismatch { invited, current }) => {
                assert_eq!(invited, "new@example.com");
                assert_eq!(current, "someone@example.com");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM pending_invitations WHERE trip_id = ?1", &trip), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn existing_collaborator_acceptance_just_consumes_invite(pool: DbPool) {
        let trip = owned_trip(&pool);
        let (invitation, _) = pending(&pool, &trip, "new@example.com").await;
        {
            let conn = pool.get().unwrap();
            let user = seed_user(&conn, "new");
            add_collaborator(&conn, &trip, &user, CollaboratorRole::Viewer);
        }

        let accepted = accept_invitation(&pool, &RecordingNotifier::default(), &caller("new"), &invitation.token)
            .await
            .unwrap();
        assert!(accepted.already_collaborator);

        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM trip_collaborators WHERE trip_id = ?1", &trip), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM pending_invitations WHERE trip_id = ?1", &trip), 0);
    }

    #[rstest]
    fn unknown_token_is_not_found(pool: DbPool) {
        assert!(matches!(preview_invitation(&pool, "nope"), Err(AppError::NotFound(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn cancel_requires_inviter_or_owner(pool: DbPool) {
        let trip = owned_trip(&pool);
        {
            let conn = pool.get().unwrap();
            let ed = seed_user(&conn, "ed");
            let other = seed_user(&conn, "other");
            add_collaborator(&conn, &trip, &ed, CollaboratorRole::Editor);
            add_collaborator(&conn, &trip, &other, CollaboratorRole::Editor);
        }
        let outcome = invite(
            &pool,
            &RecordingNotifier::default(),
            &Config::for_tests(),
            &caller("ed"),
            &trip,
            invite_input("new@example.com", CollaboratorRole::Viewer),
        )
        .await
        .unwrap();
        let InviteOutcome::Pending { invitation, .. } = outcome else {
            panic!("expected pending invitation");
        };

        let denied = cancel_invitation(&pool, &caller("other"), &trip, &invitation.id);
        assert!(matches!(denied, Err(AppError::Unauthorized(_))));
        cancel_invitation(&pool, &caller("ed"), &trip, &invitation.id).unwrap();
        assert!(list_invitations(&pool, &caller("owner"), &trip).unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn only_owner_manages_collaborators(pool: DbPool) {
        let trip = owned_trip(&pool);
        {
            let conn = pool.get().unwrap();
            let ed = seed_user(&conn, "ed");
            let vi = seed_user(&conn, "vi");
            add_collaborator(&conn, &trip, &ed, CollaboratorRole::Editor);
            add_collaborator(&conn, &trip, &vi, CollaboratorRole::Viewer);
        }
        let notifier = RecordingNotifier::default();
        let collaborators = list_collaborators(&pool, &caller("vi"), &trip).unwrap();
        let vi_row = collaborators.iter().find(|c| c.email == "vi@example.com").unwrap().id.clone();
        let ed_row = collaborators.iter().find(|c| c.email == "ed@example.com").unwrap().id.clone();

        let denied = remove_collaborator(&pool, &notifier, &caller("ed"), &trip, &vi_row).await;
        assert!(matches!(denied, Err(AppError::Unauthorized(_))));
        let denied = change_role(&pool, &notifier, &caller("ed"), &trip, &vi_row, RoleInput { role: CollaboratorRole::Editor }).await;
        assert!(matches!(denied, Err(AppError::Unauthorized(_))));
        let denied = change_role(&pool, &notifier, &caller("vi"), &trip, &ed_row, RoleInput { role: CollaboratorRole::Viewer }).await;
        assert!(matches!(denied, Err(AppError::Unauthorized(_))));
        let denied = change_role(&pool, &notifier, &caller("vi"), &trip, &vi_row, RoleInput { role: CollaboratorRole::Editor }).await;
        assert!(matches!(denied, Err(AppError::Unauthorized(_))));
        assert!(notifier.events().is_empty());

        let promoted = change_role(&pool, &notifier, &caller("owner"), &trip, &vi_row, RoleInput { role: CollaboratorRole::Editor })
            .await
            .unwrap();
        assert_eq!(promoted.role, CollaboratorRole::Editor);

        remove_collaborator(&pool, &notifier, &caller("owner"), &trip, &vi_row).await.unwrap();
        assert_eq!(list_collaborators(&pool, &caller("owner"), &trip).unwrap().len(), 1);

        let types: Vec<_> = notifier.events().iter().map(|e| e.payload["type"].clone()).collect();
        assert_eq!(types, vec![json!("collaborator-role-updated"), json!("collaborator-removed")]);

        let gone = remove_collaborator(&pool, &notifier, &caller("owner"), &trip, &vi_row).await;
        assert!(matches!(gone, Err(AppError::NotFound(_))));
    }
}
