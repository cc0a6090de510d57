use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::now_timestamp;
use crate::error::AppResult;
use crate::models::{row_to_user, CallerIdentity, User, USER_COLS};

/// Inserts the user unless one with the same external id exists.
/// Returns whether a row was created.
pub fn insert_if_missing(
    conn: &Connection,
    external_id: &str,
    email: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> AppResult<bool> {
    let now = now_timestamp();
    let inserted = conn.execute(
        "INSERT INTO users (id, external_id, email, first_name, last_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(external_id) DO NOTHING",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            external_id,
            email.trim().to_lowercase(),
            first_name,
            last_name,
            now
        ],
    )?;
    Ok(inserted > 0)
}

/// Returns the caller's user row, creating it on first sight.
pub fn ensure_user(conn: &Connection, caller: &CallerIdentity) -> AppResult<User> {
    if insert_if_missing(
        conn,
        &caller.subject,
        &caller.email,
        caller.first_name.as_deref(),
        caller.last_name.as_deref(),
    )? {
        tracing::info!("Created user for {} on first use", caller.subject);
    }

    // Rows created without an address pick up the caller's.
    let email = caller.email.trim().to_lowercase();
    if !email.is_empty() {
        conn.execute(
            "UPDATE users SET email = ?1, updated_at = ?2 WHERE external_id = ?3 AND email = ''",
            rusqlite::params![email, now_timestamp(), caller.subject],
        )?;
    }

    Ok(conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE external_id = ?1"),
        rusqlite::params![caller.subject],
        row_to_user,
    )?)
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE lower(email) = lower(?1) ORDER BY created_at LIMIT 1"),
            rusqlite::params![email.trim()],
            row_to_user,
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use crate::services::testing::{caller, pool};
    use rstest::rstest;

    #[rstest]
    fn ensure_user_is_idempotent(pool: DbPool) {
        let conn = pool.get().unwrap();
        let first = ensure_user(&conn, &caller("ana")).unwrap();
        let second = ensure_user(&conn, &caller("ana")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.email, "ana@example.com");
    }

    #[rstest]
    fn email_lookup_ignores_case(pool: DbPool) {
        let conn = pool.get().unwrap();
        insert_if_missing(&conn, "ext_1", "Ana@Example.com", Some("Ana"), None).unwrap();

        let found = find_by_email(&conn, "ANA@example.COM").unwrap().unwrap();
        assert_eq!(found.external_id, "ext_1");
        assert_eq!(found.first_name.as_deref(), Some("Ana"));
        assert!(find_by_email(&conn, "bob@example.com").unwrap().is_none());
    }

    #[rstest]
    fn blank_email_is_filled_from_caller(pool: DbPool) {
        let conn = pool.get().unwrap();
        insert_if_missing(&conn, "ana", "", None, None).unwrap();

        let user = ensure_user(&conn, &caller("ana")).unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(find_by_email(&conn, "ana@example.com").unwrap().unwrap().id, user.id);
    }

    #[rstest]
    fn duplicate_external_id_is_not_inserted(pool: DbPool) {
        let conn = pool.get().unwrap();
        assert!(insert_if_missing(&conn, "ext_1", "a@x.io", None, None).unwrap());
        assert!(!insert_if_missing(&conn, "ext_1", "b@x.io", None, None).unwrap());
    }
}
