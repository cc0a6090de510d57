use rusqlite::Connection;

const SCHEMA: &str = include_str!("schema.sql");

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    // Older databases allowed several pending invitations per trip and email.
    // Keep the newest of each before the unique index is built.
    if has_index(conn, "idx_pending_invitations_trip_email")? {
        conn.execute_batch(
            "DELETE FROM pending_invitations WHERE rowid NOT IN (
                 SELECT MAX(rowid) FROM pending_invitations GROUP BY trip_id, email
             );
             DROP INDEX idx_pending_invitations_trip_email;",
        )?;
    }

    conn.execute_batch(SCHEMA)?;

    // Databases created before multi-currency budgets lack these columns.
    if !has_column(conn, "trips", "base_currency")? {
        conn.execute_batch(
            "ALTER TABLE trips ADD COLUMN base_currency TEXT NOT NULL DEFAULT 'USD';",
        )?;
    }
    if !has_column(conn, "itinerary_items", "cost_cents")? {
        conn.execute_batch(
            "ALTER TABLE itinerary_items ADD COLUMN cost_cents INTEGER;
             ALTER TABLE itinerary_items ADD COLUMN cost_currency TEXT;",
        )?;
    }

    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table, column],
        |row| row.get::<_, i64>(0),
    )
    .map(|c| c > 0)
}

fn has_index(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        rusqlite::params![name],
        |row| row.get::<_, i64>(0),
    )
    .map(|c| c > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        assert!(has_column(&conn, "trips", "base_currency").unwrap());
        assert!(has_column(&conn, "itinerary_items", "cost_currency").unwrap());
    }

    #[test]
    fn legacy_trips_table_gains_base_currency() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE trips (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                destination TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT,
                is_public INTEGER NOT NULL DEFAULT 0,
                share_id TEXT UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO trips (id, user_id, destination, created_at, updated_at)
            VALUES ('t1', 'u1', 'Lisbon', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z');",
        )
        .unwrap();

        run(&conn).unwrap();

        let currency: String = conn
            .query_row("SELECT base_currency FROM trips WHERE id = 't1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(currency, "USD");
    }

    #[test]
    fn duplicate_pending_invitations_collapse_to_newest() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE pending_invitations (
                id TEXT PRIMARY KEY,
                trip_id TEXT NOT NULL,
                email TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'viewer',
                invited_by TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_pending_invitations_trip_email ON pending_invitations(trip_id, email);
            INSERT INTO pending_invitations VALUES ('old', 't1', 'a@example.com', 'viewer', 'u1', 'tok1', 'x', 'x');
            INSERT INTO pending_invitations VALUES ('new', 't1', 'a@example.com', 'editor', 'u1', 'tok2', 'x', 'x');",
        )
        .unwrap();

        run(&conn).unwrap();

        let ids: Vec<String> = conn
            .prepare("SELECT id FROM pending_invitations")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec!["new".to_string()]);
        assert!(!has_index(&conn, "idx_pending_invitations_trip_email").unwrap());

        let duplicate = conn.execute(
            "INSERT INTO pending_invitations VALUES ('again', 't1', 'a@example.com', 'viewer', 'u1', 'tok3', 'x', 'x')",
            [],
        );
        assert!(duplicate.is_err());
    }
}
