use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            display_name  TEXT,
            deleted_at    TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per directed sharing grant; the reverse direction is a
        -- separate row. The composite key enforces at most one edge per
        -- ordered pair.
        CREATE TABLE IF NOT EXISTS partners (
            shared_by_id    TEXT NOT NULL REFERENCES users(id),
            shared_with_id  TEXT NOT NULL REFERENCES users(id),
            in_timeline     INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (shared_by_id, shared_with_id)
        );

        CREATE INDEX IF NOT EXISTS idx_partners_shared_with
            ON partners(shared_with_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
