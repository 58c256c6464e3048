use rusqlite::Connection;
use uuid::Uuid;

use alcove_types::models::UserSnapshot;

use crate::Database;
use crate::error::StoreError;
use crate::models::UserSnapshotRow;

impl Database {
    /// Registers a user and returns its stored snapshot.
    pub fn create_user(
        &self,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<UserSnapshot, StoreError> {
        let id = Uuid::new_v4();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.to_string(), username, display_name],
            )
            .map_err(|e| StoreError::from_write(e, "create user"))?;

            query_snapshot(conn, id, false)?
                .ok_or_else(|| StoreError::Integrity(format!("user {id} vanished after insert")))
        })
    }

    /// Public columns of a live user; `None` for unknown or soft-deleted ids.
    pub fn get_user_snapshot(&self, id: Uuid) -> Result<Option<UserSnapshot>, StoreError> {
        self.with_conn(|conn| query_snapshot(conn, id, true))
    }

    /// Marks the account deleted. Its partner edges stay in storage but drop
    /// out of the filtered read path until the account is restored.
    pub fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET deleted_at = datetime('now') WHERE id = ?1",
                [id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }

    pub fn restore_user(&self, id: Uuid) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET deleted_at = NULL WHERE id = ?1",
                [id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }
}

fn query_snapshot(
    conn: &Connection,
    id: Uuid,
    live_only: bool,
) -> Result<Option<UserSnapshot>, StoreError> {
    let sql = if live_only {
        "SELECT id, username, display_name, created_at FROM users
         WHERE id = ?1 AND deleted_at IS NULL"
    } else {
        "SELECT id, username, display_name, created_at FROM users WHERE id = ?1"
    };

    let mut stmt = conn.prepare(sql)?;
    let row = stmt
        .query_row([id.to_string()], |row| {
            Ok(UserSnapshotRow {
                id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    row.map(UserSnapshotRow::into_snapshot).transpose()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
