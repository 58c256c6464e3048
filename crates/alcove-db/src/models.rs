//! Database row types that map directly to SQLite rows.
//! Distinct from the alcove-types domain models to keep the DB layer
//! independent of the shapes handed to callers.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use alcove_types::models::UserSnapshot;

use crate::error::StoreError;

pub struct UserSnapshotRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

/// A partner edge as read back from storage. The snapshot fields come from
/// the user-table joins: always present on the filtered read path, while a
/// `None` on the post-write path is an integrity fault.
pub struct PartnerRow {
    pub shared_by_id: String,
    pub shared_with_id: String,
    pub in_timeline: bool,
    pub created_at: String,
    pub updated_at: String,
    pub shared_by: Option<UserSnapshotRow>,
    pub shared_with: Option<UserSnapshotRow>,
}

impl UserSnapshotRow {
    pub(crate) fn into_snapshot(self) -> Result<UserSnapshot, StoreError> {
        Ok(UserSnapshot {
            id: parse_id(&self.id)?,
            username: self.username,
            display_name: self.display_name,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(crate) fn parse_id(value: &str) -> Result<Uuid, StoreError> {
    value
        .parse()
        .map_err(|e| StoreError::Integrity(format!("stored id '{value}' is not a UUID: {e}")))
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| StoreError::Integrity(format!("stored timestamp '{value}': {e}")))
}
