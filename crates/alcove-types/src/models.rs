use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public projection of a user account as of query time.
/// Never carries credentials or the soft-deletion marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One directed sharing grant, hydrated with both endpoint users.
/// `shared_by` owns the shared content; `shared_with` receives access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub shared_by_id: Uuid,
    pub shared_with_id: Uuid,
    pub in_timeline: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shared_by: UserSnapshot,
    pub shared_with: UserSnapshot,
}

/// Identity of an edge: the ordered (sharer, recipient) pair.
/// The reverse pair keys a separate, independent edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerIds {
    pub shared_by_id: Uuid,
    pub shared_with_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPartner {
    pub shared_by_id: Uuid,
    pub shared_with_id: Uuid,
    pub in_timeline: bool,
}

/// Field patch for an existing edge. Absent fields are left untouched;
/// the identity pair cannot be changed through an update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartnerUpdate {
    pub in_timeline: Option<bool>,
}

/// Which side of an edge a user occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartnerDirection {
    SharedBy,
    SharedWith,
}
