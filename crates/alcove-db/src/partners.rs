use rusqlite::Connection;
use uuid::Uuid;

use alcove_types::models::{NewPartner, Partner, PartnerDirection, PartnerIds, PartnerUpdate};

use crate::Database;
use crate::error::StoreError;
use crate::models::{PartnerRow, UserSnapshotRow, parse_id, parse_timestamp};

const PARTNER_COLUMNS: &str = "p.shared_by_id, p.shared_with_id, p.in_timeline, p.created_at, p.updated_at,
 b.id, b.username, b.display_name, b.created_at,
 w.id, w.username, w.display_name, w.created_at";

// Read path: an edge is visible only while both endpoint accounts are live.
const LIVE_JOIN: &str = "
 INNER JOIN users b ON b.id = p.shared_by_id AND b.deleted_at IS NULL
 INNER JOIN users w ON w.id = p.shared_with_id AND w.deleted_at IS NULL";

// Post-write hydration: the row was just written, so no soft-delete filter.
// A missing snapshot here is an integrity fault, not an empty result.
const RAW_JOIN: &str = "
 LEFT JOIN users b ON b.id = p.shared_by_id
 LEFT JOIN users w ON w.id = p.shared_with_id";

impl Database {
    /// Every edge where the user is sharer or recipient, both endpoints live.
    /// Storage order; no duplicates by construction of the composite key.
    pub fn list_partners_for_user(&self, user_id: Uuid) -> Result<Vec<Partner>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PARTNER_COLUMNS} FROM partners p {LIVE_JOIN}
                 WHERE p.shared_by_id = ?1 OR p.shared_with_id = ?1"
            );
            query_partners(conn, &sql, [user_id.to_string()])
        })
    }

    /// Edges where the user occupies the given side only.
    pub fn list_partners_in_direction(
        &self,
        user_id: Uuid,
        direction: PartnerDirection,
    ) -> Result<Vec<Partner>, StoreError> {
        let column = match direction {
            PartnerDirection::SharedBy => "p.shared_by_id",
            PartnerDirection::SharedWith => "p.shared_with_id",
        };
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PARTNER_COLUMNS} FROM partners p {LIVE_JOIN} WHERE {column} = ?1"
            );
            query_partners(conn, &sql, [user_id.to_string()])
        })
    }

    /// The edge matching the exact ordered pair, or `None`. Absence is a
    /// normal outcome here, not an error.
    pub fn get_partner(&self, ids: PartnerIds) -> Result<Option<Partner>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PARTNER_COLUMNS} FROM partners p {LIVE_JOIN}
                 WHERE p.shared_by_id = ?1 AND p.shared_with_id = ?2"
            );
            let mut partners = query_partners(
                conn,
                &sql,
                [ids.shared_by_id.to_string(), ids.shared_with_id.to_string()],
            )?;
            Ok(partners.pop())
        })
    }

    pub fn create_partner(&self, new: NewPartner) -> Result<Partner, StoreError> {
        if new.shared_by_id == new.shared_with_id {
            return Err(StoreError::ConstraintViolation(format!(
                "user {} cannot share with themselves",
                new.shared_by_id
            )));
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO partners (shared_by_id, shared_with_id, in_timeline)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    new.shared_by_id.to_string(),
                    new.shared_with_id.to_string(),
                    new.in_timeline
                ],
            )
            .map_err(|e| StoreError::from_write(e, "create partner"))?;

            hydrate_after_write(
                conn,
                PartnerIds {
                    shared_by_id: new.shared_by_id,
                    shared_with_id: new.shared_with_id,
                },
            )
        })
    }

    /// Applies `patch` to the edge keyed by `ids`. Only fields present in the
    /// patch change; the identity pair itself is immutable.
    pub fn update_partner(
        &self,
        ids: PartnerIds,
        patch: PartnerUpdate,
    ) -> Result<Partner, StoreError> {
        self.with_conn_mut(|conn| {
            let by = ids.shared_by_id.to_string();
            let with = ids.shared_with_id.to_string();

            let changed = match patch.in_timeline {
                Some(in_timeline) => conn.execute(
                    "UPDATE partners
                     SET in_timeline = ?3, updated_at = datetime('now')
                     WHERE shared_by_id = ?1 AND shared_with_id = ?2",
                    rusqlite::params![by, with, in_timeline],
                ),
                None => conn.execute(
                    "UPDATE partners
                     SET updated_at = datetime('now')
                     WHERE shared_by_id = ?1 AND shared_with_id = ?2",
                    rusqlite::params![by, with],
                ),
            }
            .map_err(|e| StoreError::from_write(e, "update partner"))?;

            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "partner {} -> {}",
                    ids.shared_by_id, ids.shared_with_id
                )));
            }

            hydrate_after_write(conn, ids)
        })
    }

    /// Removes the edge if present. Removing an absent edge is a no-op.
    pub fn remove_partner(&self, ids: PartnerIds) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM partners WHERE shared_by_id = ?1 AND shared_with_id = ?2",
                rusqlite::params![ids.shared_by_id.to_string(), ids.shared_with_id.to_string()],
            )?;
            Ok(())
        })
    }
}

fn query_partners<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Partner>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_partner_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(into_partner).collect()
}

/// Re-reads one edge through the unconditional join and insists on both
/// snapshots. Reached only after a successful insert or update, so any
/// absence here is a defect signal.
fn hydrate_after_write(conn: &Connection, ids: PartnerIds) -> Result<Partner, StoreError> {
    let sql = format!(
        "SELECT {PARTNER_COLUMNS} FROM partners p {RAW_JOIN}
         WHERE p.shared_by_id = ?1 AND p.shared_with_id = ?2"
    );
    let mut partners = query_partners(
        conn,
        &sql,
        [ids.shared_by_id.to_string(), ids.shared_with_id.to_string()],
    )?;

    partners.pop().ok_or_else(|| {
        StoreError::Integrity(format!(
            "partner {} -> {} vanished after write",
            ids.shared_by_id, ids.shared_with_id
        ))
    })
}

fn map_partner_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PartnerRow> {
    Ok(PartnerRow {
        shared_by_id: row.get(0)?,
        shared_with_id: row.get(1)?,
        in_timeline: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        shared_by: snapshot_row(row, 5)?,
        shared_with: snapshot_row(row, 9)?,
    })
}

fn snapshot_row(
    row: &rusqlite::Row<'_>,
    base: usize,
) -> rusqlite::Result<Option<UserSnapshotRow>> {
    match row.get::<_, Option<String>>(base)? {
        Some(id) => Ok(Some(UserSnapshotRow {
            id,
            username: row.get(base + 1)?,
            display_name: row.get(base + 2)?,
            created_at: row.get(base + 3)?,
        })),
        None => Ok(None),
    }
}

fn into_partner(row: PartnerRow) -> Result<Partner, StoreError> {
    let shared_by = row.shared_by.ok_or_else(|| {
        StoreError::Integrity(format!(
            "partner {} -> {} has no sharer snapshot",
            row.shared_by_id, row.shared_with_id
        ))
    })?;
    let shared_with = row.shared_with.ok_or_else(|| {
        StoreError::Integrity(format!(
            "partner {} -> {} has no recipient snapshot",
            row.shared_by_id, row.shared_with_id
        ))
    })?;

    Ok(Partner {
        shared_by_id: parse_id(&row.shared_by_id)?,
        shared_with_id: parse_id(&row.shared_with_id)?,
        in_timeline: row.in_timeline,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
        shared_by: shared_by.into_snapshot()?,
        shared_with: shared_with.into_snapshot()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ada", Some("Ada")).unwrap();
        let b = db.create_user("brendan", None).unwrap();
        (db, a.id, b.id)
    }

    fn pair(by: Uuid, with: Uuid) -> PartnerIds {
        PartnerIds {
            shared_by_id: by,
            shared_with_id: with,
        }
    }

    fn share(db: &Database, by: Uuid, with: Uuid, in_timeline: bool) -> Partner {
        db.create_partner(NewPartner {
            shared_by_id: by,
            shared_with_id: with,
            in_timeline,
        })
        .unwrap()
    }

    #[test]
    fn create_then_get_round_trips() {
        let (db, a, b) = setup();
        let created = share(&db, a, b, true);

        let fetched = db.get_partner(pair(a, b)).unwrap().expect("edge should exist");
        assert_eq!(fetched, created);
        assert_eq!(fetched.shared_by.id, a);
        assert_eq!(fetched.shared_with.id, b);
        assert_eq!(fetched.shared_by.username, "ada");
        assert_eq!(fetched.shared_by.display_name.as_deref(), Some("Ada"));
        assert!(fetched.in_timeline);
    }

    #[test]
    fn edges_are_directed() {
        let (db, a, b) = setup();
        share(&db, a, b, false);

        assert!(db.get_partner(pair(b, a)).unwrap().is_none());
    }

    #[test]
    fn reverse_pair_is_a_distinct_edge() {
        let (db, a, b) = setup();
        share(&db, a, b, true);
        share(&db, b, a, false);

        assert_eq!(db.list_partners_for_user(a).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let (db, a, b) = setup();
        share(&db, a, b, true);

        let err = db
            .create_partner(NewPartner {
                shared_by_id: a,
                shared_with_id: b,
                in_timeline: false,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(db.list_partners_for_user(a).unwrap().len(), 1);
    }

    #[test]
    fn unknown_user_fails_referential_integrity() {
        let (db, a, _) = setup();

        let err = db
            .create_partner(NewPartner {
                shared_by_id: a,
                shared_with_id: Uuid::new_v4(),
                in_timeline: false,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[test]
    fn self_sharing_is_rejected() {
        let (db, a, _) = setup();

        let err = db
            .create_partner(NewPartner {
                shared_by_id: a,
                shared_with_id: a,
                in_timeline: true,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[test]
    fn update_patches_only_named_fields() {
        let (db, a, b) = setup();
        let created = share(&db, a, b, true);

        let updated = db
            .update_partner(pair(a, b), PartnerUpdate { in_timeline: Some(false) })
            .unwrap();
        assert!(!updated.in_timeline);
        assert_eq!(updated.shared_by_id, a);
        assert_eq!(updated.shared_with_id, b);
        assert_eq!(updated.created_at, created.created_at);

        // Empty patch leaves the edge fields as they were.
        let untouched = db.update_partner(pair(a, b), PartnerUpdate::default()).unwrap();
        assert!(!untouched.in_timeline);
    }

    #[test]
    fn update_missing_pair_is_not_found() {
        let (db, a, b) = setup();

        let err = db
            .update_partner(pair(a, b), PartnerUpdate { in_timeline: Some(true) })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn remove_is_idempotent() {
        let (db, a, b) = setup();
        share(&db, a, b, true);

        db.remove_partner(pair(a, b)).unwrap();
        assert!(db.get_partner(pair(a, b)).unwrap().is_none());

        db.remove_partner(pair(a, b)).unwrap();
        assert!(db.get_partner(pair(a, b)).unwrap().is_none());
    }

    #[test]
    fn list_unions_both_roles() {
        let (db, a, b) = setup();
        let c = db.create_user("cleo", None).unwrap().id;
        share(&db, a, b, true);
        share(&db, c, a, false);

        assert_eq!(db.list_partners_for_user(a).unwrap().len(), 2);
        assert_eq!(db.list_partners_for_user(b).unwrap().len(), 1);
        assert!(db.list_partners_for_user(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn direction_filter_selects_one_side() {
        let (db, a, b) = setup();
        share(&db, a, b, true);
        share(&db, b, a, false);

        let shared_by = db
            .list_partners_in_direction(a, PartnerDirection::SharedBy)
            .unwrap();
        assert_eq!(shared_by.len(), 1);
        assert_eq!(shared_by[0].shared_by_id, a);

        let shared_with = db
            .list_partners_in_direction(a, PartnerDirection::SharedWith)
            .unwrap();
        assert_eq!(shared_with.len(), 1);
        assert_eq!(shared_with[0].shared_with_id, a);
    }

    #[test]
    fn soft_deleted_counterparty_hides_the_edge() {
        let (db, a, b) = setup();
        share(&db, a, b, true);

        db.soft_delete_user(b).unwrap();
        assert!(db.list_partners_for_user(a).unwrap().is_empty());
        assert!(db.get_partner(pair(a, b)).unwrap().is_none());

        // The edge row itself is untouched; restoring the account brings it back.
        db.restore_user(b).unwrap();
        assert_eq!(db.list_partners_for_user(a).unwrap().len(), 1);
    }

    #[test]
    fn post_write_hydration_ignores_soft_deletion() {
        let (db, a, b) = setup();
        share(&db, a, b, false);
        db.soft_delete_user(b).unwrap();

        // The write path hydrates unconditionally even though the filtered
        // read path no longer returns the edge.
        let updated = db
            .update_partner(pair(a, b), PartnerUpdate { in_timeline: Some(true) })
            .unwrap();
        assert!(updated.in_timeline);
        assert_eq!(updated.shared_with.id, b);
        assert!(db.get_partner(pair(a, b)).unwrap().is_none());
    }
}
