//! CRUD operations for durable [`Group`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Group;
use crate::users::{parse_ts, parse_uuid};

impl Database {
    /// Insert a new group. Membership is fixed at creation time.
    pub fn create_group(&self, group: &Group) -> Result<()> {
        self.conn().execute(
            "INSERT INTO groups (id, name, members, created_by, created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                group.id.to_string(),
                group.name,
                serde_json::to_string(&group.members)?,
                group.created_by,
                group.created_at.to_rfc3339(),
                group.last_activity.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single group by UUID.
    pub fn find_group_by_id(&self, id: Uuid) -> Result<Group> {
        self.conn()
            .query_row(
                "SELECT id, name, members, created_by, created_at, last_activity
                 FROM groups WHERE id = ?1",
                params![id.to_string()],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// List all groups that include `email` in their member list, most
    /// recently active first.
    ///
    /// Membership lives in a JSON column, so the candidate rows are
    /// pre-filtered with LIKE and then checked exactly after decoding.
    pub fn find_groups_by_member_email(&self, email: &str) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, members, created_by, created_at, last_activity
             FROM groups
             WHERE members LIKE '%' || ?1 || '%'
             ORDER BY last_activity DESC",
        )?;

        let rows = stmt.query_map(params![email], row_to_group)?;

        let mut groups = Vec::new();
        for row in rows {
            let group = row?;
            if group.is_member(email) {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Bump a group's `last_activity` timestamp.
    pub fn touch_group_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE groups SET last_activity = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// Map a `rusqlite::Row` to a [`Group`].
fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let members_json: String = row.get(2)?;
    let created_by: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let activity_str: String = row.get(5)?;

    let members: Vec<String> = serde_json::from_str(&members_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Group {
        id: parse_uuid(&id_str, 0)?,
        name,
        members,
        created_by,
        created_at: parse_ts(&created_str, 4)?,
        last_activity: parse_ts(&activity_str, 5)?,
    })
}
