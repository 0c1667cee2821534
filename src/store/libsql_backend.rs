//! libSQL backend for the `Database` trait.
//!
//! Supports local file and in-memory databases. The single connection sits
//! behind an async mutex so a group-commit transaction never interleaves with
//! other statements on the same connection.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::matching::model::{
    Child, CommitOutcome, Group, GroupStatus, LifeStage, Location, UserRecord,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    conn: Mutex<Connection>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Lock the connection for the duration of one operation.
    async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Read a nullable TEXT column. NULL, a missing value, and "" all map to `None`.
fn opt_string(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok().filter(|s| !s.is_empty())
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{what} '{s}': {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str, what: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(s).map_err(|e| DatabaseError::Serialization(format!("{what}: {e}")))
}

/// Map a libsql Row to a UserRecord. Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("user row id: {e}")))?;

    let location = match (opt_string(row, 3), opt_string(row, 4)) {
        (Some(city), Some(state_code)) => Some(Location { city, state_code }),
        _ => None,
    };

    let children: Vec<Child> = match opt_string(row, 5) {
        Some(json) => from_json(&json, "user children")?,
        None => Vec::new(),
    };

    let group_id = opt_string(row, 7)
        .map(|s| parse_uuid(&s, "user group_id"))
        .transpose()?;

    Ok(UserRecord {
        id,
        name: opt_string(row, 1),
        email: opt_string(row, 2),
        location,
        children,
        eligible: row.get::<i64>(6).unwrap_or(0) != 0,
        group_id,
        matched_at: opt_string(row, 8).map(|s| parse_datetime(&s)),
    })
}

/// Map a libsql Row to a Group. Column order matches GROUP_COLUMNS.
fn row_to_group(row: &libsql::Row) -> Result<Group, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("group row column {idx}: {e}")))
    };

    let id = parse_uuid(&get(0)?, "group id")?;
    let life_stage: LifeStage = get(4)?
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let status: GroupStatus = get(6)?.parse().map_err(DatabaseError::Serialization)?;
    let emailed_member_ids = match opt_string(row, 9) {
        Some(json) => from_json(&json, "group emailed_member_ids")?,
        None => Vec::new(),
    };

    Ok(Group {
        id,
        name: get(1)?,
        location: Location {
            city: get(2)?,
            state_code: get(3)?,
        },
        life_stage,
        member_ids: from_json(&get(5)?, "group member_ids")?,
        status,
        test_mode: row.get::<i64>(7).unwrap_or(0) != 0,
        created_at: parse_datetime(&get(8)?),
        emailed_member_ids,
        introduction_email_sent_at: opt_string(row, 10).map(|s| parse_datetime(&s)),
    })
}

/// The write half of `commit_group`, run inside an open transaction.
async fn write_group(conn: &Connection, group: &Group) -> Result<CommitOutcome, DatabaseError> {
    let mut taken = Vec::new();
    for member_id in &group.member_ids {
        let mut rows = conn
            .query(
                "SELECT group_id FROM users WHERE id = ?1",
                params![member_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("commit_group recheck: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => {
                if opt_string(&row, 0).is_some() {
                    taken.push(member_id.clone());
                }
            }
            Ok(None) => {
                return Err(DatabaseError::NotFound {
                    entity: "user".into(),
                    id: member_id.clone(),
                });
            }
            Err(e) => return Err(DatabaseError::Query(format!("commit_group recheck: {e}"))),
        }
    }
    if !taken.is_empty() {
        return Ok(CommitOutcome::Conflict { member_ids: taken });
    }

    let created_at = group.created_at.to_rfc3339();
    conn.execute(
        &format!(
            "INSERT INTO match_groups ({GROUP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            group.id.to_string(),
            group.name.as_str(),
            group.location.city.as_str(),
            group.location.state_code.as_str(),
            group.life_stage.as_str(),
            to_json(&group.member_ids)?,
            group.status.as_str(),
            i64::from(group.test_mode),
            created_at.as_str(),
            to_json(&group.emailed_member_ids)?,
            opt_text(group.introduction_email_sent_at.map(|t| t.to_rfc3339())),
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("commit_group insert: {e}")))?;

    for member_id in &group.member_ids {
        let updated = conn
            .execute(
                "UPDATE users SET group_id = ?1, matched_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND group_id IS NULL",
                params![group.id.to_string(), created_at.as_str(), member_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("commit_group assign: {e}")))?;
        if updated != 1 {
            return Err(DatabaseError::Constraint(format!(
                "member {member_id} could not be assigned to group {}",
                group.id
            )));
        }
    }

    Ok(CommitOutcome::Committed)
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str =
    "id, name, email, city, state_code, children, matching_eligible, group_id, matched_at";

const GROUP_COLUMNS: &str = "id, name, city, state_code, life_stage, member_ids, status, test_mode, created_at, emailed_member_ids, introduction_email_sent_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&*self.conn().await).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        let now = Utc::now().to_rfc3339();
        let (city, state_code) = match &user.location {
            Some(loc) => (Some(loc.city.clone()), Some(loc.state_code.clone())),
            None => (None, None),
        };

        conn.execute(
            "INSERT INTO users (id, name, email, city, state_code, children, matching_eligible, group_id, matched_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT (id) DO UPDATE SET
                name = ?2, email = ?3, city = ?4, state_code = ?5, children = ?6,
                matching_eligible = ?7, updated_at = ?10",
            params![
                user.id.as_str(),
                opt_text(user.name.clone()),
                opt_text(user.email.clone()),
                opt_text(city),
                opt_text(state_code),
                to_json(&user.children)?,
                i64::from(user.eligible),
                opt_text(user.group_id.map(|g| g.to_string())),
                opt_text(user.matched_at.map(|t| t.to_rfc3339())),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_user: {e}")))?;

        debug!(user_id = %user.id, eligible = user.eligible, "User upserted");
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn list_users(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<UserRecord>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = match location {
            Some(loc) => conn
                .query(
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users WHERE city = ?1 AND state_code = ?2 ORDER BY rowid"
                    ),
                    params![loc.city.as_str(), loc.state_code.as_str()],
                )
                .await,
            None => {
                conn.query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid"), ())
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_users: {e}")))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users: {e}")))?
        {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    async fn clear_user_group(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let now = Utc::now().to_rfc3339();
        let count = conn
            .execute(
                "UPDATE users SET group_id = NULL, matched_at = NULL, updated_at = ?1
                 WHERE id = ?2 AND group_id IS NOT NULL",
                params![now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_user_group: {e}")))?;
        Ok(count > 0)
    }

    // ── Groups ──────────────────────────────────────────────────────

    async fn commit_group(&self, group: &Group) -> Result<CommitOutcome, DatabaseError> {
        let conn = self.conn().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit_group begin: {e}")))?;

        match write_group(&tx, group).await {
            Ok(CommitOutcome::Committed) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("commit_group commit: {e}")))?;
                debug!(group_id = %group.id, members = group.member_ids.len(), "Group committed to DB");
                Ok(CommitOutcome::Committed)
            }
            Ok(conflict) => {
                tx.rollback()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("commit_group rollback: {e}")))?;
                Ok(conflict)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(group_id = %group.id, error = %rb, "Rollback after failed commit also failed");
                }
                Err(e)
            }
        }
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {GROUP_COLUMNS} FROM match_groups WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_group: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_group(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_group: {e}"))),
        }
    }

    async fn list_groups(&self) -> Result<Vec<Group>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {GROUP_COLUMNS} FROM match_groups ORDER BY created_at DESC, rowid DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_groups: {e}")))?;

        let mut groups = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_groups: {e}")))?
        {
            groups.push(row_to_group(&row)?);
        }
        Ok(groups)
    }

    async fn count_groups(
        &self,
        location: &Location,
        life_stage: LifeStage,
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM match_groups WHERE city = ?1 AND state_code = ?2 AND life_stage = ?3",
                params![
                    location.city.as_str(),
                    location.state_code.as_str(),
                    life_stage.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_groups: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0).max(0) as usize),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_groups: {e}"))),
        }
    }

    async fn record_group_notification(
        &self,
        id: Uuid,
        emailed_member_ids: &[String],
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        let count = conn
            .execute(
                "UPDATE match_groups SET
                    emailed_member_ids = ?1,
                    introduction_email_sent_at = ?2,
                    status = CASE WHEN status = 'pending' AND ?3 > 0 THEN 'active' ELSE status END
                 WHERE id = ?4",
                params![
                    to_json(emailed_member_ids)?,
                    sent_at.to_rfc3339(),
                    emailed_member_ids.len() as i64,
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_group_notification: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "group".into(),
                id: id.to_string(),
            });
        }
        debug!(group_id = %id, notified = emailed_member_ids.len(), "Group notification recorded");
        Ok(())
    }

    async fn set_group_status(&self, id: Uuid, status: GroupStatus) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let count = conn
            .execute(
                "UPDATE match_groups SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_group_status: {e}")))?;
        Ok(count > 0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
