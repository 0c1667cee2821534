//! The `Database` trait the matching engine runs against.
//!
//! Storage details (document shape, absent vs. null fields) stop at this
//! boundary: every implementation hands back fully normalized records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::matching::model::{
    CommitOutcome, Group, GroupStatus, LifeStage, Location, UserRecord,
};

/// Backend-agnostic repository for users and groups.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert or update a user's onboarding fields.
    ///
    /// An existing `group_id`/`matched_at` is never overwritten.
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), DatabaseError>;

    /// Get a user by ID.
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// List every user, optionally only those at one exact location.
    async fn list_users(&self, location: Option<&Location>)
    -> Result<Vec<UserRecord>, DatabaseError>;

    /// Administrative unassignment. Returns whether a group was cleared.
    async fn clear_user_group(&self, id: &str) -> Result<bool, DatabaseError>;

    // ── Groups ──────────────────────────────────────────────────────

    /// Atomically create a group and assign all of its members.
    ///
    /// Re-checks each member inside the write: if any already has a group,
    /// nothing is written and `CommitOutcome::Conflict` lists them.
    async fn commit_group(&self, group: &Group) -> Result<CommitOutcome, DatabaseError>;

    /// Get a group by ID.
    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, DatabaseError>;

    /// All groups, newest first.
    async fn list_groups(&self) -> Result<Vec<Group>, DatabaseError>;

    /// Number of groups already formed for a location and life stage.
    async fn count_groups(
        &self,
        location: &Location,
        life_stage: LifeStage,
    ) -> Result<usize, DatabaseError>;

    /// Record which members the notifier reached.
    ///
    /// A non-empty set moves a pending group to active.
    async fn record_group_notification(
        &self,
        id: Uuid,
        emailed_member_ids: &[String],
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Administrative status change.
    async fn set_group_status(&self, id: Uuid, status: GroupStatus) -> Result<bool, DatabaseError>;
}
