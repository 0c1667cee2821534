//! Turns an accepted chunk into a persisted group, exactly once per member.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::bucket::{BucketKey, Candidate};
use super::model::{CommitOutcome, Group};
use crate::error::DatabaseError;
use crate::store::Database;

pub struct GroupCommitter {
    store: Arc<dyn Database>,
}

impl GroupCommitter {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }

    /// Persist one chunk as a pending group.
    ///
    /// Returns `Ok(None)` when a member picked up a group after the run's
    /// snapshot; the whole chunk is then left unmatched. Any error means
    /// nothing was written for this chunk.
    pub async fn commit(
        &self,
        key: &BucketKey,
        sequence: usize,
        members: &[Candidate],
        test_mode: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Group>, DatabaseError> {
        let member_ids = members.iter().map(|c| c.user.id.clone()).collect();
        let group = Group::new(
            key.location.clone(),
            key.life_stage,
            sequence,
            member_ids,
            test_mode,
            now,
        );

        match self.store.commit_group(&group).await? {
            CommitOutcome::Committed => {
                info!(
                    group_id = %group.id,
                    name = %group.name,
                    members = group.member_ids.len(),
                    test_mode,
                    "Group committed"
                );
                Ok(Some(group))
            }
            CommitOutcome::Conflict { member_ids } => {
                warn!(
                    bucket = %key,
                    already_matched = ?member_ids,
                    "Chunk dropped, members were matched by another run"
                );
                Ok(None)
            }
        }
    }
}
