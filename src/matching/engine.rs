//! Matching engine: one run of the eligibility → bucket → sort → chunk →
//! commit pipeline, plus the read-only stats view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::bucket::{bucket_candidates, sort_bucket};
use super::chunker::chunk_bucket;
use super::committer::GroupCommitter;
use super::eligibility::{filter_candidates, location_scope};
use super::model::{Group, Location, MatchingStats, MemberContact, RunSummary};
use super::stats::aggregate_stats;
use crate::config::MatchingConfig;
use crate::error::MatchingError;
use crate::notify::Notifier;
use crate::store::Database;

pub struct MatchingEngine {
    store: Arc<dyn Database>,
    committer: GroupCommitter,
    config: MatchingConfig,
    notifier: Option<Arc<dyn Notifier>>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn Database>, config: MatchingConfig) -> Self {
        Self {
            committer: GroupCommitter::new(Arc::clone(&store)),
            store,
            config,
            notifier: None,
        }
    }

    /// Send introductions for every group this engine commits.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    /// Form as many groups as possible from the current unmatched population.
    ///
    /// `city` and `state_code` must be given together or not at all. Safe to
    /// run repeatedly: a second run over the same data creates nothing.
    pub async fn run_matching(
        &self,
        city: Option<&str>,
        state_code: Option<&str>,
        test_mode: bool,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, MatchingError> {
        let scope = location_scope(city, state_code)?;
        let today = now.date_naive();

        let users = self.store.list_users(scope.as_ref()).await?;
        let candidates = filter_candidates(users, scope.as_ref());
        let candidate_count = candidates.len();
        let scope_label = scope
            .as_ref()
            .map_or_else(|| "all".to_string(), |l| l.to_string());
        info!(
            scope = %scope_label,
            candidates = candidate_count,
            test_mode,
            "Matching run started"
        );

        let bucketed = bucket_candidates(candidates, today);
        if !bucketed.dropped.is_empty() {
            debug!(
                dropped = bucketed.dropped.len(),
                "Candidates without a location or life stage"
            );
        }

        let mut users_matched = 0;
        let mut groups = Vec::new();

        for (key, mut bucket) in bucketed.buckets {
            sort_bucket(&mut bucket);
            debug!(bucket = %key, size = bucket.len(), "Bucket sorted");
            let outcome = chunk_bucket(bucket, key.life_stage, &self.config);
            for (chunk, reason) in &outcome.rejected {
                debug!(bucket = %key, size = chunk.len(), %reason, "Chunk rejected");
            }
            if outcome.accepted.is_empty() {
                continue;
            }

            let mut sequence = self.store.count_groups(&key.location, key.life_stage).await?;
            for chunk in outcome.accepted {
                sequence += 1;
                let group = match self
                    .committer
                    .commit(&key, sequence, &chunk, test_mode, now)
                    .await
                {
                    Ok(Some(group)) => group,
                    Ok(None) => {
                        sequence -= 1;
                        continue;
                    }
                    Err(e) => {
                        error!(bucket = %key, error = %e, "Group commit failed, members stay unmatched");
                        sequence -= 1;
                        continue;
                    }
                };

                users_matched += group.member_ids.len();
                let contacts: Vec<MemberContact> = chunk.iter().map(|c| c.user.contact()).collect();
                self.introduce(&group, &contacts, test_mode).await;
                groups.push(group.summary());
            }
        }

        let summary = RunSummary {
            groups_created: groups.len(),
            users_matched,
            users_unmatched: candidate_count - users_matched,
            summary: describe_run(scope.as_ref(), candidate_count, groups.len(), users_matched),
            groups,
        };
        info!(
            groups_created = summary.groups_created,
            users_matched = summary.users_matched,
            users_unmatched = summary.users_unmatched,
            "Matching run finished"
        );
        Ok(summary)
    }

    /// Coverage report over all eligible users as of `now`.
    pub async fn get_matching_stats(&self, now: DateTime<Utc>) -> Result<MatchingStats, MatchingError> {
        let users = self.store.list_users(None).await?;
        Ok(aggregate_stats(&users, now.date_naive()))
    }

    /// Hand a committed group to the notifier. Failures only leave it pending.
    async fn introduce(&self, group: &Group, contacts: &[MemberContact], test_mode: bool) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        match notifier.notify_group(group, contacts, test_mode).await {
            Ok(reached) if reached.is_empty() => {
                info!(group_id = %group.id, "No members reached, group stays pending");
            }
            Ok(reached) => {
                if let Err(e) = self
                    .store
                    .record_group_notification(group.id, &reached, Utc::now())
                    .await
                {
                    warn!(group_id = %group.id, error = %e, "Failed to record notification");
                }
            }
            Err(e) => {
                warn!(group_id = %group.id, error = %e, "Group introduction failed");
            }
        }
    }
}

fn describe_run(
    scope: Option<&Location>,
    candidates: usize,
    groups_created: usize,
    users_matched: usize,
) -> String {
    let where_ = scope.map(|l| format!(" in {l}")).unwrap_or_default();
    if candidates == 0 {
        return format!("No eligible unmatched users{where_}.");
    }
    if groups_created == 0 {
        return format!(
            "No groups formed{where_}: none of the {candidates} eligible users could be \
             placed in a group that meets the size and age-gap rules."
        );
    }
    format!(
        "Created {groups_created} group(s){where_}, matching {users_matched} of {candidates} \
         eligible users; {} remain unmatched.",
        candidates - users_matched
    )
}
