//! Scheduled sweep: re-runs matching for every location that has enough
//! unmatched users in a single life stage to possibly form a group.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use super::bucket::bucket_candidates;
use super::eligibility::filter_candidates;
use super::engine::MatchingEngine;
use super::model::{Location, RunSummary, UserRecord};
use crate::config::SweepConfig;
use crate::error::{ConfigError, MatchingError};

/// Locations worth a scoped run: some (location, stage) bucket holds at
/// least `min_group_size` eligible unmatched users.
pub fn sweep_targets(users: Vec<UserRecord>, today: NaiveDate, min_group_size: usize) -> Vec<Location> {
    let bucketed = bucket_candidates(filter_candidates(users, None), today);
    bucketed
        .buckets
        .into_iter()
        .filter(|(_, members)| members.len() >= min_group_size)
        .map(|(key, _)| key.location)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One scoped run per target location. A failing location is logged and
/// skipped so the rest of the sweep still happens.
pub async fn run_sweep(
    engine: &MatchingEngine,
    test_mode: bool,
    now: DateTime<Utc>,
) -> Result<Vec<(Location, RunSummary)>, MatchingError> {
    let users = engine.store().list_users(None).await?;
    let targets = sweep_targets(users, now.date_naive(), engine.config().min_group_size);
    info!(targets = targets.len(), test_mode, "Sweep started");

    let mut results = Vec::with_capacity(targets.len());
    for location in targets {
        match engine
            .run_matching(Some(&location.city), Some(&location.state_code), test_mode, now)
            .await
        {
            Ok(summary) => results.push((location, summary)),
            Err(e) => warn!(location = %location, error = %e, "Sweep run failed"),
        }
    }

    let groups: usize = results.iter().map(|(_, s)| s.groups_created).sum();
    info!(locations = results.len(), groups_created = groups, "Sweep finished");
    Ok(results)
}

/// Parse a six-field cron expression.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: "CIRCLES_SWEEP_CRON".to_string(),
        message: format!("invalid cron: {e}"),
    })
}

/// Spawn the background sweep loop. The schedule is validated up front.
pub fn spawn_daily_sweep(
    engine: Arc<MatchingEngine>,
    config: SweepConfig,
) -> Result<tokio::task::JoinHandle<()>, ConfigError> {
    let schedule = parse_schedule(&config.schedule)?;
    info!(schedule = %config.schedule, test_mode = config.test_mode, "Sweep scheduled");

    Ok(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Sweep schedule has no upcoming fire time, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            // A panicking sweep must not take the schedule down with it.
            let engine = Arc::clone(&engine);
            let test_mode = config.test_mode;
            let sweep =
                tokio::spawn(async move { run_sweep(&engine, test_mode, Utc::now()).await });
            match sweep.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "Sweep failed"),
                Err(e) => error!(error = %e, "Sweep task aborted"),
            }
        }
    }))
}
