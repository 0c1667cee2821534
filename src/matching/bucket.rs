//! Partition candidates by (city, state, life stage) and order each bucket
//! by age proximity.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::life_stage::{classify, proximity_key};
use super::model::{LifeStage, Location, UserRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub location: Location,
    pub life_stage: LifeStage,
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.location, self.life_stage)
    }
}

/// A user placed in a bucket, with the key used for ordering and thresholds.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user: UserRecord,
    /// Months of age, or due-month index for Expecting.
    pub proximity: i32,
}

/// Output of the bucketer.
#[derive(Debug, Default)]
pub struct Bucketed {
    pub buckets: BTreeMap<BucketKey, Vec<Candidate>>,
    /// Users with no location or no resolvable life stage.
    pub dropped: Vec<UserRecord>,
}

/// Group candidates by exact location, then by life stage.
///
/// Insertion order within a bucket follows the input order.
pub fn bucket_candidates(candidates: Vec<UserRecord>, today: NaiveDate) -> Bucketed {
    let mut out = Bucketed::default();
    for user in candidates {
        let Some(location) = user.location.clone() else {
            out.dropped.push(user);
            continue;
        };
        let Some(life_stage) = classify(&user.children, today) else {
            out.dropped.push(user);
            continue;
        };
        let Some(proximity) = proximity_key(&user.children, life_stage, today) else {
            out.dropped.push(user);
            continue;
        };
        out.buckets
            .entry(BucketKey {
                location,
                life_stage,
            })
            .or_default()
            .push(Candidate { user, proximity });
    }
    out
}

/// Ascending by proximity key: soonest due date or youngest first.
///
/// Stable, so equal keys keep their original relative order.
pub fn sort_bucket(bucket: &mut [Candidate]) {
    bucket.sort_by_key(|c| c.proximity);
}
