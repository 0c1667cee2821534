//! Greedy group formation over one sorted bucket.
//!
//! Chunks of up to `max_group_size` are cut from the front of the sorted
//! bucket in a single pass. A chunk is committed only if it reaches
//! `min_group_size` and its proximity spread stays within the stage's
//! threshold. Rejected members are never regrouped within the same run.

use super::bucket::Candidate;
use super::model::LifeStage;
use crate::config::MatchingConfig;

/// Why a chunk did not become a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Fewer members than the minimum group size.
    TooSmall { size: usize, min: usize },
    /// Oldest-to-youngest spread exceeds the matchability threshold.
    GapExceeded { gap: i32, max_gap: i32 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { size, min } => write!(f, "{size} members, need at least {min}"),
            Self::GapExceeded { gap, max_gap } => {
                write!(f, "{gap} month spread exceeds {max_gap} month threshold")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ChunkOutcome {
    /// Chunks that passed both checks, in bucket order.
    pub accepted: Vec<Vec<Candidate>>,
    pub rejected: Vec<(Vec<Candidate>, RejectReason)>,
}

impl ChunkOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejected.iter().map(|(members, _)| members.len()).sum()
    }
}

/// Spread between the smallest and largest proximity key in a chunk.
pub fn chunk_gap(chunk: &[Candidate]) -> i32 {
    let min = chunk.iter().map(|c| c.proximity).min();
    let max = chunk.iter().map(|c| c.proximity).max();
    match (min, max) {
        (Some(min), Some(max)) => max - min,
        _ => 0,
    }
}

/// Check one chunk against the size floor and the stage's threshold.
pub fn validate_chunk(
    chunk: &[Candidate],
    stage: LifeStage,
    config: &MatchingConfig,
) -> Result<(), RejectReason> {
    if chunk.len() < config.min_group_size {
        return Err(RejectReason::TooSmall {
            size: chunk.len(),
            min: config.min_group_size,
        });
    }
    let gap = chunk_gap(chunk);
    let max_gap = config.max_gap(stage);
    if gap > max_gap {
        return Err(RejectReason::GapExceeded { gap, max_gap });
    }
    Ok(())
}

/// Split an already sorted bucket into accepted and rejected chunks.
pub fn chunk_bucket(
    sorted: Vec<Candidate>,
    stage: LifeStage,
    config: &MatchingConfig,
) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();
    let size = config.max_group_size.max(1);
    let mut remaining = sorted.into_iter().peekable();

    while remaining.peek().is_some() {
        let chunk: Vec<Candidate> = remaining.by_ref().take(size).collect();
        match validate_chunk(&chunk, stage, config) {
            Ok(()) => outcome.accepted.push(chunk),
            Err(reason) => outcome.rejected.push((chunk, reason)),
        }
    }

    outcome
}
