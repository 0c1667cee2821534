//! Group formation: eligibility, life-stage bucketing, greedy chunking with
//! an age-gap threshold, and the atomic commit of each new group.

pub mod bucket;
pub mod chunker;
pub mod committer;
pub mod eligibility;
pub mod engine;
pub mod life_stage;
pub mod model;
pub mod routes;
pub mod stats;
pub mod sweep;

pub use engine::MatchingEngine;
pub use routes::matching_routes;
