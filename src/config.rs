//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use crate::matching::model::LifeStage;

/// Group-formation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingConfig {
    /// Smallest group the engine will commit.
    pub min_group_size: usize,
    /// Largest chunk taken from a sorted bucket.
    pub max_group_size: usize,
    /// Matchability threshold per life stage, in months (months-until-due for Expecting).
    pub max_gap_expecting: i32,
    pub max_gap_newborn: i32,
    pub max_gap_infant: i32,
    pub max_gap_toddler: i32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_group_size: 4,
            max_group_size: 6,
            max_gap_expecting: 3,
            max_gap_newborn: 3,
            max_gap_infant: 6,
            max_gap_toddler: 6,
        }
    }
}

impl MatchingConfig {
    /// Build from `CIRCLES_MAX_GAP_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_gap_expecting: env_or("CIRCLES_MAX_GAP_EXPECTING", defaults.max_gap_expecting),
            max_gap_newborn: env_or("CIRCLES_MAX_GAP_NEWBORN", defaults.max_gap_newborn),
            max_gap_infant: env_or("CIRCLES_MAX_GAP_INFANT", defaults.max_gap_infant),
            max_gap_toddler: env_or("CIRCLES_MAX_GAP_TODDLER", defaults.max_gap_toddler),
            ..defaults
        }
    }

    /// Maximum allowed spread between the youngest and oldest member.
    pub fn max_gap(&self, stage: LifeStage) -> i32 {
        match stage {
            LifeStage::Expecting => self.max_gap_expecting,
            LifeStage::Newborn => self.max_gap_newborn,
            LifeStage::Infant => self.max_gap_infant,
            LifeStage::Toddler => self.max_gap_toddler,
        }
    }
}

/// Daily sweep scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub schedule: String,
    /// Whether swept groups are created in test mode.
    pub test_mode: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: "0 0 9 * * *".to_string(),
            test_mode: false,
        }
    }
}

impl SweepConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("CIRCLES_SWEEP_ENABLED", defaults.enabled),
            schedule: std::env::var("CIRCLES_SWEEP_CRON").unwrap_or(defaults.schedule),
            test_mode: env_or("CIRCLES_SWEEP_TEST_MODE", defaults.test_mode),
        }
    }
}

/// HTTP server and storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/circles.db"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("CIRCLES_PORT", defaults.port),
            db_path: std::env::var("CIRCLES_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
        }
    }
}

/// Read and parse an env var, keeping `default` when unset or malformed.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, ?default, "Invalid config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
