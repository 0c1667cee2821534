//! Matching data model: user records, groups, and run/stats reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a child record describes a pregnancy or a born child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildType {
    Expecting,
    Existing,
}

/// One child entry collected during onboarding.
///
/// For `Expecting` children the month/year is the due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    #[serde(rename = "type")]
    pub child_type: ChildType,
    pub birth_month: u32,
    pub birth_year: i32,
}

impl Child {
    pub fn existing(birth_year: i32, birth_month: u32) -> Self {
        Self {
            child_type: ChildType::Existing,
            birth_month,
            birth_year,
        }
    }

    pub fn expecting(due_year: i32, due_month: u32) -> Self {
        Self {
            child_type: ChildType::Expecting,
            birth_month: due_month,
            birth_year: due_year,
        }
    }

    /// Reject dates no onboarding answer could produce.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=12).contains(&self.birth_month) {
            return Err(format!("birth_month must be 1-12, got {}", self.birth_month));
        }
        if !(Self::EARLIEST_YEAR..=Self::LATEST_YEAR).contains(&self.birth_year) {
            return Err(format!(
                "birth_year must be between {} and {}, got {}",
                Self::EARLIEST_YEAR,
                Self::LATEST_YEAR,
                self.birth_year
            ));
        }
        Ok(())
    }

    pub const EARLIEST_YEAR: i32 = 1900;
    pub const LATEST_YEAR: i32 = 2200;
}

/// A city plus two-letter state code. Compared exactly, without normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state_code: String,
}

impl Location {
    pub fn new(city: impl Into<String>, state_code: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state_code: state_code.into(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.city, self.state_code)
    }
}

/// A person who went through onboarding.
///
/// `group_id` is set exactly once, by the group committer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub children: Vec<Child>,
    #[serde(rename = "matching_eligible", alias = "eligible", default)]
    pub eligible: bool,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub matched_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A fresh record as created at the start of onboarding.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            location: None,
            children: Vec::new(),
            eligible: false,
            group_id: None,
            matched_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_location(mut self, city: &str, state_code: &str) -> Self {
        self.location = Some(Location::new(city, state_code));
        self
    }

    pub fn with_child(mut self, child: Child) -> Self {
        self.children.push(child);
        self
    }

    /// Mark onboarding as complete.
    pub fn eligible(mut self) -> Self {
        self.eligible = true;
        self
    }

    pub fn is_unmatched(&self) -> bool {
        self.group_id.is_none()
    }

    pub fn contact(&self) -> MemberContact {
        MemberContact {
            user_id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Life-stage bucket derived from the first child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifeStage {
    Expecting,
    Newborn,
    Infant,
    Toddler,
}

impl LifeStage {
    pub const ALL: [LifeStage; 4] = [
        LifeStage::Expecting,
        LifeStage::Newborn,
        LifeStage::Infant,
        LifeStage::Toddler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expecting => "Expecting",
            Self::Newborn => "Newborn",
            Self::Infant => "Infant",
            Self::Toddler => "Toddler",
        }
    }
}

impl std::fmt::Display for LifeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifeStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Expecting" => Ok(Self::Expecting),
            "Newborn" => Ok(Self::Newborn),
            "Infant" => Ok(Self::Infant),
            "Toddler" => Ok(Self::Toddler),
            other => Err(format!("unknown life stage: {other}")),
        }
    }
}

/// Lifecycle of a group.
///
/// The engine produces `Pending` and `Active`; `Inactive` is administrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    Active,
    Inactive,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown group status: {other}")),
        }
    }
}

/// A committed cohort. `member_ids` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub location: Location,
    pub life_stage: LifeStage,
    pub member_ids: Vec<String>,
    pub status: GroupStatus,
    pub test_mode: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub emailed_member_ids: Vec<String>,
    #[serde(default)]
    pub introduction_email_sent_at: Option<DateTime<Utc>>,
}

impl Group {
    /// A new pending group, numbered within its location and life stage.
    pub fn new(
        location: Location,
        life_stage: LifeStage,
        sequence: usize,
        member_ids: Vec<String>,
        test_mode: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: group_name(&location, life_stage, sequence),
            location,
            life_stage,
            member_ids,
            status: GroupStatus::Pending,
            test_mode,
            created_at,
            emailed_member_ids: Vec::new(),
            introduction_email_sent_at: None,
        }
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id,
            name: self.name.clone(),
            location: self.location.clone(),
            life_stage: self.life_stage,
            member_count: self.member_ids.len(),
            test_mode: self.test_mode,
            created_at: self.created_at,
        }
    }
}

/// "{city} {life-stage} Dads - Group {n}".
pub fn group_name(location: &Location, life_stage: LifeStage, sequence: usize) -> String {
    format!("{} {} Dads - Group {}", location.city, life_stage, sequence)
}

/// Contact details handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContact {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Result of an atomic group commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Group row and every member assignment were written.
    Committed,
    /// Some members already had a group; nothing was written.
    Conflict { member_ids: Vec<String> },
}

/// One group as reported back from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub location: Location,
    pub life_stage: LifeStage,
    pub member_count: usize,
    pub test_mode: bool,
    pub created_at: DateTime<Utc>,
}

/// Response of `run_matching`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub groups_created: usize,
    pub users_matched: usize,
    pub users_unmatched: usize,
    pub summary: String,
    pub groups: Vec<GroupSummary>,
}

/// Per-stage user counts, keyed the way the admin dashboard reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeStageCounts {
    #[serde(rename = "Expecting")]
    pub expecting: usize,
    #[serde(rename = "Newborn")]
    pub newborn: usize,
    #[serde(rename = "Infant")]
    pub infant: usize,
    #[serde(rename = "Toddler")]
    pub toddler: usize,
}

impl LifeStageCounts {
    pub fn get(&self, stage: LifeStage) -> usize {
        match stage {
            LifeStage::Expecting => self.expecting,
            LifeStage::Newborn => self.newborn,
            LifeStage::Infant => self.infant,
            LifeStage::Toddler => self.toddler,
        }
    }

    pub fn increment(&mut self, stage: LifeStage) {
        match stage {
            LifeStage::Expecting => self.expecting += 1,
            LifeStage::Newborn => self.newborn += 1,
            LifeStage::Infant => self.infant += 1,
            LifeStage::Toddler => self.toddler += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub by_life_stage: LifeStageCounts,
}

/// Read-only snapshot of matching coverage. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingStats {
    pub total_users: usize,
    pub matched_users: usize,
    pub unmatched_users: usize,
    /// Keyed by "<city>, <state>".
    pub by_location: BTreeMap<String, LocationStats>,
}
