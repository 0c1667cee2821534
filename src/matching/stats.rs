//! Coverage report over every eligible user.

use chrono::NaiveDate;

use super::life_stage::classify;
use super::model::{MatchingStats, UserRecord};

/// Count matched/unmatched eligible users overall and per location.
///
/// Users without a location count toward the totals only; users without a
/// resolvable life stage count toward their location but no stage.
pub fn aggregate_stats(users: &[UserRecord], today: NaiveDate) -> MatchingStats {
    let mut stats = MatchingStats::default();

    for user in users.iter().filter(|u| u.eligible) {
        let matched = !user.is_unmatched();
        stats.total_users += 1;
        if matched {
            stats.matched_users += 1;
        } else {
            stats.unmatched_users += 1;
        }

        let Some(location) = &user.location else {
            continue;
        };
        let entry = stats.by_location.entry(location.to_string()).or_default();
        entry.total += 1;
        if matched {
            entry.matched += 1;
        } else {
            entry.unmatched += 1;
        }
        if let Some(stage) = classify(&user.children, today) {
            entry.by_life_stage.increment(stage);
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::model::{Child, LifeStage};
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn counts_by_location_and_stage() {
        let mut matched = UserRecord::new("m")
            .with_location("Austin", "TX")
            .with_child(Child::existing(2025, 3))
            .eligible();
        matched.group_id = Some(Uuid::new_v4());

        let users = vec![
            matched,
            UserRecord::new("e")
                .with_location("Austin", "TX")
                .with_child(Child::expecting(2025, 9))
                .eligible(),
            UserRecord::new("old")
                .with_location("Austin", "TX")
                .with_child(Child::existing(2019, 1))
                .eligible(),
            UserRecord::new("miami")
                .with_location("Miami", "FL")
                .with_child(Child::existing(2024, 1))
                .eligible(),
            UserRecord::new("nowhere").with_child(Child::existing(2025, 1)).eligible(),
            UserRecord::new("onboarding").with_location("Austin", "TX"),
        ];

        let stats = aggregate_stats(&users, today());
        assert_eq!(stats.total_users, 5);
        assert_eq!(stats.matched_users, 1);
        assert_eq!(stats.unmatched_users, 4);

        let austin = &stats.by_location["Austin, TX"];
        assert_eq!(austin.total, 3);
        assert_eq!(austin.matched, 1);
        assert_eq!(austin.unmatched, 2);
        assert_eq!(austin.by_life_stage.get(LifeStage::Newborn), 1);
        assert_eq!(austin.by_life_stage.get(LifeStage::Expecting), 1);
        assert_eq!(austin.by_life_stage.get(LifeStage::Toddler), 0);

        let miami = &stats.by_location["Miami, FL"];
        assert_eq!(miami.unmatched, 1);
        assert_eq!(miami.by_life_stage.get(LifeStage::Infant), 1);
    }

    #[test]
    fn impossible_dates_count_without_a_stage() {
        let users = vec![
            UserRecord::new("far")
                .with_location("Austin", "TX")
                .with_child(Child::existing(i32::MIN, 1))
                .eligible(),
            UserRecord::new("due")
                .with_location("Austin", "TX")
                .with_child(Child::expecting(2_000_000_000, 1))
                .eligible(),
            UserRecord::new("ok")
                .with_location("Austin", "TX")
                .with_child(Child::existing(2025, 3))
                .eligible(),
        ];

        let stats = aggregate_stats(&users, today());
        assert_eq!(stats.total_users, 3);
        let austin = &stats.by_location["Austin, TX"];
        assert_eq!(austin.unmatched, 3);
        assert_eq!(austin.by_life_stage.get(LifeStage::Newborn), 1);
        assert_eq!(austin.by_life_stage.get(LifeStage::Expecting), 0);
    }

    #[test]
    fn empty_population() {
        let stats = aggregate_stats(&[], today());
        assert_eq!(stats, MatchingStats::default());
    }
}
