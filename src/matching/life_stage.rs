//! Life-stage classification from a user's first child.
//!
//! Everything here is a pure function of the child data and an explicit
//! `today`, so a user's bucket can change between runs without any write to
//! their record.

use chrono::{Datelike, NaiveDate};

use super::model::{Child, ChildType, LifeStage};

/// Whole calendar months between the child's birth month and `today`.
///
/// Day of month is ignored. Can be negative for a birth date in the future.
/// `None` for a month outside 1..=12 or a year too far out to count in months.
pub fn age_in_months(child: &Child, today: NaiveDate) -> Option<i32> {
    let child_index = due_month_index(child)?;
    let today_index = today.year().checked_mul(12)?.checked_add(today.month() as i32)?;
    today_index.checked_sub(child_index)
}

/// Absolute month index of a due (or birth) month, for ordering due dates.
pub fn due_month_index(child: &Child) -> Option<i32> {
    if !(1..=12).contains(&child.birth_month) {
        return None;
    }
    child
        .birth_year
        .checked_mul(12)?
        .checked_add(child.birth_month as i32)
}

/// Classify a household by its first-listed child.
///
/// Returns `None` when there are no children, the first child's date is
/// unusable, or the child is older than 36 months.
pub fn classify(children: &[Child], today: NaiveDate) -> Option<LifeStage> {
    let child = children.first()?;
    if child.child_type == ChildType::Expecting {
        due_month_index(child)?;
        return Some(LifeStage::Expecting);
    }
    match age_in_months(child, today)? {
        m if m <= 6 => Some(LifeStage::Newborn),
        m if m <= 18 => Some(LifeStage::Infant),
        m if m <= 36 => Some(LifeStage::Toddler),
        _ => None,
    }
}

/// Sort/threshold key within a bucket: due-month index for Expecting, age in
/// months otherwise. Ascending order puts the soonest due / youngest first.
pub fn proximity_key(children: &[Child], stage: LifeStage, today: NaiveDate) -> Option<i32> {
    let child = children.first()?;
    match stage {
        LifeStage::Expecting => due_month_index(child),
        _ => age_in_months(child, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn expecting_ignores_dates() {
        let children = [Child::expecting(2020, 1)];
        assert_eq!(
            classify(&children, date(2025, 3, 1)),
            Some(LifeStage::Expecting)
        );
    }

    #[test]
    fn age_in_months_ignores_day() {
        let child = Child::existing(2024, 11);
        assert_eq!(age_in_months(&child, date(2025, 3, 1)), Some(4));
        assert_eq!(age_in_months(&child, date(2025, 3, 31)), Some(4));
    }

    #[test]
    fn extreme_years_do_not_overflow() {
        let today = date(2025, 3, 1);
        assert_eq!(due_month_index(&Child::expecting(2_000_000_000, 1)), None);
        assert_eq!(age_in_months(&Child::existing(i32::MIN, 1), today), None);
        assert_eq!(classify(&[Child::expecting(2_000_000_000, 1)], today), None);
        assert_eq!(classify(&[Child::existing(i32::MIN, 1)], today), None);
        assert_eq!(
            proximity_key(&[Child::existing(i32::MAX, 12)], LifeStage::Infant, today),
            None
        );
    }

    #[test]
    fn out_of_range_month_has_no_stage() {
        let today = date(2025, 3, 1);
        assert_eq!(classify(&[Child::existing(2025, 0)], today), None);
        assert_eq!(classify(&[Child::existing(2024, 13)], today), None);
        assert_eq!(classify(&[Child::expecting(2025, 13)], today), None);
    }

    #[test]
    fn bucket_boundaries() {
        let today = date(2025, 12, 15);
        let at = |months_ago: i32| {
            let idx = 2025 * 12 + 12 - months_ago;
            // Month index back to (year, month), months are 1..=12.
            let (year, month) = ((idx - 1) / 12, ((idx - 1) % 12 + 1) as u32);
            classify(&[Child::existing(year, month)], today)
        };
        assert_eq!(at(0), Some(LifeStage::Newborn));
        assert_eq!(at(6), Some(LifeStage::Newborn));
        assert_eq!(at(7), Some(LifeStage::Infant));
        assert_eq!(at(18), Some(LifeStage::Infant));
        assert_eq!(at(19), Some(LifeStage::Toddler));
        assert_eq!(at(36), Some(LifeStage::Toddler));
        assert_eq!(at(37), None);
    }

    #[test]
    fn only_first_child_counts() {
        let today = date(2025, 6, 1);
        let children = [Child::existing(2021, 1), Child::expecting(2025, 9)];
        assert_eq!(classify(&children, today), None);

        let children = [Child::expecting(2025, 9), Child::existing(2021, 1)];
        assert_eq!(classify(&children, today), Some(LifeStage::Expecting));
    }

    #[test]
    fn no_children_no_stage() {
        assert_eq!(classify(&[], date(2025, 1, 1)), None);
        assert_eq!(proximity_key(&[], LifeStage::Infant, date(2025, 1, 1)), None);
    }

    #[test]
    fn stage_moves_with_today() {
        let children = [Child::existing(2025, 1)];
        assert_eq!(classify(&children, date(2025, 7, 1)), Some(LifeStage::Newborn));
        assert_eq!(classify(&children, date(2025, 8, 1)), Some(LifeStage::Infant));
    }

    #[test]
    fn proximity_orders_due_dates_across_years() {
        let today = date(2025, 1, 1);
        let dec = proximity_key(&[Child::expecting(2025, 12)], LifeStage::Expecting, today);
        let jan = proximity_key(&[Child::expecting(2026, 1)], LifeStage::Expecting, today);
        assert_eq!(jan.unwrap() - dec.unwrap(), 1);
    }
}
