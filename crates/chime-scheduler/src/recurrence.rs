//! Next-occurrence calculation for recurring reminders.
//!
//! Month and year steps are calendar-aware: a day that does not exist in the
//! target month is clamped to that month's last day (Jan 31 + 1 month lands on
//! Feb 28 or 29, Feb 29 + 1 year lands on Feb 28 in a common year). The time of
//! day is always preserved.

use chrono::{Days, Months, NaiveDateTime};

use crate::{Recurrence, latest_timestamp};

/// Compute the occurrence following `current`.
///
/// Returns `None` when recurrence must stop: the next occurrence lies strictly
/// after `end` or after [`latest_timestamp`], or the step cannot be
/// represented. Otherwise the result is strictly after `current`. An `interval` of zero is treated as one.
pub fn next_occurrence(
    current: NaiveDateTime,
    kind: Recurrence,
    interval: u32,
    end: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    let interval = interval.max(1);

    let next = match kind {
        Recurrence::Daily => current.checked_add_days(Days::new(u64::from(interval))),
        Recurrence::Weekly => current.checked_add_days(Days::new(7 * u64::from(interval))),
        Recurrence::Monthly => current.checked_add_months(Months::new(interval)),
        Recurrence::Yearly => interval
            .checked_mul(12)
            .and_then(|months| current.checked_add_months(Months::new(months))),
    }?;

    if next > latest_timestamp() {
        return None;
    }
    match end {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Timelike};
    use proptest::prelude::*;
    use test_case::test_case;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    // === Unit Tests ===

    #[test_case(Recurrence::Daily, 1, at(2025, 1, 1, 9, 0, 0), at(2025, 1, 2, 9, 0, 0) ; "daily")]
    #[test_case(Recurrence::Daily, 3, at(2025, 12, 30, 9, 0, 0), at(2026, 1, 2, 9, 0, 0) ; "daily across year")]
    #[test_case(Recurrence::Weekly, 1, at(2025, 1, 1, 9, 0, 0), at(2025, 1, 8, 9, 0, 0) ; "weekly")]
    #[test_case(Recurrence::Weekly, 2, at(2025, 2, 20, 9, 0, 0), at(2025, 3, 6, 9, 0, 0) ; "fortnightly across february")]
    #[test_case(Recurrence::Monthly, 1, at(2025, 1, 15, 9, 0, 0), at(2025, 2, 15, 9, 0, 0) ; "monthly")]
    #[test_case(Recurrence::Monthly, 1, at(2025, 1, 31, 9, 0, 0), at(2025, 2, 28, 9, 0, 0) ; "monthly clamps common year")]
    #[test_case(Recurrence::Monthly, 1, at(2024, 1, 31, 9, 0, 0), at(2024, 2, 29, 9, 0, 0) ; "monthly clamps leap year")]
    #[test_case(Recurrence::Monthly, 3, at(2025, 11, 30, 9, 0, 0), at(2026, 2, 28, 9, 0, 0) ; "monthly across year")]
    #[test_case(Recurrence::Monthly, 1, at(2025, 3, 31, 9, 0, 0), at(2025, 4, 30, 9, 0, 0) ; "monthly clamps thirty day month")]
    #[test_case(Recurrence::Yearly, 1, at(2024, 2, 29, 9, 0, 0), at(2025, 2, 28, 9, 0, 0) ; "yearly leap day")]
    #[test_case(Recurrence::Yearly, 4, at(2024, 2, 29, 9, 0, 0), at(2028, 2, 29, 9, 0, 0) ; "yearly leap to leap")]
    #[test_case(Recurrence::Yearly, 1, at(2025, 6, 1, 9, 0, 0), at(2026, 6, 1, 9, 0, 0) ; "yearly")]
    fn test_next_occurrence(
        kind: Recurrence,
        interval: u32,
        current: NaiveDateTime,
        expected: NaiveDateTime,
    ) {
        assert_eq!(next_occurrence(current, kind, interval, None), Some(expected));
    }

    #[test]
    fn test_time_of_day_preserved() {
        let current = at(2025, 1, 31, 23, 59, 58);
        let next = next_occurrence(current, Recurrence::Monthly, 1, None).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (23, 59, 58));
        assert_eq!((next.month(), next.day()), (2, 28));
    }

    #[test]
    fn test_end_bound_terminates() {
        let current = at(2025, 1, 1, 9, 0, 0);
        let end = at(2025, 1, 6, 9, 0, 0);
        assert_eq!(next_occurrence(current, Recurrence::Weekly, 2, Some(end)), None);
    }

    #[test]
    fn test_end_bound_is_inclusive() {
        let current = at(2025, 1, 1, 9, 0, 0);
        let end = at(2025, 1, 2, 9, 0, 0);
        assert_eq!(
            next_occurrence(current, Recurrence::Daily, 1, Some(end)),
            Some(end)
        );
    }

    #[test]
    fn test_end_bound_in_past_terminates() {
        let current = at(2025, 1, 1, 9, 0, 0);
        let end = at(2024, 12, 1, 9, 0, 0);
        assert_eq!(next_occurrence(current, Recurrence::Daily, 1, Some(end)), None);
    }

    #[test]
    fn test_zero_interval_treated_as_one() {
        let current = at(2025, 1, 1, 9, 0, 0);
        assert_eq!(
            next_occurrence(current, Recurrence::Daily, 0, None),
            Some(at(2025, 1, 2, 9, 0, 0))
        );
    }

    #[test]
    fn test_unrepresentable_step_terminates() {
        let current = NaiveDateTime::MAX - chrono::Duration::days(1);
        assert_eq!(next_occurrence(current, Recurrence::Yearly, u32::MAX, None), None);
        assert_eq!(next_occurrence(current, Recurrence::Weekly, 1, None), None);
    }

    #[test]
    fn test_step_past_latest_timestamp_terminates() {
        let current = at(2025, 6, 15, 8, 0, 0);
        assert_eq!(next_occurrence(current, Recurrence::Yearly, 8000, None), None);
        assert_eq!(next_occurrence(current, Recurrence::Weekly, 500_000, None), None);

        let last_year = at(9999, 3, 1, 8, 0, 0);
        assert_eq!(
            next_occurrence(last_year, Recurrence::Monthly, 9, None),
            Some(at(9999, 12, 1, 8, 0, 0))
        );
        assert_eq!(next_occurrence(last_year, Recurrence::Monthly, 10, None), None);
    }

    // === Property-Based Tests ===

    fn recurrence_kind() -> impl Strategy<Value = Recurrence> {
        prop_oneof![
            Just(Recurrence::Daily),
            Just(Recurrence::Weekly),
            Just(Recurrence::Monthly),
            Just(Recurrence::Yearly),
        ]
    }

    fn timestamp() -> impl Strategy<Value = NaiveDateTime> {
        // 1970..2100 in whole seconds
        (0i64..4_102_444_800).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0)
                .unwrap()
                .naive_utc()
        })
    }

    proptest! {
        // A next occurrence is always strictly later than the current one
        #[test]
        fn next_is_strictly_after_current(
            current in timestamp(),
            kind in recurrence_kind(),
            interval in 1u32..120,
        ) {
            if let Some(next) = next_occurrence(current, kind, interval, None) {
                prop_assert!(next > current, "{} is not after {}", next, current);
            }
        }

        // No occurrence is ever scheduled past the end bound
        #[test]
        fn next_never_exceeds_end(
            current in timestamp(),
            kind in recurrence_kind(),
            interval in 1u32..120,
            end_offset_days in -30i64..3000,
        ) {
            let end = current + chrono::Duration::days(end_offset_days);
            if let Some(next) = next_occurrence(current, kind, interval, Some(end)) {
                prop_assert!(next <= end);
            }
        }

        // The end bound only filters: it never changes the computed time
        #[test]
        fn end_bound_only_filters(
            current in timestamp(),
            kind in recurrence_kind(),
            interval in 1u32..120,
            end_offset_days in -30i64..3000,
        ) {
            let end = current + chrono::Duration::days(end_offset_days);
            let unbounded = next_occurrence(current, kind, interval, None);
            let bounded = next_occurrence(current, kind, interval, Some(end));
            match bounded {
                Some(next) => prop_assert_eq!(Some(next), unbounded),
                None => prop_assert!(unbounded.map(|n| n > end).unwrap_or(true)),
            }
        }

        // Day and week steps are exact durations
        #[test]
        fn fixed_steps_are_exact(current in timestamp(), interval in 1u32..1000) {
            let daily = next_occurrence(current, Recurrence::Daily, interval, None).unwrap();
            let weekly = next_occurrence(current, Recurrence::Weekly, interval, None).unwrap();
            prop_assert_eq!((daily - current).num_days(), i64::from(interval));
            prop_assert_eq!((weekly - current).num_days(), 7 * i64::from(interval));
        }

        // Month steps keep the day unless the target month is shorter
        #[test]
        fn monthly_day_is_clamped(current in timestamp(), interval in 1u32..48) {
            let next = next_occurrence(current, Recurrence::Monthly, interval, None).unwrap();
            prop_assert!(next.day() <= current.day());
            if next.day() < current.day() {
                // Clamped: we must be on the last day of the month
                let following = next.date().succ_opt().unwrap();
                prop_assert_eq!(following.day(), 1);
            }
            prop_assert_eq!(next.time(), current.time());
        }
    }

    // === Metamorphic Tests ===

    // Twelve monthly steps land on the same date as one yearly step
    #[test]
    fn metamorphic_twelve_months_is_one_year() {
        for current in [
            at(2023, 1, 31, 7, 0, 0),
            at(2024, 2, 29, 7, 0, 0),
            at(2025, 8, 15, 7, 0, 0),
        ] {
            assert_eq!(
                next_occurrence(current, Recurrence::Monthly, 12, None),
                next_occurrence(current, Recurrence::Yearly, 1, None),
            );
        }
    }

    // Two weekly steps equal one fortnightly step
    #[test]
    fn metamorphic_weekly_steps_compose() {
        let current = at(2025, 2, 20, 18, 30, 0);
        let one = next_occurrence(current, Recurrence::Weekly, 1, None).unwrap();
        let two = next_occurrence(one, Recurrence::Weekly, 1, None).unwrap();
        assert_eq!(Some(two), next_occurrence(current, Recurrence::Weekly, 2, None));
    }
}
