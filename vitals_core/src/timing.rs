//! Adaptive reminder timing.
//!
//! The preferred reminder hour follows the user's own habit: the mean local
//! hour of their recent measurements, clamped into the domain's band
//! (evenings for blood pressure, fasting mornings for weight).

use crate::config::ReminderRules;
use chrono::{DateTime, FixedOffset, Timelike, Utc};

/// Below this many readings the domain default hour is used
pub const MIN_READINGS_FOR_ADAPTATION: usize = 3;

/// Preferred local hour derived from recent measurement timestamps
///
/// Callers pass the timestamps inside the lookback window.
pub fn preferred_hour(timestamps: &[DateTime<Utc>], offset: FixedOffset, rules: &ReminderRules) -> u32 {
    if timestamps.len() < MIN_READINGS_FOR_ADAPTATION {
        return rules.default_hour;
    }

    let total: u32 = timestamps
        .iter()
        .map(|ts| ts.with_timezone(&offset).hour())
        .sum();
    let mean = total / timestamps.len() as u32;

    mean.clamp(rules.min_hour, rules.max_hour)
}

/// Returns the new hour when it differs from the stored one
pub fn drifted_hour(stored: u32, computed: u32) -> Option<u32> {
    (stored != computed).then_some(computed)
}

/// Whether `hour` lies within `tolerance` hours of `preferred`
///
/// Hours are compared on the same local day and do not wrap: with a
/// preferred hour of 23, 00:xx is never inside the window. After midnight
/// the reading belongs to the next local day anyway.
pub fn within_window(hour: u32, preferred: u32, tolerance: u32) -> bool {
    hour.abs_diff(preferred) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_too_few_readings_uses_default() {
        let rules = ReminderRules::blood_pressure();
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(preferred_hour(&[at(9), at(10)], utc, &rules), 20);
    }

    #[test]
    fn test_mean_hour_uses_integer_division() {
        let rules = ReminderRules::blood_pressure();
        let utc = FixedOffset::east_opt(0).unwrap();
        // (19 + 20 + 22) / 3 = 20.33 -> 20
        assert_eq!(preferred_hour(&[at(19), at(20), at(22)], utc, &rules), 20);
        // (21 + 22 + 22) / 3 = 21.67 -> 21
        assert_eq!(preferred_hour(&[at(21), at(22), at(22)], utc, &rules), 21);
    }

    #[test]
    fn test_mean_is_clamped_into_band() {
        let weight = ReminderRules::weight();
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(preferred_hour(&[at(18), at(19), at(20)], utc, &weight), 12);

        let bp = ReminderRules::blood_pressure();
        assert_eq!(preferred_hour(&[at(5), at(6), at(7)], utc, &bp), 8);
    }

    #[test]
    fn test_hours_are_user_local() {
        let rules = ReminderRules::weight();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        // 05:30 UTC is 07:30 local
        assert_eq!(preferred_hour(&[at(5), at(5), at(5)], plus_two, &rules), 7);
    }

    #[test]
    fn test_drift_and_window() {
        assert_eq!(drifted_hour(20, 20), None);
        assert_eq!(drifted_hour(20, 21), Some(21));
        assert!(within_window(19, 20, 1));
        assert!(within_window(21, 20, 1));
        assert!(!within_window(22, 20, 1));
    }

    #[test]
    fn test_window_does_not_wrap_midnight() {
        assert!(within_window(22, 23, 1));
        assert!(within_window(23, 23, 0));
        assert!(!within_window(0, 23, 1));
    }
}
