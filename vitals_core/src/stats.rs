//! Day-weighted rolling averages.
//!
//! Readings are partitioned into UTC calendar days. Within a day every
//! reading covers the time from its own timestamp until the next reading of
//! the same day, or until midnight, or until `now` for today's partial
//! day. Each day's average is weighted by those coverage durations, and a
//! window's summary is the plain mean of its day averages, so a day with
//! ten self-measurements counts the same as a day with one.

use crate::{BloodPressureReading, WeightReading};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Trailing windows reported by summaries, in days
pub const DEFAULT_WINDOWS: [i64; 3] = [14, 30, 60];

/// Anything with a timestamp and numeric fields that can be averaged
pub trait Sample {
    fn measured_at(&self) -> DateTime<Utc>;

    fn excluded(&self) -> bool;

    /// One entry per field; `None` where the field was not captured
    fn values(&self) -> Vec<Option<f64>>;
}

impl Sample for BloodPressureReading {
    fn measured_at(&self) -> DateTime<Utc> {
        self.measured_at
    }

    fn excluded(&self) -> bool {
        self.exclude_from_calculation
    }

    fn values(&self) -> Vec<Option<f64>> {
        vec![
            Some(self.systolic as f64),
            Some(self.diastolic as f64),
            self.pulse.map(|p| p as f64),
        ]
    }
}

impl Sample for WeightReading {
    fn measured_at(&self) -> DateTime<Utc> {
        self.measured_at
    }

    fn excluded(&self) -> bool {
        self.exclude_from_calculation
    }

    fn values(&self) -> Vec<Option<f64>> {
        vec![Some(self.weight_kg)]
    }
}

/// Weighted average of one calendar day
#[derive(Clone, Debug, PartialEq)]
pub struct DayAverage {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
    pub readings: usize,
}

/// Summary of one trailing window
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSummary {
    pub window_days: i64,
    pub day_count: usize,
    pub reading_count: usize,
    pub averages: Vec<Option<f64>>,
}

impl WindowSummary {
    /// Field average rounded to the nearest integer
    pub fn rounded(&self, field: usize) -> Option<i64> {
        self.averages
            .get(field)
            .copied()
            .flatten()
            .map(|v| v.round() as i64)
    }
}

/// Compute per-day weighted averages
///
/// Input order matters only for identical timestamps: the reading that
/// appears later wins the interval that follows that instant.
pub fn daily_averages<T: Sample>(readings: &[T], now: DateTime<Utc>) -> Vec<DayAverage> {
    let mut included: Vec<&T> = readings.iter().filter(|r| !r.excluded()).collect();
    // Stable sort keeps insertion order among equal timestamps
    included.sort_by_key(|r| r.measured_at());

    let mut days = Vec::new();
    let mut start = 0;
    while start < included.len() {
        let date = included[start].measured_at().date_naive();
        let mut end = start;
        while end < included.len() && included[end].measured_at().date_naive() == date {
            end += 1;
        }
        if let Some(day) = weigh_day(date, &included[start..end], now) {
            days.push(day);
        }
        start = end;
    }
    days
}

fn weigh_day<T: Sample>(date: NaiveDate, day: &[&T], now: DateTime<Utc>) -> Option<DayAverage> {
    let day_end = match date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(midnight) => midnight.and_utc(),
        None => return None,
    };

    let fields = day.iter().map(|r| r.values().len()).max().unwrap_or(0);
    let mut weighted = vec![0.0_f64; fields];
    let mut covered = vec![0.0_f64; fields];
    let mut total = 0.0_f64;

    for (idx, reading) in day.iter().enumerate() {
        let from = reading.measured_at();
        let until = day
            .get(idx + 1)
            .map(|next| next.measured_at())
            .unwrap_or(day_end)
            .min(now);
        let seconds = seconds_between(from, until);
        if seconds <= 0.0 {
            continue;
        }
        total += seconds;
        for (field, value) in reading.values().into_iter().enumerate() {
            if let Some(v) = value {
                weighted[field] += v * seconds;
                covered[field] += seconds;
            }
        }
    }

    if total <= 0.0 {
        return None;
    }

    let values = weighted
        .iter()
        .zip(&covered)
        .map(|(sum, dur)| if *dur > 0.0 { Some(sum / dur) } else { None })
        .collect();

    Some(DayAverage {
        date,
        values,
        readings: day.len(),
    })
}

fn seconds_between(from: DateTime<Utc>, until: DateTime<Utc>) -> f64 {
    (until - from).num_milliseconds() as f64 / 1000.0
}

/// Summarize the trailing `window_days` days (today included)
///
/// Returns `None` when no day in the window has any covered duration.
pub fn summarize_window(days: &[DayAverage], today: NaiveDate, window_days: i64) -> Option<WindowSummary> {
    let first_day = today - Duration::days(window_days - 1);
    let in_window: Vec<&DayAverage> = days
        .iter()
        .filter(|d| d.date >= first_day && d.date <= today)
        .collect();

    if in_window.is_empty() {
        return None;
    }

    let fields = in_window.iter().map(|d| d.values.len()).max().unwrap_or(0);
    let averages = (0..fields)
        .map(|field| {
            let present: Vec<f64> = in_window
                .iter()
                .filter_map(|d| d.values.get(field).copied().flatten())
                .collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect();

    Some(WindowSummary {
        window_days,
        day_count: in_window.len(),
        reading_count: in_window.iter().map(|d| d.readings).sum(),
        averages,
    })
}

/// Summaries for each of `windows`, newest data measured against `now`
pub fn summarize<T: Sample>(readings: &[T], now: DateTime<Utc>, windows: &[i64]) -> Vec<(i64, Option<WindowSummary>)> {
    let days = daily_averages(readings, now);
    let today = now.date_naive();
    windows
        .iter()
        .map(|w| (*w, summarize_window(&days, today, *w)))
        .collect()
}
