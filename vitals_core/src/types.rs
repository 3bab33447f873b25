//! Core domain types for the Vitals system.
//!
//! This module defines the entities the scheduler reads and writes:
//! - Health domains and per-domain reminder state
//! - Measurements (blood pressure, weight, sleep)
//! - Medications, dose slots and intake records
//! - Workout groups, variants, rotation pointers and sessions

use crate::notification::SentHandle;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Users are identified by the short IDs listed in the config file
pub type UserId = String;

// ============================================================================
// Domains
// ============================================================================

/// A tracked health category
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    BloodPressure,
    Weight,
    Medication,
    Workout,
    Sleep,
}

impl Domain {
    /// Domains gated by a [`ReminderState`] record
    pub const MEASURED: [Domain; 2] = [Domain::BloodPressure, Domain::Weight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::BloodPressure => "blood_pressure",
            Domain::Weight => "weight",
            Domain::Medication => "medication",
            Domain::Workout => "workout",
            Domain::Sleep => "sleep",
        }
    }

    pub fn has_reminder_state(&self) -> bool {
        matches!(self, Domain::BloodPressure | Domain::Weight)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "blood_pressure" | "bp" => Ok(Domain::BloodPressure),
            "weight" => Ok(Domain::Weight),
            "medication" | "med" => Ok(Domain::Medication),
            "workout" => Ok(Domain::Workout),
            "sleep" => Ok(Domain::Sleep),
            other => Err(crate::Error::Other(format!("Unknown domain: {}", other))),
        }
    }
}

// ============================================================================
// Reminder State
// ============================================================================

/// Per-user, per-domain reminder gating record
///
/// `snoozed_until` and `dont_remind_until` are independent suppression
/// windows. A snooze is the short, user-initiated "later"; the second is
/// the longer "not today" suppression. Both are checked before any send.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReminderState {
    pub user_id: UserId,
    pub domain: Domain,
    pub enabled: bool,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub dont_remind_until: Option<DateTime<Utc>>,
    pub last_notification_sent_at: Option<DateTime<Utc>>,
    pub last_notification_handle: Option<SentHandle>,
    pub preferred_reminder_hour: u32,
}

impl ReminderState {
    pub fn new(user_id: &str, domain: Domain, default_hour: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            domain,
            enabled: true,
            snoozed_until: None,
            dont_remind_until: None,
            last_notification_sent_at: None,
            last_notification_handle: None,
            preferred_reminder_hour: default_hour,
        }
    }
}

// ============================================================================
// Measurements
// ============================================================================

/// A single blood-pressure measurement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BloodPressureReading {
    pub id: Uuid,
    pub user_id: UserId,
    pub measured_at: DateTime<Utc>,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: Option<i32>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub exclude_from_calculation: bool,
}

/// A single body-weight measurement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightReading {
    pub id: Uuid,
    pub user_id: UserId,
    pub measured_at: DateTime<Utc>,
    pub weight_kg: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub exclude_from_calculation: bool,
}

/// One night of sleep
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SleepRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub went_to_bed: DateTime<Utc>,
    pub woke_up: DateTime<Utc>,
    pub quality: Option<u8>,
}

// ============================================================================
// Medication
// ============================================================================

/// A medication with a fixed daily dosing schedule (user-local times)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub dosage: String,
    pub times: Vec<NaiveTime>,
    pub active: bool,
}

/// A single scheduled dose: the user's local date plus the schedule time
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DoseSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl fmt::Display for DoseSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time.format("%H:%M"))
    }
}

/// Confirmation that a dose was taken
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationIntake {
    pub id: Uuid,
    pub user_id: UserId,
    pub medication_id: Uuid,
    pub slot: DoseSlot,
    pub taken_at: DateTime<Utc>,
}

/// Reminder bookkeeping for one dose slot
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationReminder {
    pub user_id: UserId,
    pub medication_id: Uuid,
    pub slot: DoseSlot,
    pub last_sent_at: DateTime<Utc>,
    pub handle: Option<SentHandle>,
    pub snoozed_until: Option<DateTime<Utc>>,
}

// ============================================================================
// Workouts
// ============================================================================

/// A named recurring workout schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutGroup {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub weekdays: Vec<Weekday>,
    /// User-local start time
    pub time_of_day: NaiveTime,
    pub notice_minutes: u32,
    pub rotating: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// A named exercise set belonging to a group
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutVariant {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<String>,
    pub rotation_order: Option<u32>,
}

/// Per-group pointer to the variant that is up next
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RotationState {
    pub group_id: Uuid,
    pub current_variant_id: Option<Uuid>,
    pub last_advanced_on: Option<NaiveDate>,
}

/// Primary lifecycle status of a workout session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Notified,
    InProgress,
    Completed,
    Skipped,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Notified => "notified",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a session came from
///
/// Ad-hoc sessions carry no group or variant at the type level, so they can
/// never be fed into rotation advancement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOrigin {
    Scheduled {
        group_id: Uuid,
        variant_id: Option<Uuid>,
    },
    AdHoc {
        label: String,
    },
}

impl SessionOrigin {
    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            SessionOrigin::Scheduled { group_id, .. } => Some(*group_id),
            SessionOrigin::AdHoc { .. } => None,
        }
    }

    pub fn variant_id(&self) -> Option<Uuid> {
        match self {
            SessionOrigin::Scheduled { variant_id, .. } => *variant_id,
            SessionOrigin::AdHoc { .. } => None,
        }
    }

    pub fn is_ad_hoc(&self) -> bool {
        matches!(self, SessionOrigin::AdHoc { .. })
    }
}

/// One concrete occurrence of a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub origin: SessionOrigin,
    /// User-local calendar date
    pub scheduled_date: NaiveDate,
    pub scheduled_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub snooze_count: u32,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub notification_handle: Option<SentHandle>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
