//! Workout session lifecycle.
//!
//! ```text
//! pending --notify--> notified --start--> in_progress --complete--> completed
//! pending | notified | in_progress --skip--> skipped
//! ```
//!
//! Snoozing is orthogonal to the status: it sets `snoozed_until` and bumps
//! `snooze_count` on any non-terminal session. `completed` and `skipped` are
//! terminal; a leftover snooze timer on them is ignored everywhere.

use crate::{
    rotation, Database, Error, Result, SentHandle, SessionOrigin, SessionStatus, WorkoutGroup,
    WorkoutSession,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

/// How long after its start time a pending session is still worth announcing
pub const LATE_NOTICE_HOURS: i64 = 2;

impl WorkoutSession {
    fn refuse(&self, action: &str) -> Error {
        Error::InvalidTransition {
            from: self.status.to_string(),
            action: action.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.snoozed_until.map_or(false, |until| until > now)
    }

    /// Record that a reminder went out; re-notifying a notified session is allowed
    pub fn notify(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            SessionStatus::Pending | SessionStatus::Notified => {
                self.status = SessionStatus::Notified;
                self.last_notified_at = Some(now);
                Ok(())
            }
            _ => Err(self.refuse("notify")),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            SessionStatus::Pending | SessionStatus::Notified => {
                self.status = SessionStatus::InProgress;
                self.started_at = Some(now);
                Ok(())
            }
            _ => Err(self.refuse("start")),
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            SessionStatus::InProgress => {
                self.status = SessionStatus::Completed;
                self.finished_at = Some(now);
                Ok(())
            }
            _ => Err(self.refuse("complete")),
        }
    }

    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.refuse("skip"));
        }
        self.status = SessionStatus::Skipped;
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn snooze(&mut self, now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
        if self.status.is_terminal() {
            return Err(self.refuse("snooze"));
        }
        if minutes <= 0 {
            return Err(Error::Other("snooze duration must be positive".into()));
        }
        let until = now + Duration::minutes(minutes);
        self.snoozed_until = Some(until);
        self.snooze_count += 1;
        Ok(until)
    }
}

pub fn occurs_on(group: &WorkoutGroup, date: NaiveDate) -> bool {
    use chrono::Datelike;
    group.weekdays.contains(&date.weekday())
}

/// UTC instant of the group's start time on a local date
pub fn scheduled_instant(group: &WorkoutGroup, date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(group.time_of_day))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Outcome of lazily creating sessions for upcoming occurrences
#[derive(Debug, Default)]
pub struct SessionSync {
    pub created: Vec<Uuid>,
    /// Groups skipped because of configuration or data problems
    pub failures: Vec<(Uuid, Error)>,
}

/// Create one session per group and matching date, today through `lookahead_days`
pub fn ensure_sessions(db: &mut Database, user_id: &str, offset: FixedOffset, now: DateTime<Utc>, lookahead_days: i64) -> SessionSync {
    let today = now.with_timezone(&offset).date_naive();
    let groups: Vec<WorkoutGroup> = db
        .groups_for(user_id)
        .into_iter()
        .filter(|g| g.active)
        .cloned()
        .collect();

    let mut sync = SessionSync::default();
    for group in groups {
        for ahead in 0..=lookahead_days.max(0) {
            let date = today + Duration::days(ahead);
            if !occurs_on(&group, date) || db.session_for_group_on(group.id, date).is_some() {
                continue;
            }
            match create_scheduled(db, &group, date, offset) {
                Ok(id) => sync.created.push(id),
                Err(e) => {
                    tracing::warn!("Skipping workout group {} ({}): {}", group.name, group.id, e);
                    sync.failures.push((group.id, e));
                    break;
                }
            }
        }
    }
    sync
}

fn create_scheduled(db: &mut Database, group: &WorkoutGroup, date: NaiveDate, offset: FixedOffset) -> Result<Uuid> {
    let scheduled_at = scheduled_instant(group, date, offset).ok_or_else(|| {
        Error::Other(format!("{} has no valid start time on {}", group.name, date))
    })?;

    let variants = db.variants_for(group.id);
    if group.rotating && variants.is_empty() {
        return Err(Error::Rotation(format!(
            "group {} is rotating but has no variants",
            group.name
        )));
    }
    let state = if group.rotating {
        db.rotation_state(group.id)
    } else {
        None
    };
    let variant_id = rotation::current(state, &variants).map(|v| v.id);

    let session = WorkoutSession {
        id: Uuid::new_v4(),
        user_id: group.user_id.clone(),
        origin: SessionOrigin::Scheduled {
            group_id: group.id,
            variant_id,
        },
        scheduled_date: date,
        scheduled_at,
        status: SessionStatus::Pending,
        snoozed_until: None,
        snooze_count: 0,
        last_notified_at: None,
        notification_handle: None,
        started_at: None,
        finished_at: None,
    };
    let id = session.id;
    tracing::info!("Created {} session for {} on {}", group.name, group.user_id, date);
    db.workout_sessions.push(session);
    Ok(id)
}

/// Whether a session should be announced at `now`
pub fn needs_notification(session: &WorkoutSession, notice_minutes: u32, now: DateTime<Utc>) -> bool {
    if !session.is_active() || session.origin.is_ad_hoc() || session.is_snoozed(now) {
        return false;
    }

    if let Some(until) = session.snoozed_until {
        // Snooze ran out: announce again once
        let renotify = matches!(session.status, SessionStatus::Pending | SessionStatus::Notified)
            && session.last_notified_at.map_or(true, |t| t < until);
        if renotify {
            return true;
        }
    }

    session.status == SessionStatus::Pending
        && now >= session.scheduled_at - Duration::minutes(notice_minutes as i64)
        && now <= session.scheduled_at + Duration::hours(LATE_NOTICE_HOURS)
}

/// Sessions of `user_id` due for a reminder
pub fn due_notifications(db: &Database, user_id: &str, now: DateTime<Utc>) -> Vec<Uuid> {
    db.sessions_for(user_id)
        .into_iter()
        .filter(|s| {
            let notice = s
                .origin
                .group_id()
                .and_then(|g| db.group(g))
                .map_or(0, |g| g.notice_minutes);
            needs_notification(s, notice, now)
        })
        .map(|s| s.id)
        .collect()
}

/// Group and variant names for display
pub fn describe(db: &Database, session: &WorkoutSession) -> (String, Option<String>) {
    match &session.origin {
        SessionOrigin::Scheduled { group_id, variant_id } => {
            let title = db
                .group(*group_id)
                .map(|g| g.name.clone())
                .unwrap_or_else(|| "Workout".to_string());
            let variant = variant_id
                .and_then(|id| db.variant(id))
                .map(|v| v.name.clone());
            (title, variant)
        }
        SessionOrigin::AdHoc { label } => (label.clone(), None),
    }
}

pub fn mark_notified(db: &mut Database, user_id: &str, session_id: Uuid, now: DateTime<Utc>, handle: SentHandle) -> Result<()> {
    let session = db.session_mut(user_id, session_id)?;
    session.notify(now)?;
    session.notification_handle = Some(handle);
    Ok(())
}

/// Earliest active session scheduled for `today` or later
///
/// Terminal sessions never qualify, whatever their snooze field says.
pub fn next_workout(db: &Database, user_id: &str, today: NaiveDate) -> Option<WorkoutSession> {
    db.sessions_for(user_id)
        .into_iter()
        .filter(|s| s.is_active() && s.scheduled_date >= today)
        .min_by_key(|s| s.scheduled_at)
        .cloned()
}

/// Completed and skipped sessions, newest first
pub fn history(db: &Database, user_id: &str) -> Vec<WorkoutSession> {
    let mut done: Vec<WorkoutSession> = db
        .sessions_for(user_id)
        .into_iter()
        .filter(|s| s.status.is_terminal())
        .cloned()
        .collect();
    done.sort_by(|a, b| {
        b.finished_at
            .unwrap_or(b.scheduled_at)
            .cmp(&a.finished_at.unwrap_or(a.scheduled_at))
    });
    done
}

/// Complete a session and advance its group's rotation in the same write
///
/// Returns the variant that is now up next, if the group rotates.
pub fn complete(db: &mut Database, user_id: &str, session_id: Uuid, now: DateTime<Utc>, today: NaiveDate) -> Result<Option<Uuid>> {
    let session = db.session_mut(user_id, session_id)?;
    session.complete(now)?;
    tracing::info!("Workout session {} completed by {}", session_id, user_id);

    let group_id = match session.origin.group_id() {
        Some(group_id) => group_id,
        None => return Ok(None),
    };
    let rotating = db.group(group_id).map_or(false, |g| g.rotating);
    if !rotating {
        return Ok(None);
    }

    let variants = db.variants_for(group_id);
    let next = rotation::advance(db.rotation_state_mut(group_id), &variants, today)?;

    // Upcoming sessions created before this advance still point at the old variant
    for upcoming in db.workout_sessions.iter_mut().filter(|s| {
        s.id != session_id
            && s.status == SessionStatus::Pending
            && s.scheduled_date >= today
            && s.origin.group_id() == Some(group_id)
    }) {
        upcoming.origin = SessionOrigin::Scheduled {
            group_id,
            variant_id: Some(next),
        };
    }
    Ok(Some(next))
}

/// Create a session outside any schedule, already in progress
pub fn start_ad_hoc(db: &mut Database, user_id: &str, label: &str, now: DateTime<Utc>, offset: FixedOffset) -> Uuid {
    let session = WorkoutSession {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        origin: SessionOrigin::AdHoc {
            label: label.to_string(),
        },
        scheduled_date: now.with_timezone(&offset).date_naive(),
        scheduled_at: now,
        status: SessionStatus::InProgress,
        snoozed_until: None,
        snooze_count: 0,
        last_notified_at: None,
        notification_handle: None,
        started_at: Some(now),
        finished_at: None,
    };
    let id = session.id;
    tracing::info!("Started ad-hoc workout '{}' for {}", label, user_id);
    db.workout_sessions.push(session);
    id
}
