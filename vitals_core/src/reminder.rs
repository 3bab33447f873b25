//! Reminder state store operations.
//!
//! Reads return the defaults for a domain when no record exists yet; the
//! record itself is created on the first write.

use crate::config::ReminderRules;
use crate::{Domain, Error, ReminderState, Result, SentHandle, Store};
use chrono::{DateTime, Duration, Utc};

fn ensure_measured(domain: Domain) -> Result<()> {
    if domain.has_reminder_state() {
        Ok(())
    } else {
        Err(Error::Other(format!("{} has no reminder state", domain)))
    }
}

/// Current state, or the defaults for an untouched domain
pub fn load<S: Store>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules) -> Result<ReminderState> {
    ensure_measured(domain)?;
    store.read(|db| {
        db.reminder_state(user_id, domain)
            .cloned()
            .unwrap_or_else(|| ReminderState::new(user_id, domain, rules.default_hour))
    })
}

/// Apply `f` to the (lazily created) record and persist it
pub fn update<S, F>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules, f: F) -> Result<ReminderState>
where
    S: Store,
    F: FnOnce(&mut ReminderState) -> Result<()>,
{
    ensure_measured(domain)?;
    store.write(|db| {
        let state = db.reminder_state_mut(user_id, domain, rules.default_hour);
        f(state)?;
        Ok(state.clone())
    })
}

pub fn set_enabled<S: Store>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules, enabled: bool) -> Result<ReminderState> {
    tracing::info!("{} reminders for {}: enabled={}", domain, user_id, enabled);
    update(store, user_id, domain, rules, |state| {
        state.enabled = enabled;
        Ok(())
    })
}

/// Short user-initiated "remind me later"
pub fn snooze<S: Store>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules, now: DateTime<Utc>, minutes: i64) -> Result<ReminderState> {
    if minutes <= 0 {
        return Err(Error::Other("snooze duration must be positive".into()));
    }
    let until = now + Duration::minutes(minutes);
    tracing::info!("Snoozing {} reminders for {} until {}", domain, user_id, until);
    update(store, user_id, domain, rules, |state| {
        state.snoozed_until = Some(until);
        Ok(())
    })
}

/// Longer "not today" suppression
pub fn suppress<S: Store>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules, now: DateTime<Utc>, hours: i64) -> Result<ReminderState> {
    if hours <= 0 {
        return Err(Error::Other("suppression duration must be positive".into()));
    }
    let until = now + Duration::hours(hours);
    tracing::info!("Suppressing {} reminders for {} until {}", domain, user_id, until);
    update(store, user_id, domain, rules, |state| {
        state.dont_remind_until = Some(until);
        Ok(())
    })
}

/// Persist a successful send
pub fn record_sent<S: Store>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules, at: DateTime<Utc>, handle: SentHandle) -> Result<ReminderState> {
    update(store, user_id, domain, rules, |state| {
        state.last_notification_sent_at = Some(at);
        state.last_notification_handle = Some(handle);
        Ok(())
    })
}

/// Store a recomputed preferred hour; returns whether anything changed
pub fn set_preferred_hour<S: Store>(store: &S, user_id: &str, domain: Domain, rules: &ReminderRules, hour: u32) -> Result<bool> {
    ensure_measured(domain)?;
    store.write(|db| {
        let state = db.reminder_state_mut(user_id, domain, rules.default_hour);
        if state.preferred_reminder_hour == hour {
            return Ok(false);
        }
        tracing::info!(
            "Preferred {} hour for {} moved {} -> {}",
            domain,
            user_id,
            state.preferred_reminder_hour,
            hour
        );
        state.preferred_reminder_hour = hour;
        Ok(true)
    })
}

/// Remove and return the outstanding notification handle, if any
pub fn take_handle<S: Store>(store: &S, user_id: &str, domain: Domain) -> Result<Option<SentHandle>> {
    ensure_measured(domain)?;
    store.write(|db| {
        Ok(db
            .reminder_states
            .iter_mut()
            .find(|s| s.user_id == user_id && s.domain == domain)
            .and_then(|s| s.last_notification_handle.take()))
    })
}
