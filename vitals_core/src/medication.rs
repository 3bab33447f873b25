//! Medication dose reminders.
//!
//! Each dose slot (local date + scheduled time) is reminded once as soon as
//! its time arrives, and again only if the user snoozed it and the snooze
//! has run out. Nothing is sent once an intake is confirmed or the grace
//! window after the dose time has passed.

use crate::{Database, DoseSlot, Error, Medication, MedicationIntake, MedicationReminder, Result, SentHandle};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use uuid::Uuid;

/// Slots of `medication` whose time has arrived within the last `grace`
///
/// Yesterday's slots are included so a late-evening dose stays remindable
/// past local midnight.
pub fn due_slots(medication: &Medication, local_now: NaiveDateTime, grace: Duration) -> Vec<DoseSlot> {
    let today = local_now.date();
    let dates = [today.pred_opt(), Some(today)];

    let mut slots: Vec<DoseSlot> = dates
        .iter()
        .flatten()
        .flat_map(|date| {
            medication.times.iter().map(move |time| DoseSlot {
                date: *date,
                time: *time,
            })
        })
        .filter(|slot| {
            let due_at = slot.date.and_time(slot.time);
            due_at <= local_now && local_now - due_at <= grace
        })
        .collect();
    slots.sort();
    slots.dedup();
    slots
}

/// Whether a slot needs a (re)send right now
pub fn needs_reminder(db: &Database, medication_id: Uuid, slot: DoseSlot, now: DateTime<Utc>) -> bool {
    if db.intake_for(medication_id, slot).is_some() {
        return false;
    }
    match db.medication_reminder(medication_id, slot) {
        None => true,
        Some(reminder) => match reminder.snoozed_until {
            Some(until) => until <= now && reminder.last_sent_at < until,
            None => false,
        },
    }
}

/// Every (medication, slot) pair of the user that should be reminded now
pub fn pending_reminders(
    db: &Database,
    user_id: &str,
    offset: FixedOffset,
    now: DateTime<Utc>,
    grace: Duration,
) -> Vec<(Medication, DoseSlot)> {
    let local_now = now.with_timezone(&offset).naive_local();
    db.medications_for(user_id)
        .into_iter()
        .filter(|m| m.active)
        .flat_map(|m| {
            due_slots(m, local_now, grace)
                .into_iter()
                .filter(|slot| needs_reminder(db, m.id, *slot, now))
                .map(|slot| (m.clone(), slot))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Persist a successful send for a slot
pub fn record_sent(db: &mut Database, user_id: &str, medication_id: Uuid, slot: DoseSlot, at: DateTime<Utc>, handle: SentHandle) {
    match db.medication_reminder_mut(medication_id, slot) {
        Some(reminder) => {
            reminder.last_sent_at = at;
            reminder.handle = Some(handle);
        }
        None => db.medication_reminders.push(MedicationReminder {
            user_id: user_id.to_string(),
            medication_id,
            slot,
            last_sent_at: at,
            handle: Some(handle),
            snoozed_until: None,
        }),
    }
}

/// Record that a dose was taken
///
/// Returns the handle of the reminder that went out for this slot, so the
/// caller can retract it. Confirming twice is a no-op.
pub fn confirm_intake(db: &mut Database, user_id: &str, medication_id: Uuid, slot: DoseSlot, now: DateTime<Utc>) -> Result<Option<SentHandle>> {
    let medication = db.medication(user_id, medication_id)?;
    if !medication.times.contains(&slot.time) {
        return Err(Error::NotFound(format!(
            "{} has no dose scheduled at {}",
            medication.name,
            slot.time.format("%H:%M")
        )));
    }

    if db.intake_for(medication_id, slot).is_some() {
        tracing::debug!("Intake for {} at {} already recorded", medication_id, slot);
        return Ok(None);
    }

    db.intakes.push(MedicationIntake {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        medication_id,
        slot,
        taken_at: now,
    });
    tracing::info!("Recorded intake of {} for {} ({})", medication_id, user_id, slot);

    Ok(db
        .medication_reminder_mut(medication_id, slot)
        .and_then(|r| r.handle.take()))
}

/// Push a sent slot reminder back by `minutes`
pub fn snooze(db: &mut Database, user_id: &str, medication_id: Uuid, slot: DoseSlot, now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    if minutes <= 0 {
        return Err(Error::Other("snooze duration must be positive".into()));
    }
    db.medication(user_id, medication_id)?;
    let reminder = db
        .medication_reminder_mut(medication_id, slot)
        .ok_or_else(|| Error::NotFound(format!("no reminder sent for {} at {}", medication_id, slot)))?;
    let until = now + Duration::minutes(minutes);
    reminder.snoozed_until = Some(until);
    Ok(until)
}
