//! User-initiated operations.
//!
//! Thin pass-throughs into the reminder store, the workout state machine and
//! the medication bookkeeping. Operations that make an outstanding
//! notification obsolete (a new reading, a confirmed dose, a started or
//! finished workout) retract it on a best-effort basis.

use crate::config::UserProfile;
use crate::stats::{self, WindowSummary};
use crate::{
    medication, reminder, workout, BloodPressureReading, Clock, Domain, DoseSlot, Error,
    Medication, ReminderState, Result, Scheduler, SentHandle, SleepRecord, Store, WeightReading,
    WorkoutGroup, WorkoutSession, WorkoutVariant,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use uuid::Uuid;

/// How long "not today" keeps a domain quiet
pub const SUPPRESS_HOURS: i64 = 24;

pub struct ControlSurface<'a, S, C> {
    scheduler: &'a Scheduler<S, C>,
}

impl<'a, S: Store, C: Clock> ControlSurface<'a, S, C> {
    pub fn new(scheduler: &'a Scheduler<S, C>) -> Self {
        Self { scheduler }
    }

    fn store(&self) -> &'a S {
        self.scheduler.store()
    }

    fn now(&self) -> DateTime<Utc> {
        self.scheduler.clock().now()
    }

    fn user(&self, user_id: &str) -> Result<&'a UserProfile> {
        self.scheduler.config().find_user(user_id)
    }

    fn offset(&self, user_id: &str) -> Result<FixedOffset> {
        self.user(user_id)?.offset()
    }

    fn today(&self, user_id: &str) -> Result<NaiveDate> {
        Ok(self.now().with_timezone(&self.offset(user_id)?).date_naive())
    }

    fn retract(&self, handle: Option<SentHandle>) {
        if let Some(handle) = handle {
            let removed = self.scheduler.dispatcher().retract(&handle);
            tracing::debug!("Retracted {} of {} delivered notification(s)", removed, handle.receipts.len());
        }
    }

    // ------------------------------------------------------------------
    // Measurement reminders
    // ------------------------------------------------------------------

    pub fn reminder_state(&self, user_id: &str, domain: Domain) -> Result<ReminderState> {
        self.user(user_id)?;
        let rules = self.scheduler.config().rules_for(domain)?;
        reminder::load(self.store(), user_id, domain, rules)
    }

    pub fn set_reminder_enabled(&self, user_id: &str, domain: Domain, enabled: bool) -> Result<ReminderState> {
        self.user(user_id)?;
        let rules = self.scheduler.config().rules_for(domain)?;
        reminder::set_enabled(self.store(), user_id, domain, rules, enabled)
    }

    pub fn snooze_reminder(&self, user_id: &str, domain: Domain, minutes: i64) -> Result<ReminderState> {
        self.user(user_id)?;
        let rules = self.scheduler.config().rules_for(domain)?;
        reminder::snooze(self.store(), user_id, domain, rules, self.now(), minutes)
    }

    pub fn suppress_reminder_24h(&self, user_id: &str, domain: Domain) -> Result<ReminderState> {
        self.user(user_id)?;
        let rules = self.scheduler.config().rules_for(domain)?;
        reminder::suppress(self.store(), user_id, domain, rules, self.now(), SUPPRESS_HOURS)
    }

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    pub fn record_blood_pressure(
        &self,
        user_id: &str,
        systolic: i32,
        diastolic: i32,
        pulse: Option<i32>,
        measured_at: Option<DateTime<Utc>>,
    ) -> Result<BloodPressureReading> {
        self.user(user_id)?;
        if systolic <= 0 || diastolic <= 0 || diastolic >= systolic {
            return Err(Error::Other(format!(
                "implausible blood pressure {}/{}",
                systolic, diastolic
            )));
        }
        if pulse.map_or(false, |p| p <= 0) {
            return Err(Error::Other("pulse must be positive".into()));
        }

        let reading = BloodPressureReading {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            measured_at: measured_at.unwrap_or_else(|| self.now()),
            systolic,
            diastolic,
            pulse,
            note: None,
            exclude_from_calculation: false,
        };
        self.store().write(|db| {
            db.blood_pressure.push(reading.clone());
            Ok(())
        })?;
        tracing::info!(
            "Recorded blood pressure {}/{} for {} ({})",
            systolic,
            diastolic,
            user_id,
            reading.category().label()
        );

        self.retract(reminder::take_handle(self.store(), user_id, Domain::BloodPressure)?);
        Ok(reading)
    }

    /// Flag a blood-pressure reading so averages and the dominant category ignore it
    pub fn set_blood_pressure_excluded(&self, user_id: &str, reading_id: Uuid, excluded: bool) -> Result<()> {
        self.store().write(|db| {
            let reading = db
                .blood_pressure
                .iter_mut()
                .find(|r| r.id == reading_id && r.user_id == user_id)
                .ok_or_else(|| Error::NotFound(format!("blood pressure reading {}", reading_id)))?;
            reading.exclude_from_calculation = excluded;
            Ok(())
        })
    }

    pub fn record_weight(&self, user_id: &str, weight_kg: f64, measured_at: Option<DateTime<Utc>>) -> Result<WeightReading> {
        self.user(user_id)?;
        if !weight_kg.is_finite() || weight_kg <= 0.0 {
            return Err(Error::Other(format!("implausible weight {}", weight_kg)));
        }

        let reading = WeightReading {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            measured_at: measured_at.unwrap_or_else(|| self.now()),
            weight_kg,
            note: None,
            exclude_from_calculation: false,
        };
        self.store().write(|db| {
            db.weight.push(reading.clone());
            Ok(())
        })?;
        tracing::info!("Recorded weight {:.1} kg for {}", weight_kg, user_id);

        self.retract(reminder::take_handle(self.store(), user_id, Domain::Weight)?);
        Ok(reading)
    }

    pub fn record_sleep(
        &self,
        user_id: &str,
        went_to_bed: DateTime<Utc>,
        woke_up: DateTime<Utc>,
        quality: Option<u8>,
    ) -> Result<SleepRecord> {
        self.user(user_id)?;
        if woke_up <= went_to_bed {
            return Err(Error::Other("wake-up time must be after bedtime".into()));
        }
        if quality.map_or(false, |q| !(1..=5).contains(&q)) {
            return Err(Error::Other("sleep quality must be between 1 and 5".into()));
        }

        let record = SleepRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            went_to_bed,
            woke_up,
            quality,
        };
        self.store().write(|db| {
            db.sleep.push(record.clone());
            Ok(())
        })?;
        Ok(record)
    }

    /// Day-weighted blood-pressure averages (systolic, diastolic, pulse)
    pub fn blood_pressure_summary(&self, user_id: &str, windows: &[i64]) -> Result<Vec<(i64, Option<WindowSummary>)>> {
        self.user(user_id)?;
        let now = self.now();
        let from = now - Duration::days(windows.iter().copied().max().unwrap_or(0) + 1);
        let readings = self.store().read(|db| db.blood_pressure_between(user_id, from, now))?;
        Ok(stats::summarize(&readings, now, windows))
    }

    /// Day-weighted weight averages
    pub fn weight_summary(&self, user_id: &str, windows: &[i64]) -> Result<Vec<(i64, Option<WindowSummary>)>> {
        self.user(user_id)?;
        let now = self.now();
        let from = now - Duration::days(windows.iter().copied().max().unwrap_or(0) + 1);
        let readings = self.store().read(|db| db.weight_between(user_id, from, now))?;
        Ok(stats::summarize(&readings, now, windows))
    }

    // ------------------------------------------------------------------
    // Medication
    // ------------------------------------------------------------------

    pub fn add_medication(&self, user_id: &str, name: &str, dosage: &str, times: Vec<NaiveTime>) -> Result<Medication> {
        self.user(user_id)?;
        if times.is_empty() {
            return Err(Error::Other(format!("{} needs at least one dose time", name)));
        }
        let mut times = times;
        times.sort();
        times.dedup();

        let med = Medication {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            dosage: dosage.to_string(),
            times,
            active: true,
        };
        self.store().write(|db| {
            db.medications.push(med.clone());
            Ok(())
        })?;
        tracing::info!("Added medication {} for {}", name, user_id);
        Ok(med)
    }

    pub fn medications(&self, user_id: &str) -> Result<Vec<Medication>> {
        self.store()
            .read(|db| db.medications_for(user_id).into_iter().cloned().collect())
    }

    /// Slot a dose at `time` refers to when no date is given
    ///
    /// A reminded but unconfirmed slot from today or yesterday wins, so a late
    /// evening dose confirmed after midnight lands on the evening it belongs
    /// to. Otherwise the latest occurrence at or before now.
    pub fn dose_slot(&self, user_id: &str, medication_id: Uuid, time: NaiveTime) -> Result<DoseSlot> {
        let local_now = self.now().with_timezone(&self.offset(user_id)?).naive_local();
        let today = local_now.date();
        let yesterday = today.pred_opt().unwrap_or(today);

        let candidates = [DoseSlot { date: today, time }, DoseSlot { date: yesterday, time }];
        let reminded = self.store().read(|db| {
            candidates.into_iter().find(|slot| {
                db.medication_reminder(medication_id, *slot).is_some()
                    && db.intake_for(medication_id, *slot).is_none()
            })
        })?;

        Ok(reminded.unwrap_or(DoseSlot {
            date: if time <= local_now.time() { today } else { yesterday },
            time,
        }))
    }

    /// Returns false when the intake was already recorded
    pub fn confirm_medication_intake(&self, user_id: &str, medication_id: Uuid, slot: DoseSlot) -> Result<bool> {
        self.user(user_id)?;
        let now = self.now();
        let (recorded, handle) = self.store().write(|db| {
            let already = db.intake_for(medication_id, slot).is_some();
            let handle = medication::confirm_intake(db, user_id, medication_id, slot, now)?;
            Ok((!already, handle))
        })?;
        self.retract(handle);
        Ok(recorded)
    }

    pub fn snooze_medication(&self, user_id: &str, medication_id: Uuid, slot: DoseSlot, minutes: Option<i64>) -> Result<DateTime<Utc>> {
        self.user(user_id)?;
        let minutes = minutes.unwrap_or(self.scheduler.config().medication.snooze_minutes);
        let now = self.now();
        self.store()
            .write(|db| medication::snooze(db, user_id, medication_id, slot, now, minutes))
    }

    // ------------------------------------------------------------------
    // Workouts
    // ------------------------------------------------------------------

    pub fn add_workout_group(
        &self,
        user_id: &str,
        name: &str,
        weekdays: Vec<Weekday>,
        time_of_day: NaiveTime,
        notice_minutes: u32,
        rotating: bool,
    ) -> Result<WorkoutGroup> {
        self.user(user_id)?;
        if weekdays.is_empty() {
            return Err(Error::Other(format!("{} needs at least one weekday", name)));
        }
        let group = WorkoutGroup {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            weekdays,
            time_of_day,
            notice_minutes,
            rotating,
            active: true,
        };
        self.store().write(|db| {
            db.workout_groups.push(group.clone());
            Ok(())
        })?;
        tracing::info!("Added workout group {} for {}", name, user_id);
        Ok(group)
    }

    pub fn add_workout_variant(
        &self,
        user_id: &str,
        group_id: Uuid,
        name: &str,
        exercises: Vec<String>,
        rotation_order: Option<u32>,
    ) -> Result<WorkoutVariant> {
        let variant = WorkoutVariant {
            id: Uuid::new_v4(),
            group_id,
            name: name.to_string(),
            exercises,
            rotation_order,
        };
        self.store().write(|db| {
            match db.group(group_id) {
                Some(group) if group.user_id == user_id => {}
                _ => return Err(Error::NotFound(format!("workout group {}", group_id))),
            }
            db.workout_variants.push(variant.clone());
            Ok(())
        })?;
        Ok(variant)
    }

    pub fn workout_groups(&self, user_id: &str) -> Result<Vec<(WorkoutGroup, Vec<WorkoutVariant>)>> {
        self.store().read(|db| {
            db.groups_for(user_id)
                .into_iter()
                .map(|g| (g.clone(), db.variants_for(g.id)))
                .collect()
        })
    }

    /// Apply a transition and hand back the session's outstanding notification
    fn transition<F>(&self, user_id: &str, session_id: Uuid, f: F) -> Result<WorkoutSession>
    where
        F: FnOnce(&mut WorkoutSession, DateTime<Utc>) -> Result<()>,
    {
        self.user(user_id)?;
        let now = self.now();
        let (session, handle) = self.store().write(|db| {
            let session = db.session_mut(user_id, session_id)?;
            f(session, now)?;
            let handle = session.notification_handle.take();
            Ok((session.clone(), handle))
        })?;
        self.retract(handle);
        Ok(session)
    }

    pub fn start_session(&self, user_id: &str, session_id: Uuid) -> Result<WorkoutSession> {
        let session = self.transition(user_id, session_id, |s, now| s.start(now))?;
        tracing::info!("Workout session {} started by {}", session_id, user_id);
        Ok(session)
    }

    pub fn skip_session(&self, user_id: &str, session_id: Uuid) -> Result<WorkoutSession> {
        let session = self.transition(user_id, session_id, |s, now| s.skip(now))?;
        tracing::info!("Workout session {} skipped by {}", session_id, user_id);
        Ok(session)
    }

    /// Snooze keeps the notification handle so the reminder can be re-sent
    pub fn snooze_session(&self, user_id: &str, session_id: Uuid, minutes: Option<i64>) -> Result<DateTime<Utc>> {
        self.user(user_id)?;
        let minutes = minutes.unwrap_or(self.scheduler.config().workout.snooze_minutes);
        let now = self.now();
        self.store()
            .write(|db| db.session_mut(user_id, session_id)?.snooze(now, minutes))
    }

    /// Complete a session; returns the variant that is now up next
    pub fn complete_session(&self, user_id: &str, session_id: Uuid) -> Result<Option<Uuid>> {
        let now = self.now();
        let today = self.today(user_id)?;
        let (next, handle) = self.store().write(|db| {
            let next = workout::complete(db, user_id, session_id, now, today)?;
            let handle = db.session_mut(user_id, session_id)?.notification_handle.take();
            Ok((next, handle))
        })?;
        self.retract(handle);
        Ok(next)
    }

    pub fn start_ad_hoc_session(&self, user_id: &str, label: &str) -> Result<Uuid> {
        let offset = self.offset(user_id)?;
        let now = self.now();
        self.store()
            .write(|db| Ok(workout::start_ad_hoc(db, user_id, label, now, offset)))
    }

    pub fn next_workout(&self, user_id: &str) -> Result<Option<WorkoutSession>> {
        let today = self.today(user_id)?;
        self.store().read(|db| workout::next_workout(db, user_id, today))
    }

    pub fn workout_history(&self, user_id: &str) -> Result<Vec<WorkoutSession>> {
        self.user(user_id)?;
        self.store().read(|db| workout::history(db, user_id))
    }

    /// Group and variant names of a session, for display
    pub fn describe_session(&self, session: &WorkoutSession) -> Result<(String, Option<String>)> {
        self.store().read(|db| workout::describe(db, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingChannel;
    use crate::eligibility::Gate;
    use crate::{Config, Dispatcher, FixedClock, MemoryStore, SessionStatus};
    use chrono::{Datelike, TimeZone};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, minute, 0).unwrap()
    }

    fn setup(now: DateTime<Utc>) -> (Scheduler<MemoryStore, FixedClock>, RecordingChannel) {
        let push = RecordingChannel::new("push");
        let mut config = Config::default();
        config.users.push(UserProfile::new("ana", 0));
        let dispatcher = Dispatcher::new().with_provider(Box::new(push.clone()));
        let scheduler = Scheduler::new(MemoryStore::new(), FixedClock::new(now), dispatcher, config);
        (scheduler, push)
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_reading_retracts_outstanding_reminder() {
        let (scheduler, push) = setup(at(10, 20, 0));
        let controls = scheduler.controls();
        for day in 7..=9 {
            controls
                .record_blood_pressure("ana", 121, 79, None, Some(at(day, 20, 5)))
                .unwrap();
        }

        assert_eq!(scheduler.tick().sent_count(Domain::BloodPressure), 1);

        controls.record_blood_pressure("ana", 124, 78, Some(70), None).unwrap();
        assert_eq!(push.removed(), vec!["push-1".to_string()]);
        assert!(controls
            .reminder_state("ana", Domain::BloodPressure)
            .unwrap()
            .last_notification_handle
            .is_none());

        scheduler.clock().advance(Duration::minutes(1));
        assert_eq!(
            scheduler.tick().gate_for("ana", Domain::BloodPressure),
            Some(Gate::MeasuredToday)
        );
    }

    #[test]
    fn test_suppress_and_disable() {
        let (scheduler, _push) = setup(at(10, 20, 0));
        let controls = scheduler.controls();

        controls.suppress_reminder_24h("ana", Domain::BloodPressure).unwrap();
        assert_eq!(
            scheduler.tick().gate_for("ana", Domain::BloodPressure),
            Some(Gate::Suppressed)
        );

        controls.set_reminder_enabled("ana", Domain::Weight, false).unwrap();
        assert_eq!(
            scheduler.tick().gate_for("ana", Domain::Weight),
            Some(Gate::Disabled)
        );

        assert!(controls.snooze_reminder("ana", Domain::Medication, 10).is_err());
        assert!(controls.snooze_reminder("zoe", Domain::Weight, 10).is_err());
    }

    #[test]
    fn test_rejects_implausible_readings() {
        let (scheduler, _push) = setup(at(10, 20, 0));
        let controls = scheduler.controls();
        assert!(controls.record_blood_pressure("ana", 80, 120, None, None).is_err());
        assert!(controls.record_weight("ana", -3.0, None).is_err());
        assert!(controls
            .record_sleep("ana", at(10, 7, 0), at(9, 23, 0), None)
            .is_err());
        assert!(controls
            .record_sleep("ana", at(9, 23, 0), at(10, 7, 0), Some(4))
            .is_ok());
    }

    #[test]
    fn test_confirm_intake_retracts_and_is_idempotent() {
        let (scheduler, push) = setup(at(10, 8, 10));
        let controls = scheduler.controls();
        let med = controls
            .add_medication("ana", "Ramipril", "5 mg", vec![hm(8, 0)])
            .unwrap();

        scheduler.tick();
        let handle = push
            .sent()
            .into_iter()
            .find(|s| s.notification.domain() == Domain::Medication)
            .map(|s| s.handle)
            .unwrap();

        let slot = controls.dose_slot("ana", med.id, hm(8, 0)).unwrap();
        assert!(controls.confirm_medication_intake("ana", med.id, slot).unwrap());
        assert!(!controls.confirm_medication_intake("ana", med.id, slot).unwrap());
        assert_eq!(push.removed(), vec![handle]);

        let wrong = controls.dose_slot("ana", med.id, hm(9, 0)).unwrap();
        assert!(controls.confirm_medication_intake("ana", med.id, wrong).is_err());
    }

    #[test]
    fn test_late_dose_confirmed_after_midnight() {
        let (scheduler, push) = setup(at(10, 23, 35));
        let controls = scheduler.controls();
        let med = controls
            .add_medication("ana", "Amlodipine", "5 mg", vec![hm(23, 30)])
            .unwrap();
        assert_eq!(scheduler.tick().sent_count(Domain::Medication), 1);
        let handle = push
            .sent()
            .into_iter()
            .find(|s| s.notification.domain() == Domain::Medication)
            .map(|s| s.handle)
            .unwrap();

        scheduler.clock().set(at(11, 0, 15));
        let slot = controls.dose_slot("ana", med.id, hm(23, 30)).unwrap();
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert!(controls.confirm_medication_intake("ana", med.id, slot).unwrap());
        assert_eq!(push.removed(), vec![handle]);

        // Tonight's dose is still open and gets its own reminder
        scheduler.clock().set(at(11, 23, 35));
        assert_eq!(scheduler.tick().sent_count(Domain::Medication), 1);
    }

    #[test]
    fn test_unreminded_dose_resolves_to_latest_occurrence() {
        let (scheduler, _push) = setup(at(11, 0, 15));
        let controls = scheduler.controls();
        let med = controls
            .add_medication("ana", "Ramipril", "5 mg", vec![hm(0, 0), hm(23, 30)])
            .unwrap();

        let evening = controls.dose_slot("ana", med.id, hm(23, 30)).unwrap();
        assert_eq!(evening.date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        let midnight = controls.dose_slot("ana", med.id, hm(0, 0)).unwrap();
        assert_eq!(midnight.date, NaiveDate::from_ymd_opt(2024, 5, 11).unwrap());
    }

    #[test]
    fn test_snoozed_medication_is_reminded_again() {
        let (scheduler, _push) = setup(at(10, 8, 10));
        let controls = scheduler.controls();
        let med = controls
            .add_medication("ana", "Metformin", "500 mg", vec![hm(8, 0)])
            .unwrap();
        let slot = controls.dose_slot("ana", med.id, hm(8, 0)).unwrap();

        // Nothing to snooze before a reminder went out
        assert!(controls.snooze_medication("ana", med.id, slot, None).is_err());

        assert_eq!(scheduler.tick().sent_count(Domain::Medication), 1);
        controls.snooze_medication("ana", med.id, slot, Some(15)).unwrap();

        scheduler.clock().advance(Duration::minutes(10));
        assert_eq!(scheduler.tick().sent_count(Domain::Medication), 0);

        scheduler.clock().advance(Duration::minutes(10));
        assert_eq!(scheduler.tick().sent_count(Domain::Medication), 1);
    }

    #[test]
    fn test_rotation_advances_on_completion() {
        let now = at(10, 17, 30);
        let (scheduler, push) = setup(now);
        let controls = scheduler.controls();
        let group = controls
            .add_workout_group("ana", "Strength", vec![now.weekday()], hm(18, 0), 60, true)
            .unwrap();
        let a = controls
            .add_workout_variant("ana", group.id, "Push", vec!["bench".into()], Some(1))
            .unwrap();
        let b = controls
            .add_workout_variant("ana", group.id, "Pull", vec!["rows".into()], Some(2))
            .unwrap();

        scheduler.tick();
        let session = controls.next_workout("ana").unwrap().unwrap();
        assert_eq!(session.origin.variant_id(), Some(a.id));
        assert_eq!(session.status, SessionStatus::Notified);

        controls.start_session("ana", session.id).unwrap();
        assert_eq!(push.removed().len(), 1);
        assert_eq!(controls.complete_session("ana", session.id).unwrap(), Some(b.id));

        // Completing twice is an invalid transition
        assert!(controls.complete_session("ana", session.id).is_err());
        assert!(controls.next_workout("ana").unwrap().is_none());
        assert_eq!(controls.workout_history("ana").unwrap().len(), 1);
    }

    #[test]
    fn test_completed_session_with_stale_snooze_stays_done() {
        let now = at(10, 17, 30);
        let (scheduler, _push) = setup(now);
        let controls = scheduler.controls();
        controls
            .add_workout_group("ana", "Yoga", vec![now.weekday()], hm(18, 0), 60, false)
            .unwrap();
        scheduler.tick();

        let session = controls.next_workout("ana").unwrap().unwrap();
        controls.snooze_session("ana", session.id, Some(10)).unwrap();
        controls.start_session("ana", session.id).unwrap();
        assert_eq!(controls.complete_session("ana", session.id).unwrap(), None);

        scheduler.clock().advance(Duration::minutes(30));
        assert!(controls.next_workout("ana").unwrap().is_none());
        assert_eq!(scheduler.tick().sent_count(Domain::Workout), 0);
        assert!(controls.snooze_session("ana", session.id, None).is_err());
    }

    #[test]
    fn test_ad_hoc_session_lifecycle() {
        let (scheduler, _push) = setup(at(10, 7, 0));
        let controls = scheduler.controls();

        let id = controls.start_ad_hoc_session("ana", "Evening run").unwrap();
        let next = controls.next_workout("ana").unwrap().unwrap();
        assert_eq!(next.id, id);
        assert_eq!(next.status, SessionStatus::InProgress);

        assert_eq!(controls.complete_session("ana", id).unwrap(), None);
        let history = controls.workout_history("ana").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            controls.describe_session(&history[0]).unwrap(),
            ("Evening run".to_string(), None)
        );
    }

    #[test]
    fn test_summary_uses_day_weighting() {
        let (scheduler, _push) = setup(at(10, 12, 0));
        let controls = scheduler.controls();
        // Three readings on one day, one on another: each day counts once
        for (hour, kg) in [(6, 80.0), (12, 80.0), (18, 80.0)] {
            controls.record_weight("ana", kg, Some(at(8, hour, 0))).unwrap();
        }
        controls.record_weight("ana", 78.0, Some(at(9, 6, 0))).unwrap();

        let summary = controls.weight_summary("ana", &[14]).unwrap();
        let window = summary[0].1.as_ref().unwrap();
        assert_eq!(window.day_count, 2);
        assert_eq!(window.reading_count, 4);
        assert_eq!(window.rounded(0), Some(79));
    }
}
