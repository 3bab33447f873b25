//! The scheduler tick.
//!
//! One tick is a full synchronous pass over every configured user:
//! measurement reminders (blood pressure, weight), medication doses, then
//! workout sessions. State is read, the send is attempted, and the outcome is
//! written back in a separate step, so no store lock is ever held across a
//! channel call. A crash between send and write-back can duplicate a
//! reminder; it can never lose the "already sent" mark of a completed write.
//!
//! Failures are isolated per user and domain: they end up in the
//! [`TickReport`] and the log, and the rest of the tick carries on.

use crate::config::UserProfile;
use crate::control::ControlSurface;
use crate::eligibility::{self, Decision, Gate};
use crate::{
    medication, reminder, workout, Clock, Config, Dispatcher, Domain, Notification, Result,
    Store, UserId,
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

/// What happened during one tick
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub sent: Vec<(UserId, Domain)>,
    pub blocked: Vec<(UserId, Domain, Gate)>,
    /// Per user and domain failures, with their error text
    pub failures: Vec<(UserId, Domain, String)>,
    /// Individual channel failures absorbed by a successful fan-out
    pub channel_failures: usize,
}

impl TickReport {
    pub fn sent_count(&self, domain: Domain) -> usize {
        self.sent.iter().filter(|(_, d)| *d == domain).count()
    }

    pub fn gate_for(&self, user_id: &str, domain: Domain) -> Option<Gate> {
        self.blocked
            .iter()
            .find(|(u, d, _)| u == user_id && *d == domain)
            .map(|(_, _, gate)| *gate)
    }

    fn fail(&mut self, user_id: &str, domain: Domain, error: impl std::fmt::Display) {
        tracing::warn!("{} {} evaluation failed: {}", user_id, domain, error);
        self.failures.push((user_id.to_string(), domain, error.to_string()));
    }
}

/// Owns the store, clock and channels; holds no other mutable state
pub struct Scheduler<S, C> {
    store: S,
    clock: C,
    dispatcher: Dispatcher,
    config: Config,
}

impl<S: Store, C: Clock> Scheduler<S, C> {
    pub fn new(store: S, clock: C, dispatcher: Dispatcher, config: Config) -> Self {
        Self {
            store,
            clock,
            dispatcher,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// User-initiated operations against the same store and channels
    pub fn controls(&self) -> ControlSurface<'_, S, C> {
        ControlSurface::new(self)
    }

    /// Run one full pass over all users
    pub fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport {
            at: now,
            ..TickReport::default()
        };

        for user in &self.config.users {
            let offset = match user.offset() {
                Ok(offset) => offset,
                Err(e) => {
                    tracing::warn!("Skipping user {}: {}", user.id, e);
                    for domain in [Domain::BloodPressure, Domain::Weight, Domain::Medication, Domain::Workout] {
                        report.failures.push((user.id.clone(), domain, e.to_string()));
                    }
                    continue;
                }
            };

            for domain in Domain::MEASURED {
                if let Err(e) = self.remind_measurement(user, offset, domain, now, &mut report) {
                    report.fail(&user.id, domain, e);
                }
            }
            if let Err(e) = self.remind_medications(user, offset, now, &mut report) {
                report.fail(&user.id, Domain::Medication, e);
            }
            if let Err(e) = self.remind_workouts(user, offset, now, &mut report) {
                report.fail(&user.id, Domain::Workout, e);
            }
        }

        tracing::debug!(
            "Tick at {}: {} sent, {} blocked, {} failed",
            now,
            report.sent.len(),
            report.blocked.len(),
            report.failures.len()
        );
        report
    }

    fn remind_measurement(
        &self,
        user: &UserProfile,
        offset: FixedOffset,
        domain: Domain,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        let rules = self.config.rules_for(domain)?;
        let evaluation = self
            .store
            .read_strict(|db| eligibility::evaluate(db, &user.id, offset, domain, rules, now))??;

        if let Some(hour) = evaluation.hour_update {
            reminder::set_preferred_hour(&self.store, &user.id, domain, rules, hour)?;
        }

        let enhanced = match evaluation.decision {
            Decision::Blocked(gate) => {
                tracing::debug!("{} reminder for {} blocked: {}", domain, user.id, gate);
                report.blocked.push((user.id.clone(), domain, gate));
                return Ok(());
            }
            Decision::Send { enhanced } => enhanced,
        };

        let notification = match domain {
            Domain::BloodPressure => {
                Notification::blood_pressure(enhanced, evaluation.dominant, evaluation.latest)
            }
            _ => {
                let last = self
                    .store
                    .read(|db| db.latest_weight(&user.id).map(|w| w.weight_kg))?;
                Notification::weight(last)
            }
        };

        let delivery = self.dispatcher.dispatch(&user.id, &notification)?;
        report.channel_failures += delivery.failures.len();
        reminder::record_sent(&self.store, &user.id, domain, rules, now, delivery.handle)?;

        tracing::info!(
            "Sent {} reminder to {}{}",
            domain,
            user.display_name(),
            if enhanced { " (enhanced)" } else { "" }
        );
        report.sent.push((user.id.clone(), domain));
        Ok(())
    }

    fn remind_medications(
        &self,
        user: &UserProfile,
        offset: FixedOffset,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        let grace = Duration::minutes(self.config.medication.grace_minutes);
        let pending = self
            .store
            .read_strict(|db| medication::pending_reminders(db, &user.id, offset, now, grace))?;

        for (med, slot) in pending {
            let notification = Notification::medication(med.id, &med.name, &med.dosage, slot);
            let delivery = match self.dispatcher.dispatch(&user.id, &notification) {
                Ok(delivery) => delivery,
                Err(e) => {
                    report.fail(&user.id, Domain::Medication, e);
                    continue;
                }
            };
            report.channel_failures += delivery.failures.len();

            self.store.write(|db| {
                medication::record_sent(db, &user.id, med.id, slot, now, delivery.handle);
                Ok(())
            })?;
            tracing::info!("Sent {} reminder ({}) to {}", med.name, slot, user.display_name());
            report.sent.push((user.id.clone(), Domain::Medication));
        }
        Ok(())
    }

    fn remind_workouts(
        &self,
        user: &UserProfile,
        offset: FixedOffset,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        let lookahead = self.config.workout.lookahead_days;
        let sync = self
            .store
            .write(|db| Ok(workout::ensure_sessions(db, &user.id, offset, now, lookahead)))?;
        for (group_id, e) in sync.failures {
            report.fail(&user.id, Domain::Workout, format!("group {}: {}", group_id, e));
        }

        let due = self.store.read(|db| {
            workout::due_notifications(db, &user.id, now)
                .into_iter()
                .filter_map(|id| {
                    let session = db.session(&user.id, id).ok()?;
                    let (title, variant) = workout::describe(db, session);
                    Some((id, title, variant, session.scheduled_at))
                })
                .collect::<Vec<_>>()
        })?;

        for (session_id, title, variant, scheduled_at) in due {
            let notification = Notification::workout(session_id, &title, variant.as_deref(), scheduled_at);
            let delivery = match self.dispatcher.dispatch(&user.id, &notification) {
                Ok(delivery) => delivery,
                Err(e) => {
                    report.fail(&user.id, Domain::Workout, e);
                    continue;
                }
            };
            report.channel_failures += delivery.failures.len();

            if let Err(e) = self
                .store
                .write(|db| workout::mark_notified(db, &user.id, session_id, now, delivery.handle))
            {
                report.fail(&user.id, Domain::Workout, e);
                continue;
            }
            tracing::info!("Announced {} to {}", title, user.display_name());
            report.sent.push((user.id.clone(), Domain::Workout));
        }
        Ok(())
    }

    /// Tick every `scheduler.tick_seconds` until `shutdown` is set
    ///
    /// Ticks never overlap: a slow tick delays the next one.
    pub fn run_forever(&self, shutdown: &AtomicBool) {
        let interval = StdDuration::from_secs(self.config.scheduler.tick_seconds);
        tracing::info!(
            "Scheduler running every {}s for {} user(s)",
            interval.as_secs(),
            self.config.users.len()
        );

        while !shutdown.load(Ordering::SeqCst) {
            let report = self.tick();
            if !report.sent.is_empty() || !report.failures.is_empty() {
                tracing::info!(
                    "Tick: {} sent, {} failed",
                    report.sent.len(),
                    report.failures.len()
                );
            }

            let mut waited = StdDuration::ZERO;
            while waited < interval && !shutdown.load(Ordering::SeqCst) {
                let step = (interval - waited).min(StdDuration::from_secs(1));
                std::thread::sleep(step);
                waited += step;
            }
        }
        tracing::info!("Scheduler stopped");
    }
}
