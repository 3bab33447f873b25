//! Persistence boundary.
//!
//! All entities live in a single serde [`Database`] document. A [`Store`]
//! hands out atomic read and write access to it; every write closure is one
//! transaction, which is how a session completion and its rotation advance
//! commit together.

use crate::{
    BloodPressureReading, Domain, DoseSlot, Error, Medication, MedicationIntake,
    MedicationReminder, ReminderState, Result, RotationState, SleepRecord, WeightReading,
    WorkoutGroup, WorkoutSession, WorkoutVariant,
};
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Every persisted entity, keyed by user ID inside each record
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Database {
    #[serde(default)]
    pub reminder_states: Vec<ReminderState>,
    #[serde(default)]
    pub blood_pressure: Vec<BloodPressureReading>,
    #[serde(default)]
    pub weight: Vec<WeightReading>,
    #[serde(default)]
    pub sleep: Vec<SleepRecord>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub intakes: Vec<MedicationIntake>,
    #[serde(default)]
    pub medication_reminders: Vec<MedicationReminder>,
    #[serde(default)]
    pub workout_groups: Vec<WorkoutGroup>,
    #[serde(default)]
    pub workout_variants: Vec<WorkoutVariant>,
    #[serde(default)]
    pub rotation_states: Vec<RotationState>,
    #[serde(default)]
    pub workout_sessions: Vec<WorkoutSession>,
}

impl Database {
    // ------------------------------------------------------------------
    // Reminder state
    // ------------------------------------------------------------------

    pub fn reminder_state(&self, user_id: &str, domain: Domain) -> Option<&ReminderState> {
        self.reminder_states
            .iter()
            .find(|s| s.user_id == user_id && s.domain == domain)
    }

    /// Fetch the record, creating it with defaults on first access
    pub fn reminder_state_mut(&mut self, user_id: &str, domain: Domain, default_hour: u32) -> &mut ReminderState {
        let idx = match self
            .reminder_states
            .iter()
            .position(|s| s.user_id == user_id && s.domain == domain)
        {
            Some(idx) => idx,
            None => {
                tracing::debug!("Creating {} reminder state for {}", domain, user_id);
                self.reminder_states
                    .push(ReminderState::new(user_id, domain, default_hour));
                self.reminder_states.len() - 1
            }
        };
        &mut self.reminder_states[idx]
    }

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    /// Blood-pressure readings in `[from, until]`, in insertion order
    pub fn blood_pressure_between(&self, user_id: &str, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<BloodPressureReading> {
        self.blood_pressure
            .iter()
            .filter(|r| r.user_id == user_id && r.measured_at >= from && r.measured_at <= until)
            .cloned()
            .collect()
    }

    pub fn weight_between(&self, user_id: &str, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<WeightReading> {
        self.weight
            .iter()
            .filter(|r| r.user_id == user_id && r.measured_at >= from && r.measured_at <= until)
            .cloned()
            .collect()
    }

    /// Most recent reading; later insertion wins identical timestamps
    pub fn latest_blood_pressure(&self, user_id: &str) -> Option<&BloodPressureReading> {
        self.blood_pressure
            .iter()
            .filter(|r| r.user_id == user_id)
            .fold(None, |best: Option<&BloodPressureReading>, r| match best {
                Some(b) if b.measured_at > r.measured_at => Some(b),
                _ => Some(r),
            })
    }

    pub fn latest_weight(&self, user_id: &str) -> Option<&WeightReading> {
        self.weight
            .iter()
            .filter(|r| r.user_id == user_id)
            .fold(None, |best: Option<&WeightReading>, r| match best {
                Some(b) if b.measured_at > r.measured_at => Some(b),
                _ => Some(r),
            })
    }

    /// Timestamps of a measured domain's readings in `[from, until]`
    pub fn reading_times(&self, user_id: &str, domain: Domain, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let in_range = |ts: &DateTime<Utc>| *ts >= from && *ts <= until;
        match domain {
            Domain::BloodPressure => self
                .blood_pressure
                .iter()
                .filter(|r| r.user_id == user_id && in_range(&r.measured_at))
                .map(|r| r.measured_at)
                .collect(),
            Domain::Weight => self
                .weight
                .iter()
                .filter(|r| r.user_id == user_id && in_range(&r.measured_at))
                .map(|r| r.measured_at)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn latest_reading_time(&self, user_id: &str, domain: Domain) -> Option<DateTime<Utc>> {
        match domain {
            Domain::BloodPressure => self.latest_blood_pressure(user_id).map(|r| r.measured_at),
            Domain::Weight => self.latest_weight(user_id).map(|r| r.measured_at),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Medication
    // ------------------------------------------------------------------

    pub fn medications_for(&self, user_id: &str) -> Vec<&Medication> {
        self.medications.iter().filter(|m| m.user_id == user_id).collect()
    }

    pub fn medication(&self, user_id: &str, medication_id: Uuid) -> Result<&Medication> {
        self.medications
            .iter()
            .find(|m| m.user_id == user_id && m.id == medication_id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", medication_id)))
    }

    pub fn intake_for(&self, medication_id: Uuid, slot: DoseSlot) -> Option<&MedicationIntake> {
        self.intakes
            .iter()
            .find(|i| i.medication_id == medication_id && i.slot == slot)
    }

    pub fn medication_reminder(&self, medication_id: Uuid, slot: DoseSlot) -> Option<&MedicationReminder> {
        self.medication_reminders
            .iter()
            .find(|r| r.medication_id == medication_id && r.slot == slot)
    }

    pub fn medication_reminder_mut(&mut self, medication_id: Uuid, slot: DoseSlot) -> Option<&mut MedicationReminder> {
        self.medication_reminders
            .iter_mut()
            .find(|r| r.medication_id == medication_id && r.slot == slot)
    }

    // ------------------------------------------------------------------
    // Workouts
    // ------------------------------------------------------------------

    pub fn groups_for(&self, user_id: &str) -> Vec<&WorkoutGroup> {
        self.workout_groups.iter().filter(|g| g.user_id == user_id).collect()
    }

    pub fn group(&self, group_id: Uuid) -> Option<&WorkoutGroup> {
        self.workout_groups.iter().find(|g| g.id == group_id)
    }

    /// Variants of a group in insertion order
    pub fn variants_for(&self, group_id: Uuid) -> Vec<WorkoutVariant> {
        self.workout_variants
            .iter()
            .filter(|v| v.group_id == group_id)
            .cloned()
            .collect()
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&WorkoutVariant> {
        self.workout_variants.iter().find(|v| v.id == variant_id)
    }

    pub fn rotation_state(&self, group_id: Uuid) -> Option<&RotationState> {
        self.rotation_states.iter().find(|r| r.group_id == group_id)
    }

    pub fn rotation_state_mut(&mut self, group_id: Uuid) -> &mut RotationState {
        let idx = match self.rotation_states.iter().position(|r| r.group_id == group_id) {
            Some(idx) => idx,
            None => {
                self.rotation_states.push(RotationState {
                    group_id,
                    current_variant_id: None,
                    last_advanced_on: None,
                });
                self.rotation_states.len() - 1
            }
        };
        &mut self.rotation_states[idx]
    }

    pub fn sessions_for(&self, user_id: &str) -> Vec<&WorkoutSession> {
        self.workout_sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .collect()
    }

    pub fn session(&self, user_id: &str, session_id: Uuid) -> Result<&WorkoutSession> {
        self.workout_sessions
            .iter()
            .find(|s| s.user_id == user_id && s.id == session_id)
            .ok_or_else(|| Error::NotFound(format!("workout session {}", session_id)))
    }

    pub fn session_mut(&mut self, user_id: &str, session_id: Uuid) -> Result<&mut WorkoutSession> {
        self.workout_sessions
            .iter_mut()
            .find(|s| s.user_id == user_id && s.id == session_id)
            .ok_or_else(|| Error::NotFound(format!("workout session {}", session_id)))
    }

    pub fn session_for_group_on(&self, group_id: Uuid, date: NaiveDate) -> Option<&WorkoutSession> {
        self.workout_sessions
            .iter()
            .find(|s| s.origin.group_id() == Some(group_id) && s.scheduled_date == date)
    }
}

/// Atomic access to the [`Database`]
pub trait Store: Send + Sync {
    /// Run `f` against a consistent snapshot
    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R;

    /// Like [`Store::read`], but an unreadable document is an error rather
    /// than an empty snapshot
    ///
    /// Callers that act on the absence of state (sending a reminder nobody
    /// has recorded yet) must use this.
    fn read_strict<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R,
    {
        self.read(f)
    }

    /// Run `f` as one transaction; nothing is persisted if it fails
    fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Database) -> Result<R>;
}

impl<S: Store> Store for &S {
    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R,
    {
        (**self).read(f)
    }

    fn read_strict<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R,
    {
        (**self).read_strict(f)
    }

    fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Database) -> Result<R>,
    {
        (**self).write(f)
    }
}

/// In-process store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    db: Mutex<Database>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl Store for MemoryStore {
    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R,
    {
        let guard = self
            .db
            .lock()
            .map_err(|_| Error::Store("database mutex poisoned".into()))?;
        Ok(f(&guard))
    }

    fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Database) -> Result<R>,
    {
        let mut guard = self
            .db
            .lock()
            .map_err(|_| Error::Store("database mutex poisoned".into()))?;
        // Work on a copy so a failed closure leaves no partial update behind
        let mut draft = guard.clone();
        let result = f(&mut draft)?;
        *guard = draft;
        Ok(result)
    }
}

/// JSON document on disk guarded by a sidecar lock file
///
/// Readers take a shared lock, writers an exclusive one for the whole
/// load-modify-save cycle. Saves go through a temp file, fsync and rename.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Read the document; `Ok(None)` means it exists but does not parse
    fn load_unlocked(&self) -> Result<Option<Database>> {
        if !self.path.exists() {
            tracing::debug!("No store file at {:?}, starting empty", self.path);
            return Ok(Some(Database::default()));
        }

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;

        match serde_json::from_str::<Database>(&contents) {
            Ok(db) => Ok(Some(db)),
            Err(e) => {
                tracing::warn!("Failed to parse store file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    fn unreadable(&self) -> Error {
        Error::Store(format!(
            "refusing to overwrite unreadable store file {:?}",
            self.path
        ))
    }

    fn save_unlocked(&self, db: &Database) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            Error::Store(format!("store path {:?} has no parent", self.path))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(db)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved store to {:?}", self.path);
        Ok(())
    }
}

impl Store for FileStore {
    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R,
    {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let loaded = self.load_unlocked();
        lock.unlock()?;

        // A corrupt document reads as empty so one bad file cannot stop every user
        let db = loaded?.unwrap_or_default();
        Ok(f(&db))
    }

    fn read_strict<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> R,
    {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let loaded = self.load_unlocked();
        lock.unlock()?;

        let db = loaded?.ok_or_else(|| self.unreadable())?;
        Ok(f(&db))
    }

    fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Database) -> Result<R>,
    {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let outcome = (|| {
            let mut db = self.load_unlocked()?.ok_or_else(|| self.unreadable())?;
            let result = f(&mut db)?;
            self.save_unlocked(&db)?;
            Ok(result)
        })();

        lock.unlock()?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weight_at(user: &str, hour: u32, kg: f64) -> WeightReading {
        WeightReading {
            id: Uuid::new_v4(),
            user_id: user.into(),
            measured_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            weight_kg: kg,
            note: None,
            exclude_from_calculation: false,
        }
    }

    #[test]
    fn test_reminder_state_created_lazily() {
        let mut db = Database::default();
        assert!(db.reminder_state("ana", Domain::Weight).is_none());

        db.reminder_state_mut("ana", Domain::Weight, 8).enabled = false;
        let state = db.reminder_state("ana", Domain::Weight).unwrap();
        assert!(!state.enabled);
        assert_eq!(state.preferred_reminder_hour, 8);

        // Second access reuses the record
        db.reminder_state_mut("ana", Domain::Weight, 8);
        assert_eq!(db.reminder_states.len(), 1);
    }

    #[test]
    fn test_latest_reading_prefers_later_insert_on_tie() {
        let mut db = Database::default();
        db.weight.push(weight_at("ana", 8, 70.0));
        db.weight.push(weight_at("ana", 8, 71.0));
        db.weight.push(weight_at("bob", 9, 90.0));
        assert_eq!(db.latest_weight("ana").unwrap().weight_kg, 71.0);
    }

    #[test]
    fn test_memory_store_rolls_back_failed_write() {
        let store = MemoryStore::new();
        let result: Result<()> = store.write(|db| {
            db.weight.push(weight_at("ana", 8, 70.0));
            Err(Error::Other("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|db| db.weight.len()).unwrap(), 0);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path().join("vitals.json"));

        store
            .write(|db| {
                db.weight.push(weight_at("ana", 8, 70.0));
                Ok(())
            })
            .unwrap();

        let reopened = FileStore::new(temp_dir.path().join("vitals.json"));
        assert_eq!(reopened.read(|db| db.weight.len()).unwrap(), 1);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path().join("nonexistent.json"));
        assert!(store.read(|db| db.weight.is_empty()).unwrap());
        assert!(store.read_strict(|db| db.weight.is_empty()).unwrap());
    }

    #[test]
    fn test_corrupt_file_reads_empty_but_is_not_clobbered() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("vitals.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        let store = FileStore::new(&path);
        assert!(store.read(|db| db.weight.is_empty()).unwrap());
        assert!(matches!(store.read_strict(|_| ()), Err(Error::Store(_))));

        let result = store.write(|db| {
            db.weight.push(weight_at("ana", 8, 70.0));
            Ok(())
        });
        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ invalid json }");
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path().join("vitals.json"));
        store.write(|_| Ok(())).unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "vitals.json" && e.file_name() != "vitals.lock")
            .collect();
        assert!(extras.is_empty(), "Expected only store files, found: {:?}", extras);
    }
}
