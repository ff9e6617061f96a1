//src/store.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;
use uuid::Uuid;

use crate::status::Lane;
use crate::storage::{StorageBackend, StorageError};

/// Swelling level reported in a daily check-in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum Swelling {
    None,
    Mild,
    Moderate,
    Severe,
}

// Helper to parse a UI string into our Swelling enum
pub fn parse_swelling(swelling_str: &str) -> Result<Swelling, StoreError> {
    for level in Swelling::iter() {
        if format!("{level:?}").eq_ignore_ascii_case(swelling_str) {
            return Ok(level);
        }
    }
    Err(StoreError::InvalidSwelling(swelling_str.to_string()))
}

/// A single daily self-report of knee swelling and pain.
///
/// `swelling` is optional at the storage level: the command layer rejects a
/// save without it, but the store tolerates records that lack it (the status
/// engine then falls back to its caution default).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckIn {
    pub date: NaiveDate,
    #[serde(default)]
    pub swelling: Option<Swelling>,
    pub pain: i64,
    #[serde(default)]
    pub activity_level: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExerciseLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub exercise_id: String,
    pub exercise_name: String,
    pub sets_completed: i64,
    pub reps_per_set: i64,
    #[serde(default)]
    pub hold_time_seconds: Option<i64>,
    #[serde(default)]
    pub weight_used: Option<f64>,
    #[serde(default)]
    pub rpe: Option<i64>,
    #[serde(default)]
    pub pain: Option<i64>,
    #[serde(default)]
    pub lane: Option<Lane>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CustomWorkout {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub workout_category: String,
    pub workout_type: String,
    pub duration_minutes: i64,
    pub intensity: i64,
    #[serde(default)]
    pub knee_impact: Option<String>,
    #[serde(default)]
    pub lane: Option<Lane>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct SidePair {
    #[serde(default)]
    pub left: Option<f64>,
    #[serde(default)]
    pub right: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    #[serde(default)]
    pub knee_top_cm: SidePair,
    #[serde(default)]
    pub thigh_cm: SidePair,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub waist_cm: Option<f64>,
    #[serde(default)]
    pub weight_lb: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BodyMeasurement {
    pub date: NaiveDate,
    pub measurements: Measurements,
    #[serde(default)]
    pub posture: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Clinical red-flag markers attached to a significant event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedFlags {
    #[serde(default)]
    pub locking: bool,
    #[serde(default)]
    pub cant_bear_weight: bool,
    #[serde(default)]
    pub severe_swelling_7_days: bool,
    #[serde(default)]
    pub sudden_giving_way: bool,
}

impl RedFlags {
    #[must_use]
    pub const fn any(&self) -> bool {
        self.locking || self.cant_bear_weight || self.severe_swelling_7_days || self.sudden_giving_way
    }
}

/// An out-of-band symptom flare. The only entity supporting update/delete.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignificantEvent {
    pub id: Uuid,
    pub event_type: String,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub pain_level: Option<i64>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub red_flags: RedFlags,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreakCounters {
    pub current: u32,
    pub longest: u32,
}

// --- New-record parameter structs (id assignment belongs to the store) ---

#[derive(Debug, Clone, Default)]
pub struct NewExerciseLog {
    pub exercise_id: String,
    pub exercise_name: String,
    pub sets_completed: i64,
    pub reps_per_set: i64,
    pub hold_time_seconds: Option<i64>,
    pub weight_used: Option<f64>,
    pub rpe: Option<i64>,
    pub pain: Option<i64>,
    pub lane: Option<Lane>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCustomWorkout {
    pub workout_category: String,
    pub workout_type: String,
    pub duration_minutes: i64,
    pub intensity: i64,
    pub knee_impact: Option<String>,
    pub lane: Option<Lane>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSignificantEvent {
    pub event_type: String,
    pub pain_level: Option<i64>,
    pub activity: Option<String>,
    pub duration: Option<String>,
    pub resolution: Option<String>,
    pub notes: Option<String>,
    pub red_flags: RedFlags,
}

/// Field-wise patch for an existing significant event. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub event_type: Option<String>,
    pub pain_level: Option<i64>,
    pub activity: Option<String>,
    pub duration: Option<String>,
    pub resolution: Option<String>,
    pub notes: Option<String>,
    pub red_flags: Option<RedFlags>,
}

// Custom Error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Failed to serialize collection '{0}': {1}")]
    Serialize(&'static str, #[source] serde_json::Error),
    #[error("Significant event not found: ID {0}")]
    EventNotFound(Uuid),
    #[error("Invalid swelling level: {0}")]
    InvalidSwelling(String),
}

// Storage keys, one per collection plus the streak-counter scalar entry.
const KEY_CHECK_INS: &str = "check_ins";
const KEY_EXERCISE_LOGS: &str = "exercise_logs";
const KEY_CUSTOM_WORKOUTS: &str = "custom_workouts";
const KEY_BODY_MEASUREMENTS: &str = "body_measurements";
const KEY_SIGNIFICANT_EVENTS: &str = "significant_events";
const KEY_TRAINING_SESSIONS: &str = "training_sessions";
const KEY_STREAK_COUNTERS: &str = "streak_counters";

const SEQUENCE_KEYS: [&str; 6] = [
    KEY_CHECK_INS,
    KEY_EXERCISE_LOGS,
    KEY_CUSTOM_WORKOUTS,
    KEY_BODY_MEASUREMENTS,
    KEY_SIGNIFICANT_EVENTS,
    KEY_TRAINING_SESSIONS,
];

/// Durable CRUD over the journal's collections, backed by an injected
/// string-keyed storage medium.
///
/// Every write is a whole-collection read-modify-write; there is no partial
/// record update. Safe only under the single-writer assumption; two
/// processes sharing the same backing directory can lose writes.
pub struct PersistentStore {
    backend: Box<dyn StorageBackend>,
}

impl PersistentStore {
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Ensures every collection key exists, creating empty sequences (and
    /// zeroed streak counters) for missing keys. Idempotent; existing data
    /// is never touched.
    /// # Errors
    /// Returns `StoreError` if the backing medium cannot be written.
    pub fn init(&mut self) -> Result<(), StoreError> {
        for key in SEQUENCE_KEYS {
            if self.backend.read(key)?.is_none() {
                self.backend.write(key, "[]")?;
            }
        }
        if self.backend.read(KEY_STREAK_COUNTERS)?.is_none() {
            self.write_streak_counters(StreakCounters::default())?;
        }
        Ok(())
    }

    // Reads and deserializes a whole collection. A missing key or a corrupt
    // payload yields an empty sequence (fail open); only backend I/O errors
    // propagate.
    fn read_collection<T: DeserializeOwned>(&self, key: &'static str) -> Result<Vec<T>, StoreError> {
        let Some(raw) = self.backend.read(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                eprintln!("Warning: collection '{key}' is corrupt ({e}); treating as empty.");
                Ok(Vec::new())
            }
        }
    }

    fn write_collection<T: Serialize>(
        &mut self,
        key: &'static str,
        records: &[T],
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(records).map_err(|e| StoreError::Serialize(key, e))?;
        self.backend.write(key, &raw)?;
        Ok(())
    }

    // ---- Check-ins (upsert per calendar date) ----

    pub fn check_ins(&self) -> Result<Vec<CheckIn>, StoreError> {
        self.read_collection(KEY_CHECK_INS)
    }

    /// Inserts or replaces the check-in for `check_in.date`. A replaced
    /// record keeps its position in the sequence; there is never more than
    /// one check-in per calendar date.
    pub fn upsert_check_in(&mut self, check_in: CheckIn) -> Result<CheckIn, StoreError> {
        let mut records = self.check_ins()?;
        match records.iter_mut().find(|c| c.date == check_in.date) {
            Some(existing) => *existing = check_in.clone(),
            None => records.push(check_in.clone()),
        }
        self.write_collection(KEY_CHECK_INS, &records)?;
        Ok(check_in)
    }

    // ---- Exercise logs (append-only) ----

    pub fn exercise_logs(&self) -> Result<Vec<ExerciseLog>, StoreError> {
        self.read_collection(KEY_EXERCISE_LOGS)
    }

    pub fn append_exercise_log(
        &mut self,
        timestamp: DateTime<Utc>,
        data: NewExerciseLog,
    ) -> Result<ExerciseLog, StoreError> {
        let record = ExerciseLog {
            id: Uuid::new_v4(),
            timestamp,
            date: timestamp.date_naive(),
            exercise_id: data.exercise_id,
            exercise_name: data.exercise_name,
            sets_completed: data.sets_completed,
            reps_per_set: data.reps_per_set,
            hold_time_seconds: data.hold_time_seconds,
            weight_used: data.weight_used,
            rpe: data.rpe,
            pain: data.pain,
            lane: data.lane,
            notes: data.notes,
        };
        let mut records = self.exercise_logs()?;
        records.push(record.clone());
        self.write_collection(KEY_EXERCISE_LOGS, &records)?;
        Ok(record)
    }

    // ---- Custom workouts (append-only) ----

    pub fn custom_workouts(&self) -> Result<Vec<CustomWorkout>, StoreError> {
        self.read_collection(KEY_CUSTOM_WORKOUTS)
    }

    pub fn append_custom_workout(
        &mut self,
        timestamp: DateTime<Utc>,
        data: NewCustomWorkout,
    ) -> Result<CustomWorkout, StoreError> {
        let record = CustomWorkout {
            id: Uuid::new_v4(),
            timestamp,
            date: timestamp.date_naive(),
            workout_category: data.workout_category,
            workout_type: data.workout_type,
            duration_minutes: data.duration_minutes,
            intensity: data.intensity,
            knee_impact: data.knee_impact,
            lane: data.lane,
            notes: data.notes,
        };
        let mut records = self.custom_workouts()?;
        records.push(record.clone());
        self.write_collection(KEY_CUSTOM_WORKOUTS, &records)?;
        Ok(record)
    }

    // ---- Body measurements (append-only) ----

    pub fn body_measurements(&self) -> Result<Vec<BodyMeasurement>, StoreError> {
        self.read_collection(KEY_BODY_MEASUREMENTS)
    }

    pub fn append_body_measurement(
        &mut self,
        measurement: BodyMeasurement,
    ) -> Result<BodyMeasurement, StoreError> {
        let mut records = self.body_measurements()?;
        records.push(measurement.clone());
        self.write_collection(KEY_BODY_MEASUREMENTS, &records)?;
        Ok(measurement)
    }

    // ---- Significant events (create/update/delete) ----

    pub fn significant_events(&self) -> Result<Vec<SignificantEvent>, StoreError> {
        self.read_collection(KEY_SIGNIFICANT_EVENTS)
    }

    pub fn append_significant_event(
        &mut self,
        timestamp: DateTime<Utc>,
        data: NewSignificantEvent,
    ) -> Result<SignificantEvent, StoreError> {
        let record = SignificantEvent {
            id: Uuid::new_v4(),
            event_type: data.event_type,
            date: timestamp.date_naive(),
            timestamp,
            pain_level: data.pain_level,
            activity: data.activity,
            duration: data.duration,
            resolution: data.resolution,
            notes: data.notes,
            red_flags: data.red_flags,
        };
        let mut records = self.significant_events()?;
        records.push(record.clone());
        self.write_collection(KEY_SIGNIFICANT_EVENTS, &records)?;
        Ok(record)
    }

    /// Applies `patch` to the event with the given id, in place.
    /// # Errors
    /// Returns `StoreError::EventNotFound` if no event has that id.
    pub fn update_significant_event(
        &mut self,
        id: Uuid,
        patch: EventPatch,
    ) -> Result<SignificantEvent, StoreError> {
        let mut records = self.significant_events()?;
        let event = records
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::EventNotFound(id))?;

        if let Some(event_type) = patch.event_type {
            event.event_type = event_type;
        }
        if patch.pain_level.is_some() {
            event.pain_level = patch.pain_level;
        }
        if patch.activity.is_some() {
            event.activity = patch.activity;
        }
        if patch.duration.is_some() {
            event.duration = patch.duration;
        }
        if patch.resolution.is_some() {
            event.resolution = patch.resolution;
        }
        if patch.notes.is_some() {
            event.notes = patch.notes;
        }
        if let Some(red_flags) = patch.red_flags {
            event.red_flags = red_flags;
        }
        let updated = event.clone();
        self.write_collection(KEY_SIGNIFICANT_EVENTS, &records)?;
        Ok(updated)
    }

    /// # Errors
    /// Returns `StoreError::EventNotFound` if no event has that id.
    pub fn delete_significant_event(&mut self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.significant_events()?;
        let before = records.len();
        records.retain(|e| e.id != id);
        if records.len() == before {
            return Err(StoreError::EventNotFound(id));
        }
        self.write_collection(KEY_SIGNIFICANT_EVENTS, &records)
    }

    // ---- Training sessions (append-only) ----

    pub fn training_sessions(&self) -> Result<Vec<TrainingSession>, StoreError> {
        self.read_collection(KEY_TRAINING_SESSIONS)
    }

    pub fn append_training_session(
        &mut self,
        timestamp: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<TrainingSession, StoreError> {
        let record = TrainingSession {
            id: Uuid::new_v4(),
            timestamp,
            duration_seconds,
        };
        let mut records = self.training_sessions()?;
        records.push(record.clone());
        self.write_collection(KEY_TRAINING_SESSIONS, &records)?;
        Ok(record)
    }

    // ---- Streak counters (singleton scalar entry) ----

    pub fn streak_counters(&self) -> Result<StreakCounters, StoreError> {
        let Some(raw) = self.backend.read(KEY_STREAK_COUNTERS)? else {
            return Ok(StreakCounters::default());
        };
        match serde_json::from_str(&raw) {
            Ok(counters) => Ok(counters),
            Err(e) => {
                eprintln!("Warning: streak counters corrupt ({e}); resetting to zero.");
                Ok(StreakCounters::default())
            }
        }
    }

    pub fn write_streak_counters(&mut self, counters: StreakCounters) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&counters)
            .map_err(|e| StoreError::Serialize(KEY_STREAK_COUNTERS, e))?;
        self.backend.write(KEY_STREAK_COUNTERS, &raw)?;
        Ok(())
    }
}
