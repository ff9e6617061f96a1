use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// --- Declare modules ---
mod config;
pub mod status;
pub mod storage;
pub mod store;

// --- Expose public types ---
pub use config::{
    get_config_path as get_config_path_util,
    load_config as load_config_util,
    save_config as save_config_util,
    Config,
    Error as ConfigError,
};
pub use status::{
    classify, lane_description, recommended_lanes, status_message, KneeStatus, Lane, StatusMessage,
};
pub use storage::{get_data_dir as get_data_dir_util, FileStorage, MemoryStorage, StorageBackend};
pub use store::{
    parse_swelling, BodyMeasurement, CheckIn, CustomWorkout, EventPatch, ExerciseLog,
    Measurements, NewCustomWorkout, NewExerciseLog, NewSignificantEvent, PersistentStore,
    RedFlags, SidePair, SignificantEvent, StoreError, StreakCounters, Swelling, TrainingSession,
};

const CM_PER_INCH: f64 = 2.54;
const BMI_IMPERIAL_FACTOR: f64 = 703.0;

/// Input for a daily check-in save. `swelling` is an `Option` because the UI
/// may submit without a selection; the save rejects that case.
#[derive(Debug, Clone, Default)]
pub struct CheckInParams {
    pub date: NaiveDate,
    pub swelling: Option<Swelling>,
    pub pain: i64,
    pub activity_level: Option<String>,
    pub time_of_day: Option<String>,
    pub notes: Option<String>,
}

/// BMI and left/right knee circumference difference derived from the latest
/// body measurement. Each field is `None` when its inputs are missing.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedMetrics {
    pub bmi: Option<f64>,
    /// Left minus right, in cm. Positive means the left knee is larger.
    pub knee_diff_cm: Option<f64>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub average_pain: f64,
    pub swelling_days: usize,
    pub total_sessions: usize,
    pub window_days: u32,
}

/// Everything in the journal plus summary statistics, assembled for hand-off
/// to a clinician. Pure data; writing it to a file is the caller's concern.
#[derive(Serialize, Debug, Clone)]
pub struct ExportSnapshot {
    pub exported_at: DateTime<Utc>,
    pub check_ins: Vec<CheckIn>,
    pub exercise_logs: Vec<ExerciseLog>,
    pub custom_workouts: Vec<CustomWorkout>,
    pub body_measurements: Vec<BodyMeasurement>,
    pub significant_events: Vec<SignificantEvent>,
    pub training_sessions: Vec<TrainingSession>,
    pub streak: StreakCounters,
    pub summary: SummaryStats,
}

pub struct JournalService {
    pub config: Config,
    pub store: PersistentStore,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
}

impl JournalService {
    /// Initializes the journal service with file-backed storage.
    /// # Errors
    /// Returns `anyhow::Error` if config/data path determination, loading, or
    /// store initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load_config(&config_path)
            .context(format!("Failed to load config from {config_path:?}"))?;

        let data_dir = storage::get_data_dir().context("Failed to determine data directory")?;
        let backend = FileStorage::open(&data_dir)
            .with_context(|| format!("Failed to open storage at {data_dir:?}"))?;
        let mut store = PersistentStore::new(Box::new(backend));
        store.init().context("Failed to initialize collections")?;

        Ok(Self {
            config,
            store,
            config_path,
            data_dir,
        })
    }

    /// Builds a service over an arbitrary backend. Used by tests with
    /// `MemoryStorage`; also the seam for any future alternative medium.
    /// # Errors
    /// Returns `anyhow::Error` if store initialization fails.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: Config) -> Result<Self> {
        let mut store = PersistentStore::new(backend);
        store.init().context("Failed to initialize collections")?;
        Ok(Self {
            config,
            store,
            config_path: PathBuf::new(),
            data_dir: PathBuf::new(),
        })
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save_config(&self.config_path, &self.config)
    }

    /// Sets the required rest period between sessions, in hours.
    /// # Errors
    /// - `ConfigError::InvalidRestPeriod` if `hours` is not positive.
    /// - `ConfigError` variants if saving fails.
    pub fn set_rest_period_hours(&mut self, hours: f64) -> Result<(), ConfigError> {
        if hours <= 0.0 {
            return Err(ConfigError::InvalidRestPeriod(hours));
        }
        self.config.rest_period_hours = hours;
        self.save_config()
    }

    /// Sets the streak gap tolerance, in days.
    /// # Errors
    /// - `ConfigError::InvalidStreakTolerance` if `days` is not positive.
    /// - `ConfigError` variants if saving fails.
    pub fn set_streak_gap_tolerance(&mut self, days: f64) -> Result<(), ConfigError> {
        if days <= 0.0 {
            return Err(ConfigError::InvalidStreakTolerance(days));
        }
        self.config.streak_gap_tolerance_days = days;
        self.save_config()
    }

    // --- Commands ---

    /// Saves (or overwrites) the check-in for `params.date`. At most one
    /// check-in exists per calendar date.
    /// # Errors
    /// Returns `anyhow::Error` if no swelling level was selected, pain is out
    /// of range, or the write fails. Nothing is persisted on a validation
    /// failure.
    pub fn save_check_in(&mut self, params: CheckInParams) -> Result<CheckIn> {
        if params.swelling.is_none() {
            bail!("No swelling level selected.");
        }
        validate_scale("Pain", params.pain)?;

        let check_in = CheckIn {
            date: params.date,
            swelling: params.swelling,
            pain: params.pain,
            activity_level: params.activity_level,
            time_of_day: params.time_of_day,
            notes: params.notes,
        };
        self.store
            .upsert_check_in(check_in)
            .context("Failed to save check-in")
            .map_err(Into::into)
    }

    /// Appends an exercise log entry.
    /// # Errors
    /// Returns `anyhow::Error` if the exercise name is empty, a 0-10 scale
    /// value is out of range, or the write fails.
    pub fn save_exercise_log(
        &mut self,
        timestamp: DateTime<Utc>,
        data: NewExerciseLog,
    ) -> Result<ExerciseLog> {
        if data.exercise_name.trim().is_empty() {
            bail!("Exercise name cannot be empty.");
        }
        if let Some(rpe) = data.rpe {
            validate_scale("RPE", rpe)?;
        }
        if let Some(pain) = data.pain {
            validate_scale("Pain", pain)?;
        }
        self.store
            .append_exercise_log(timestamp, data)
            .context("Failed to save exercise log")
            .map_err(Into::into)
    }

    /// Appends a custom (non-library) workout entry.
    /// # Errors
    /// Returns `anyhow::Error` if the workout type is empty, intensity is out
    /// of range, duration is not positive, or the write fails.
    pub fn save_custom_workout(
        &mut self,
        timestamp: DateTime<Utc>,
        data: NewCustomWorkout,
    ) -> Result<CustomWorkout> {
        if data.workout_type.trim().is_empty() {
            bail!("Workout type cannot be empty.");
        }
        validate_scale("Intensity", data.intensity)?;
        if data.duration_minutes <= 0 {
            bail!("Workout duration must be positive.");
        }
        self.store
            .append_custom_workout(timestamp, data)
            .context("Failed to save custom workout")
            .map_err(Into::into)
    }

    /// Appends a body measurement entry.
    /// # Errors
    /// Returns `anyhow::Error` if any supplied measurement is not positive or
    /// the write fails.
    pub fn save_body_measurement(
        &mut self,
        measurement: BodyMeasurement,
    ) -> Result<BodyMeasurement> {
        let m = &measurement.measurements;
        let values = [
            m.knee_top_cm.left,
            m.knee_top_cm.right,
            m.thigh_cm.left,
            m.thigh_cm.right,
            m.height_cm,
            m.waist_cm,
            m.weight_lb,
        ];
        if values.iter().flatten().any(|&v| v <= 0.0) {
            bail!("Measurements must be positive numbers.");
        }
        self.store
            .append_body_measurement(measurement)
            .context("Failed to save body measurement")
            .map_err(Into::into)
    }

    /// Records a significant event (symptom flare).
    /// # Errors
    /// Returns `anyhow::Error` if the event type is empty, pain level is out
    /// of range, or the write fails.
    pub fn save_significant_event(
        &mut self,
        timestamp: DateTime<Utc>,
        data: NewSignificantEvent,
    ) -> Result<SignificantEvent> {
        if data.event_type.trim().is_empty() {
            bail!("Event type cannot be empty.");
        }
        if let Some(pain) = data.pain_level {
            validate_scale("Pain", pain)?;
        }
        self.store
            .append_significant_event(timestamp, data)
            .context("Failed to save significant event")
            .map_err(Into::into)
    }

    /// Updates a significant event in place.
    /// # Errors
    /// Returns `StoreError::EventNotFound` (wrapped) if the id is unknown.
    pub fn update_event(&mut self, id: Uuid, patch: EventPatch) -> Result<SignificantEvent> {
        if let Some(pain) = patch.pain_level {
            validate_scale("Pain", pain)?;
        }
        self.store
            .update_significant_event(id, patch)
            .map_err(|e| match e {
                StoreError::EventNotFound(_) => anyhow::anyhow!(e),
                _ => anyhow::Error::new(e).context(format!("Failed to update event {id}")),
            })
    }

    /// Deletes a significant event.
    /// # Errors
    /// Returns `StoreError::EventNotFound` (wrapped) if the id is unknown.
    pub fn delete_event(&mut self, id: Uuid) -> Result<()> {
        self.store
            .delete_significant_event(id)
            .map_err(|e| match e {
                StoreError::EventNotFound(_) => anyhow::anyhow!(e),
                _ => anyhow::Error::new(e).context(format!("Failed to delete event {id}")),
            })
    }

    /// Records a completed training session and recomputes the stored streak
    /// counters from the full session history.
    /// # Errors
    /// Returns `anyhow::Error` if the duration is negative or a write fails.
    pub fn save_session(
        &mut self,
        timestamp: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<TrainingSession> {
        if duration_seconds < 0 {
            bail!("Session duration cannot be negative.");
        }
        let session = self
            .store
            .append_training_session(timestamp, duration_seconds)
            .context("Failed to save training session")?;

        let dates = self.session_dates()?;
        let (current, longest) =
            calculate_streaks(&dates, self.config.streak_gap_tolerance_days);
        let counters = StreakCounters {
            current,
            longest: longest.max(self.store.streak_counters()?.longest),
        };
        self.store
            .write_streak_counters(counters)
            .context("Failed to update streak counters")?;
        Ok(session)
    }

    // --- Status queries ---

    /// Retrieves the check-in for a specific date, if any.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_check_in(&self, date: NaiveDate) -> Result<Option<CheckIn>> {
        let check_ins = self.store.check_ins().context("Failed to read check-ins")?;
        Ok(check_ins.into_iter().find(|c| c.date == date))
    }

    /// Today's knee status. Recomputed fresh on every call; `Unknown` when no
    /// check-in exists for today.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_knee_status(&self) -> Result<KneeStatus> {
        let todays = self.get_check_in(today())?;
        Ok(status::classify(todays.as_ref()))
    }

    /// The status message bundle for today's status.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_knee_status_message(&self) -> Result<StatusMessage> {
        Ok(status::status_message(self.get_knee_status()?))
    }

    /// Allowed lanes for today's status, in preference order. Empty when no
    /// check-in exists yet.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_recommended_lanes(&self) -> Result<&'static [Lane]> {
        Ok(status::recommended_lanes(self.get_knee_status()?))
    }

    #[must_use]
    pub const fn get_lane_description(&self, lane: Lane) -> &'static str {
        status::lane_description(lane)
    }

    // --- Aggregation queries ---

    /// Check-ins within `[today - days, today]` inclusive, newest first.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_recent_check_ins(&self, days: u32) -> Result<Vec<CheckIn>> {
        let today = today();
        let cutoff = today - Duration::days(i64::from(days));
        let mut records: Vec<CheckIn> = self
            .store
            .check_ins()
            .context("Failed to read check-ins")?
            .into_iter()
            .filter(|c| c.date >= cutoff && c.date <= today)
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(records)
    }

    /// All exercise logs, insertion order.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_exercise_logs(&self) -> Result<Vec<ExerciseLog>> {
        self.store
            .exercise_logs()
            .context("Failed to read exercise logs")
            .map_err(Into::into)
    }

    /// Logs for one exercise within the date window, newest first.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_exercise_history(&self, exercise_id: &str, days: u32) -> Result<Vec<ExerciseLog>> {
        let cutoff = today() - Duration::days(i64::from(days));
        let mut records: Vec<ExerciseLog> = self
            .get_exercise_logs()?
            .into_iter()
            .filter(|l| l.exercise_id == exercise_id && l.date >= cutoff)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_todays_exercise_logs(&self) -> Result<Vec<ExerciseLog>> {
        let today = today();
        Ok(self
            .get_exercise_logs()?
            .into_iter()
            .filter(|l| l.date == today)
            .collect())
    }

    /// All custom workouts, insertion order.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_custom_workouts(&self) -> Result<Vec<CustomWorkout>> {
        self.store
            .custom_workouts()
            .context("Failed to read custom workouts")
            .map_err(Into::into)
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_todays_custom_workouts(&self) -> Result<Vec<CustomWorkout>> {
        let today = today();
        Ok(self
            .get_custom_workouts()?
            .into_iter()
            .filter(|w| w.date == today)
            .collect())
    }

    /// Consecutive-day session streak, walking backward from the most recent
    /// session date. Always recomputed from the session history; the stored
    /// counters are a cache for the presentation layer.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_current_streak(&self) -> Result<u32> {
        let dates = self.session_dates()?;
        Ok(calculate_streaks(&dates, self.config.streak_gap_tolerance_days).0)
    }

    /// Whether enough rest has elapsed since the last session. True when no
    /// session has ever been recorded.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn can_train(&self) -> Result<bool> {
        Ok(self.hours_until_ready()? <= 0.0)
    }

    /// Hours remaining until the rest period is satisfied; 0 when ready.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    #[allow(clippy::cast_precision_loss)]
    pub fn hours_until_ready(&self) -> Result<f64> {
        let sessions = self
            .store
            .training_sessions()
            .context("Failed to read training sessions")?;
        let Some(last) = sessions.iter().map(|s| s.timestamp).max() else {
            return Ok(0.0);
        };
        let elapsed_hours = (Utc::now() - last).num_seconds() as f64 / 3600.0;
        Ok((self.config.rest_period_hours - elapsed_hours).max(0.0))
    }

    /// The most recent body measurement by date (ties go to the latest
    /// inserted), or `None` if none recorded.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_latest_body_measurement(&self) -> Result<Option<BodyMeasurement>> {
        let records = self
            .store
            .body_measurements()
            .context("Failed to read body measurements")?;
        Ok(records.into_iter().max_by_key(|m| m.date))
    }

    /// BMI and knee circumference difference from the latest measurement.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_derived_metrics(&self) -> Result<DerivedMetrics> {
        let Some(latest) = self.get_latest_body_measurement()? else {
            return Ok(DerivedMetrics::default());
        };
        let m = latest.measurements;
        let bmi = match (m.weight_lb, m.height_cm) {
            (Some(lb), Some(cm)) => calculate_bmi(lb, cm),
            _ => None,
        };
        let knee_diff_cm = match (m.knee_top_cm.left, m.knee_top_cm.right) {
            (Some(left), Some(right)) => Some(left - right),
            _ => None,
        };
        Ok(DerivedMetrics { bmi, knee_diff_cm })
    }

    /// Significant events within the date window, newest first.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn get_significant_events(&self, days: u32) -> Result<Vec<SignificantEvent>> {
        let cutoff = today() - Duration::days(i64::from(days));
        let mut records: Vec<SignificantEvent> = self
            .store
            .significant_events()
            .context("Failed to read significant events")?
            .into_iter()
            .filter(|e| e.date >= cutoff)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Assembles the full export snapshot: every collection plus summary
    /// statistics over the configured window.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    #[allow(clippy::cast_precision_loss)]
    pub fn export_data(&self) -> Result<ExportSnapshot> {
        let window_days = self.config.summary_window_days;
        let recent = self.get_recent_check_ins(window_days)?;
        let average_pain = if recent.is_empty() {
            0.0
        } else {
            let total: i64 = recent.iter().map(|c| c.pain.max(0)).sum();
            total as f64 / recent.len() as f64
        };
        let swelling_days = recent
            .iter()
            .filter(|c| !matches!(c.swelling, None | Some(Swelling::None)))
            .count();
        let training_sessions = self
            .store
            .training_sessions()
            .context("Failed to read training sessions")?;

        Ok(ExportSnapshot {
            exported_at: Utc::now(),
            check_ins: self.store.check_ins().context("Failed to read check-ins")?,
            exercise_logs: self.get_exercise_logs()?,
            custom_workouts: self.get_custom_workouts()?,
            body_measurements: self
                .store
                .body_measurements()
                .context("Failed to read body measurements")?,
            significant_events: self
                .store
                .significant_events()
                .context("Failed to read significant events")?,
            summary: SummaryStats {
                average_pain,
                swelling_days,
                total_sessions: training_sessions.len(),
                window_days,
            },
            training_sessions,
            streak: self
                .store
                .streak_counters()
                .context("Failed to read streak counters")?,
        })
    }

    fn session_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .store
            .training_sessions()
            .context("Failed to read training sessions")?
            .iter()
            .map(|s| s.timestamp.date_naive())
            .collect();
        dates.sort_unstable();
        Ok(dates)
    }
}

// --- Helper Functions ---

// Calendar "today". UTC keeps it consistent with the dates the store
// derives from record timestamps.
fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn validate_scale(name: &str, value: i64) -> Result<()> {
    if !(0..=10).contains(&value) {
        bail!("{name} must be between 0 and 10, got {value}.");
    }
    Ok(())
}

/// Metric BMI from imperial weight and metric height (703 × lb / in²).
#[must_use]
pub fn calculate_bmi(weight_lb: f64, height_cm: f64) -> Option<f64> {
    if weight_lb > 0.0 && height_cm > 0.0 {
        let height_in = height_cm / CM_PER_INCH;
        Some(BMI_IMPERIAL_FACTOR * weight_lb / (height_in * height_in))
    } else {
        None
    }
}

/// Calculates (current, longest) consecutive-day streaks over sorted session
/// dates. A gap of up to `tolerance_days` between distinct dates keeps the
/// streak alive; duplicate dates (same-day double-logging) are skipped. The
/// current streak is the run ending at the most recent session date; it does
/// not require that date to be today.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_streaks(dates: &[NaiveDate], tolerance_days: f64) -> (u32, u32) {
    if dates.is_empty() {
        return (0, 0);
    }
    let mut current = 1u32;
    let mut longest = 1u32;
    let mut last_date = dates[0];

    for &date in &dates[1..] {
        if date == last_date {
            continue;
        } // Skip same day
        let gap = (date - last_date).num_days() as f64;
        if gap <= tolerance_days {
            current += 1;
        } else {
            current = 1;
        } // Broken, start new
        last_date = date;
        longest = longest.max(current);
    }
    (current, longest)
}
