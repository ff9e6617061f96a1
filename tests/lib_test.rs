use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use knee_journal_lib::{
    calculate_bmi, calculate_streaks, classify, parse_swelling, recommended_lanes, status_message,
    BodyMeasurement, CheckIn, CheckInParams, Config, EventPatch, FileStorage, JournalService,
    KneeStatus, Lane, Measurements, MemoryStorage, NewCustomWorkout, NewExerciseLog,
    NewSignificantEvent, RedFlags, SidePair, StorageBackend, Swelling,
};
use uuid::Uuid;

// Helper function to create a test service with in-memory storage
fn create_test_service() -> Result<JournalService> {
    let backend = MemoryStorage::new();
    let config = Config {
        rest_period_hours: 6.0,
        streak_gap_tolerance_days: 1.5,
        summary_window_days: 30,
    };
    JournalService::with_backend(Box::new(backend), config)
}

fn check_in(swelling: Option<Swelling>, pain: i64) -> CheckIn {
    CheckIn {
        date: Utc::now().date_naive(),
        swelling,
        pain,
        activity_level: None,
        time_of_day: None,
        notes: None,
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[test]
fn test_classify_red_rules() {
    // Severe swelling is red at any pain level
    for pain in 0..=10 {
        assert_eq!(
            classify(Some(&check_in(Some(Swelling::Severe), pain))),
            KneeStatus::Red
        );
    }
    // Moderate swelling goes red only from pain 6 upward
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Moderate), 6))),
        KneeStatus::Red
    );
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Moderate), 10))),
        KneeStatus::Red
    );
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Moderate), 5))),
        KneeStatus::Yellow
    );
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Moderate), 0))),
        KneeStatus::Yellow
    );
}

#[test]
fn test_classify_green_and_yellow_rules() {
    // Swelling "none" is green regardless of the pain value supplied;
    // first-match-wins semantics, preserved deliberately.
    for pain in 0..=10 {
        assert_eq!(
            classify(Some(&check_in(Some(Swelling::None), pain))),
            KneeStatus::Green
        );
    }
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Mild), 2))),
        KneeStatus::Green
    );
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Mild), 3))),
        KneeStatus::Yellow
    );
    assert_eq!(
        classify(Some(&check_in(Some(Swelling::Mild), 7))),
        KneeStatus::Yellow
    );
}

#[test]
fn test_classify_fallback_and_unknown() {
    // Missing swelling with mid-range pain reaches the fail-safe default
    assert_eq!(classify(Some(&check_in(None, 3))), KneeStatus::Yellow);
    assert_eq!(classify(Some(&check_in(None, 5))), KneeStatus::Yellow);
    // No check-in at all is a distinct fourth state
    assert_eq!(classify(None), KneeStatus::Unknown);
}

#[test]
fn test_lane_recommendations() {
    assert_eq!(
        recommended_lanes(KneeStatus::Green),
        &[Lane::Build, Lane::Prime, Lane::Calm]
    );
    assert_eq!(
        recommended_lanes(KneeStatus::Yellow),
        &[Lane::Calm, Lane::Build]
    );
    assert_eq!(recommended_lanes(KneeStatus::Red), &[Lane::Calm]);
    assert!(recommended_lanes(KneeStatus::Unknown).is_empty());
}

#[test]
fn test_status_messages_distinct_per_status() {
    let titles: Vec<&str> = [
        KneeStatus::Unknown,
        KneeStatus::Green,
        KneeStatus::Yellow,
        KneeStatus::Red,
    ]
    .iter()
    .map(|&s| status_message(s).title)
    .collect();
    for (i, a) in titles.iter().enumerate() {
        for b in &titles[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_parse_swelling_strings() {
    assert_eq!(parse_swelling("none").unwrap(), Swelling::None);
    assert_eq!(parse_swelling("Mild").unwrap(), Swelling::Mild);
    assert_eq!(parse_swelling("MODERATE").unwrap(), Swelling::Moderate);
    assert_eq!(parse_swelling("severe").unwrap(), Swelling::Severe);
    let err = parse_swelling("puffy").unwrap_err();
    assert!(err.to_string().contains("Invalid swelling level"));
}

#[test]
fn test_save_check_in_requires_swelling() -> Result<()> {
    let mut service = create_test_service()?;
    let result = service.save_check_in(CheckInParams {
        date: today(),
        swelling: None,
        pain: 2,
        ..Default::default()
    });
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("No swelling level selected"));
    // Nothing was persisted
    assert!(service.get_check_in(today())?.is_none());
    Ok(())
}

#[test]
fn test_save_check_in_rejects_out_of_range_pain() -> Result<()> {
    let mut service = create_test_service()?;
    let result = service.save_check_in(CheckInParams {
        date: today(),
        swelling: Some(Swelling::Mild),
        pain: 11,
        ..Default::default()
    });
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("between 0 and 10"));
    Ok(())
}

#[test]
fn test_check_in_upsert_is_idempotent_per_date() -> Result<()> {
    let mut service = create_test_service()?;

    service.save_check_in(CheckInParams {
        date: today(),
        swelling: Some(Swelling::Mild),
        pain: 2,
        ..Default::default()
    })?;
    assert_eq!(service.get_knee_status()?, KneeStatus::Green);

    // Second save on the same date overwrites; never duplicates
    service.save_check_in(CheckInParams {
        date: today(),
        swelling: Some(Swelling::Mild),
        pain: 5,
        notes: Some("flared up after stairs".to_string()),
        ..Default::default()
    })?;
    assert_eq!(service.get_knee_status()?, KneeStatus::Yellow);

    let recent = service.get_recent_check_ins(7)?;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].pain, 5);
    assert_eq!(recent[0].notes.as_deref(), Some("flared up after stairs"));
    Ok(())
}

#[test]
fn test_status_unknown_without_check_in() -> Result<()> {
    let service = create_test_service()?;
    assert_eq!(service.get_knee_status()?, KneeStatus::Unknown);
    assert!(service.get_recommended_lanes()?.is_empty());
    assert_eq!(
        service.get_knee_status_message()?.title,
        status_message(KneeStatus::Unknown).title
    );
    Ok(())
}

#[test]
fn test_recent_check_ins_window_and_order() -> Result<()> {
    let mut service = create_test_service()?;
    for days_ago in [0i64, 1, 3, 9] {
        service.save_check_in(CheckInParams {
            date: today() - Duration::days(days_ago),
            swelling: Some(Swelling::None),
            pain: 0,
            ..Default::default()
        })?;
    }

    let recent = service.get_recent_check_ins(7)?;
    assert_eq!(recent.len(), 3); // the 9-day-old entry falls outside the window
    assert_eq!(recent[0].date, today()); // newest first
    assert_eq!(recent[1].date, today() - Duration::days(1));
    assert_eq!(recent[2].date, today() - Duration::days(3));
    Ok(())
}

#[test]
fn test_exercise_logs_and_history() -> Result<()> {
    let mut service = create_test_service()?;

    let log = service.save_exercise_log(
        Utc::now(),
        NewExerciseLog {
            exercise_id: "wall_sit".to_string(),
            exercise_name: "Wall Sit".to_string(),
            sets_completed: 3,
            reps_per_set: 1,
            hold_time_seconds: Some(45),
            rpe: Some(6),
            pain: Some(1),
            lane: Some(Lane::Build),
            ..Default::default()
        },
    )?;
    assert_eq!(log.date, today());

    service.save_exercise_log(
        Utc::now() - Duration::days(2),
        NewExerciseLog {
            exercise_id: "wall_sit".to_string(),
            exercise_name: "Wall Sit".to_string(),
            sets_completed: 2,
            reps_per_set: 1,
            ..Default::default()
        },
    )?;
    service.save_exercise_log(
        Utc::now(),
        NewExerciseLog {
            exercise_id: "step_up".to_string(),
            exercise_name: "Step Up".to_string(),
            sets_completed: 3,
            reps_per_set: 8,
            ..Default::default()
        },
    )?;

    assert_eq!(service.get_exercise_logs()?.len(), 3);
    assert_eq!(service.get_todays_exercise_logs()?.len(), 2);

    let history = service.get_exercise_history("wall_sit", 7)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, log.id); // newest first
    assert!(history.iter().all(|l| l.exercise_id == "wall_sit"));

    // Window filter excludes old entries
    let history = service.get_exercise_history("wall_sit", 1)?;
    assert_eq!(history.len(), 1);
    Ok(())
}

#[test]
fn test_exercise_log_validation() -> Result<()> {
    let mut service = create_test_service()?;
    let result = service.save_exercise_log(
        Utc::now(),
        NewExerciseLog {
            exercise_id: "x".to_string(),
            exercise_name: "  ".to_string(),
            ..Default::default()
        },
    );
    assert!(result.is_err());

    let result = service.save_exercise_log(
        Utc::now(),
        NewExerciseLog {
            exercise_id: "x".to_string(),
            exercise_name: "Leg Press".to_string(),
            rpe: Some(15),
            ..Default::default()
        },
    );
    assert!(result.is_err());
    assert!(service.get_exercise_logs()?.is_empty());
    Ok(())
}

#[test]
fn test_custom_workouts() -> Result<()> {
    let mut service = create_test_service()?;
    service.save_custom_workout(
        Utc::now(),
        NewCustomWorkout {
            workout_category: "cardio".to_string(),
            workout_type: "Stationary Bike".to_string(),
            duration_minutes: 20,
            intensity: 4,
            knee_impact: Some("low".to_string()),
            lane: Some(Lane::Calm),
            ..Default::default()
        },
    )?;
    service.save_custom_workout(
        Utc::now() - Duration::days(1),
        NewCustomWorkout {
            workout_category: "cardio".to_string(),
            workout_type: "Swimming".to_string(),
            duration_minutes: 30,
            intensity: 5,
            ..Default::default()
        },
    )?;

    assert_eq!(service.get_custom_workouts()?.len(), 2);
    let todays = service.get_todays_custom_workouts()?;
    assert_eq!(todays.len(), 1);
    assert_eq!(todays[0].workout_type, "Stationary Bike");

    // Zero duration is rejected
    let result = service.save_custom_workout(
        Utc::now(),
        NewCustomWorkout {
            workout_category: "cardio".to_string(),
            workout_type: "Rowing".to_string(),
            duration_minutes: 0,
            intensity: 3,
            ..Default::default()
        },
    );
    assert!(result.is_err());
    Ok(())
}

fn measurement(date: NaiveDate, m: Measurements) -> BodyMeasurement {
    BodyMeasurement {
        date,
        measurements: m,
        posture: None,
        notes: None,
    }
}

#[test]
fn test_body_measurements_and_derived_metrics() -> Result<()> {
    let mut service = create_test_service()?;

    service.save_body_measurement(measurement(
        today() - Duration::days(10),
        Measurements {
            knee_top_cm: SidePair {
                left: Some(40.0),
                right: Some(39.0),
            },
            height_cm: Some(170.0),
            weight_lb: Some(160.0),
            ..Default::default()
        },
    ))?;
    service.save_body_measurement(measurement(
        today(),
        Measurements {
            knee_top_cm: SidePair {
                left: Some(39.5),
                right: Some(38.0),
            },
            thigh_cm: SidePair {
                left: Some(52.0),
                right: Some(53.0),
            },
            height_cm: Some(170.0),
            weight_lb: Some(154.0),
            ..Default::default()
        },
    ))?;

    let latest = service.get_latest_body_measurement()?.unwrap();
    assert_eq!(latest.date, today());

    let metrics = service.get_derived_metrics()?;
    let expected_bmi = calculate_bmi(154.0, 170.0).unwrap();
    assert!((metrics.bmi.unwrap() - expected_bmi).abs() < 1e-9);
    assert!((expected_bmi - 24.17).abs() < 0.05); // sanity: 703 * lb / in^2
    assert!((metrics.knee_diff_cm.unwrap() - 1.5).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_derived_metrics_missing_inputs() -> Result<()> {
    let mut service = create_test_service()?;

    // No measurements at all
    let metrics = service.get_derived_metrics()?;
    assert!(metrics.bmi.is_none());
    assert!(metrics.knee_diff_cm.is_none());

    // Knee girths only: diff available, BMI not
    service.save_body_measurement(measurement(
        today(),
        Measurements {
            knee_top_cm: SidePair {
                left: Some(40.0),
                right: Some(40.5),
            },
            ..Default::default()
        },
    ))?;
    let metrics = service.get_derived_metrics()?;
    assert!(metrics.bmi.is_none());
    assert!((metrics.knee_diff_cm.unwrap() + 0.5).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_body_measurement_rejects_nonpositive_values() -> Result<()> {
    let mut service = create_test_service()?;
    let result = service.save_body_measurement(measurement(
        today(),
        Measurements {
            height_cm: Some(-170.0),
            ..Default::default()
        },
    ));
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_significant_event_lifecycle() -> Result<()> {
    let mut service = create_test_service()?;

    let event = service.save_significant_event(
        Utc::now(),
        NewSignificantEvent {
            event_type: "giving_way".to_string(),
            pain_level: Some(7),
            activity: Some("descending stairs".to_string()),
            red_flags: RedFlags {
                sudden_giving_way: true,
                ..Default::default()
            },
            ..Default::default()
        },
    )?;

    let events = service.get_significant_events(7)?;
    assert_eq!(events.len(), 1);
    assert!(events[0].red_flags.sudden_giving_way);
    assert!(events[0].red_flags.any());
    assert!(!RedFlags::default().any());

    // Update in place
    let updated = service.update_event(
        event.id,
        EventPatch {
            resolution: Some("settled after ice and rest".to_string()),
            pain_level: Some(3),
            ..Default::default()
        },
    )?;
    assert_eq!(updated.pain_level, Some(3));
    assert_eq!(
        updated.resolution.as_deref(),
        Some("settled after ice and rest")
    );
    // Untouched fields survive the patch
    assert_eq!(updated.activity.as_deref(), Some("descending stairs"));
    assert_eq!(service.get_significant_events(7)?.len(), 1);

    // Delete
    service.delete_event(event.id)?;
    assert!(service.get_significant_events(7)?.is_empty());
    Ok(())
}

#[test]
fn test_event_update_delete_unknown_id() -> Result<()> {
    let mut service = create_test_service()?;
    let missing = Uuid::new_v4();

    let result = service.update_event(missing, EventPatch::default());
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("not found"));

    let result = service.delete_event(missing);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("not found"));
    Ok(())
}

#[test]
fn test_streak_consecutive_days() -> Result<()> {
    let mut service = create_test_service()?;
    let now = Utc::now();
    for days_ago in [2i64, 1, 0] {
        service.save_session(now - Duration::days(days_ago), 1800)?;
    }
    assert_eq!(service.get_current_streak()?, 3);
    Ok(())
}

#[test]
fn test_streak_breaks_on_gap() -> Result<()> {
    let mut service = create_test_service()?;
    let now = Utc::now();
    // Two consecutive days, then a 3-day gap, then today
    service.save_session(now - Duration::days(4), 1200)?;
    service.save_session(now - Duration::days(3), 1200)?;
    service.save_session(now, 1200)?;

    assert_eq!(service.get_current_streak()?, 1);
    // Longest streak survives in the persisted counters
    let snapshot = service.export_data()?;
    assert_eq!(snapshot.streak.current, 1);
    assert_eq!(snapshot.streak.longest, 2);
    Ok(())
}

#[test]
fn test_streak_same_day_double_logging() -> Result<()> {
    let mut service = create_test_service()?;
    let now = Utc::now();
    service.save_session(now - Duration::days(1), 600)?;
    service.save_session(now - Duration::hours(2), 600)?;
    service.save_session(now, 600)?; // second session today
    assert_eq!(service.get_current_streak()?, 2);
    Ok(())
}

#[test]
fn test_calculate_streaks_tolerance() {
    let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
    assert_eq!(calculate_streaks(&[], 1.5), (0, 0));
    assert_eq!(calculate_streaks(&[d("2026-03-01")], 1.5), (1, 1));
    let dates = [
        d("2026-03-01"),
        d("2026-03-02"),
        d("2026-03-03"),
        d("2026-03-06"),
        d("2026-03-07"),
    ];
    assert_eq!(calculate_streaks(&dates, 1.5), (2, 3));
}

#[test]
fn test_rest_readiness() -> Result<()> {
    let mut service = create_test_service()?;

    // No sessions at all: ready
    assert!(service.can_train()?);
    assert!(service.hours_until_ready()?.abs() < f64::EPSILON);

    // Session 5 hours ago: about an hour to go
    service.save_session(Utc::now() - Duration::hours(5), 2400)?;
    assert!(!service.can_train()?);
    let remaining = service.hours_until_ready()?;
    assert!((0.9..=1.1).contains(&remaining), "remaining = {remaining}");

    // A later session resets the clock, so use a fresh service for the
    // ready case: session 7 hours ago clears the 6-hour rest period.
    let mut service = create_test_service()?;
    service.save_session(Utc::now() - Duration::hours(7), 2400)?;
    assert!(service.can_train()?);
    assert!(service.hours_until_ready()?.abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn test_session_rejects_negative_duration() -> Result<()> {
    let mut service = create_test_service()?;
    assert!(service.save_session(Utc::now(), -5).is_err());
    assert_eq!(service.get_current_streak()?, 0);
    Ok(())
}

#[test]
fn test_empty_aggregations_yield_defaults() -> Result<()> {
    let service = create_test_service()?;
    assert!(service.get_recent_check_ins(7)?.is_empty());
    assert!(service.get_exercise_logs()?.is_empty());
    assert!(service.get_exercise_history("anything", 30)?.is_empty());
    assert!(service.get_custom_workouts()?.is_empty());
    assert!(service.get_significant_events(30)?.is_empty());
    assert_eq!(service.get_current_streak()?, 0);
    assert!(service.get_latest_body_measurement()?.is_none());

    let snapshot = service.export_data()?;
    assert!(snapshot.summary.average_pain.abs() < f64::EPSILON); // 0, never NaN
    assert!(snapshot.summary.average_pain.is_finite());
    assert_eq!(snapshot.summary.swelling_days, 0);
    assert_eq!(snapshot.summary.total_sessions, 0);
    Ok(())
}

#[test]
fn test_export_round_trip_contains_everything() -> Result<()> {
    let mut service = create_test_service()?;

    service.save_check_in(CheckInParams {
        date: today(),
        swelling: Some(Swelling::Mild),
        pain: 4,
        ..Default::default()
    })?;
    service.save_check_in(CheckInParams {
        date: today() - Duration::days(1),
        swelling: Some(Swelling::None),
        pain: 0,
        ..Default::default()
    })?;
    let log = service.save_exercise_log(
        Utc::now(),
        NewExerciseLog {
            exercise_id: "bridge".to_string(),
            exercise_name: "Glute Bridge".to_string(),
            sets_completed: 3,
            reps_per_set: 12,
            ..Default::default()
        },
    )?;
    service.save_custom_workout(
        Utc::now(),
        NewCustomWorkout {
            workout_category: "cardio".to_string(),
            workout_type: "Walk".to_string(),
            duration_minutes: 25,
            intensity: 2,
            ..Default::default()
        },
    )?;
    service.save_body_measurement(measurement(today(), Measurements::default()))?;
    let event = service.save_significant_event(
        Utc::now(),
        NewSignificantEvent {
            event_type: "swelling_spike".to_string(),
            ..Default::default()
        },
    )?;
    service.save_session(Utc::now(), 1500)?;

    let snapshot = service.export_data()?;
    assert_eq!(snapshot.check_ins.len(), 2);
    assert_eq!(snapshot.exercise_logs.len(), 1);
    assert_eq!(snapshot.exercise_logs[0].id, log.id);
    assert_eq!(snapshot.custom_workouts.len(), 1);
    assert_eq!(snapshot.body_measurements.len(), 1);
    assert_eq!(snapshot.significant_events.len(), 1);
    assert_eq!(snapshot.significant_events[0].id, event.id);
    assert_eq!(snapshot.training_sessions.len(), 1);
    assert_eq!(snapshot.summary.total_sessions, 1);
    assert_eq!(snapshot.summary.swelling_days, 1); // only the "mild" day
    assert!((snapshot.summary.average_pain - 2.0).abs() < 1e-9); // (4 + 0) / 2

    // The snapshot is plain serializable data
    let json = serde_json::to_string(&snapshot)?;
    assert!(json.contains("Glute Bridge"));
    Ok(())
}

#[test]
fn test_corrupt_collection_fails_open() -> Result<()> {
    let mut backend = MemoryStorage::new();
    backend.put_raw("check_ins", "{{{ definitely not json");
    let mut service = JournalService::with_backend(Box::new(backend), Config::default())?;

    // Corrupt payload reads as empty instead of erroring
    assert!(service.get_recent_check_ins(7)?.is_empty());
    assert_eq!(service.get_knee_status()?, KneeStatus::Unknown);

    // And the collection is writable again afterwards
    service.save_check_in(CheckInParams {
        date: today(),
        swelling: Some(Swelling::None),
        pain: 0,
        ..Default::default()
    })?;
    assert_eq!(service.get_recent_check_ins(7)?.len(), 1);
    Ok(())
}

#[test]
fn test_storage_backend_contract() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut backends: Vec<Box<dyn StorageBackend>> = vec![
        Box::new(MemoryStorage::new()),
        Box::new(FileStorage::open(dir.path())?),
    ];

    for backend in &mut backends {
        assert!(backend.read("missing")?.is_none());
        backend.write("greeting", "hello")?;
        assert_eq!(backend.read("greeting")?.as_deref(), Some("hello"));
        backend.write("greeting", "replaced")?;
        assert_eq!(backend.read("greeting")?.as_deref(), Some("replaced"));
        backend.remove("greeting")?;
        assert!(backend.read("greeting")?.is_none());
        // Removing an absent key is not an error
        backend.remove("greeting")?;
    }
    Ok(())
}

#[test]
fn test_file_storage_persists_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let backend = FileStorage::open(dir.path())?;
        let mut service = JournalService::with_backend(Box::new(backend), Config::default())?;
        service.save_check_in(CheckInParams {
            date: today(),
            swelling: Some(Swelling::Moderate),
            pain: 6,
            ..Default::default()
        })?;
        service.save_session(Utc::now(), 900)?;
    }

    // Reopen over the same directory; init must not clobber existing data
    let backend = FileStorage::open(dir.path())?;
    let service = JournalService::with_backend(Box::new(backend), Config::default())?;
    let stored = service.get_check_in(today())?.unwrap();
    assert_eq!(stored.swelling, Some(Swelling::Moderate));
    assert_eq!(stored.pain, 6);
    assert_eq!(service.get_knee_status()?, KneeStatus::Red);
    assert_eq!(service.get_current_streak()?, 1);
    Ok(())
}
