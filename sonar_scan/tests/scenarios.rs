//! End-to-end sweeps against recording devices.
//!
//! Every scenario runs the real engine with zero cadence, settle and grace
//! times and a private store / lock directory.

mod common;

use common::{ScriptedSensor, per_step, rig, rig_with, start_engine, test_config};
use chrono::Utc;
use sonar_common::session::{ScanSettings, SessionStatus, project};
use rusqlite::Connection;
use sonar_scan::error::{EXIT_FAILURE, EXIT_OK, status_exit_code};
use sonar_scan::lock::InstanceLock;
use sonar_scan::store::{PointRecord, Store};
use sonar_scan::CancelToken;
use tempfile::tempdir;

fn grid_angles(n: usize) -> Vec<f64> {
    (0..n).map(|k| 10.0 * k as f64).collect()
}

#[test]
fn test_nominal_sweep() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (devices, probes) = rig(&config, |_| 150.0, None);

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    let status = engine.run();
    drop(engine);

    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(status_exit_code(status), EXIT_OK);

    let store = Store::open(&config.paths.db).unwrap();
    let session = store.session(id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.analysis.is_some());

    let points = store.points(id).unwrap();
    assert_eq!(points.len(), 19);
    let angles: Vec<f64> = points.iter().map(|p| p.angle).collect();
    assert_eq!(angles, grid_angles(19));
    assert!(points.iter().all(|p| p.velocity == 0.0));
    assert!(points.iter().all(|p| p.timestamp >= session.start_time));
    assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(points.iter().all(|p| p.x.is_some() && p.y.is_some()));

    assert_eq!(probes.near.rising_edges(), 0);
    assert!(per_step(&probes.ok.history()).iter().all(|on| *on));
    assert!(per_step(&probes.far.history()).iter().all(|on| *on));
    assert_eq!(per_step(&probes.far.history()).len(), 19);

    // Servo: pre-position, 19 steps, back to centre, detached.
    let commands = probes.servo.commands();
    assert_eq!(commands.len(), 21);
    assert_eq!(commands[20], 90.0);
    assert!(probes.servo.is_detached());
    assert!(probes.display.is_closed());
    assert_eq!(probes.display.lines()[0].trim_end(), "TARAMA BITTI");
}

#[test]
fn test_close_object_preemption() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (devices, probes) = rig(
        &config,
        |angle| if angle < 35.0 { 150.0 } else { 5.0 },
        None,
    );

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    let status = engine.run();
    drop(engine);

    assert_eq!(status, SessionStatus::TerminatedCloseObject);
    assert_eq!(status_exit_code(status), EXIT_OK);

    let store = Store::open(&config.paths.db).unwrap();
    assert_eq!(
        store.session(id).unwrap().unwrap().status,
        SessionStatus::TerminatedCloseObject
    );
    // The close sample itself is never persisted.
    assert_eq!(store.profile(id).unwrap(), vec![
        (0.0, 150.0),
        (10.0, 150.0),
        (20.0, 150.0),
        (30.0, 150.0),
    ]);

    // Five synchronous blinks of the near lamp, then shutdown's all-off.
    let near = probes.near.history();
    let mut blink_tail = [true, false].repeat(5);
    blink_tail.push(false);
    assert!(near.ends_with(&blink_tail));
    assert_eq!(probes.display.lines()[0].trim_end(), "COK YAKIN!");
}

#[test]
fn test_operator_interrupt() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let cancel = CancelToken::new();
    let (devices, probes) = rig(&config, |_| 80.0, Some((90.0, cancel.clone())));

    let mut engine = start_engine(&config, devices, cancel);
    let id = engine.session_id();
    let status = engine.run();
    drop(engine);

    assert_eq!(status, SessionStatus::InterruptedByOperator);
    assert_eq!(status_exit_code(status), EXIT_OK);
    assert!(!config.paths.lock.exists());
    assert!(!config.paths.pid.exists());
    assert_eq!(probes.display.lines()[0].trim_end(), "DURDURULDU");

    let store = Store::open(&config.paths.db).unwrap();
    let points = store.points(id).unwrap();
    assert!(points.len() <= 10);
    assert_eq!(points.last().unwrap().angle, 90.0);
    assert_eq!(
        store.session(id).unwrap().unwrap().status,
        SessionStatus::InterruptedByOperator
    );
    drop(store);

    // Immediate re-run: no contention.
    let lock = InstanceLock::acquire(&config.paths.lock, &config.paths.pid);
    assert!(lock.is_ok());
}

#[test]
fn test_crash_recovery() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);

    // A run that died at 50° without writing a terminal status.
    let orphan = {
        let store = Store::open(&config.paths.db).expect("open store");
        let id = store
            .open_session(&ScanSettings::from_config(&config))
            .expect("open session");
        for angle in [0.0, 10.0, 20.0, 30.0, 40.0, 50.0] {
            let record = PointRecord {
                angle,
                distance: 120.0,
                velocity: 0.0,
                timestamp: Utc::now(),
                projection: Some(project(angle, 120.0)),
            };
            store.append_point(id, &record).expect("append point");
        }
        id
    };

    let (devices, _probes) = rig(&config, |_| 120.0, None);
    let mut engine = start_engine(&config, devices, CancelToken::new());
    let fresh = engine.session_id();
    assert_ne!(fresh, orphan);
    assert_eq!(engine.run(), SessionStatus::Completed);
    drop(engine);

    let store = Store::open(&config.paths.db).unwrap();
    assert_eq!(store.point_count(orphan).unwrap(), 6);
    assert_eq!(
        store.session(orphan).unwrap().unwrap().status,
        SessionStatus::InterruptedPriorRun
    );
    assert_eq!(
        store.session(fresh).unwrap().unwrap().status,
        SessionStatus::Completed
    );
    assert!(store.session_ids_with_status(SessionStatus::Running).unwrap().is_empty());
}

#[test]
fn test_invalid_readings_still_persisted() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (devices, probes) = rig(
        &config,
        |angle| if (angle / 10.0) as u32 % 2 == 1 { 0.0 } else { 50.0 },
        None,
    );

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    assert_eq!(engine.run(), SessionStatus::Completed);
    drop(engine);

    let store = Store::open(&config.paths.db).unwrap();
    let points = store.points(id).unwrap();
    assert_eq!(points.len(), 19);
    for (k, point) in points.iter().enumerate() {
        let odd = k % 2 == 1;
        assert_eq!(point.distance, if odd { 0.0 } else { 50.0 });
        assert_eq!(point.x.is_none(), odd);
    }

    let near = probes.near.history();
    let ok = probes.ok.history();
    assert!(per_step(&near).iter().all(|on| !on));
    for (k, on) in per_step(&ok).iter().enumerate() {
        assert_eq!(*on, k % 2 == 0, "ok lamp at step {k}");
    }
}

#[test]
fn test_single_angle_sweep() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.sweep.start_angle = 45.0;
    config.sweep.end_angle = 45.0;
    let (devices, _probes) = rig(&config, |_| 60.0, None);

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    assert_eq!(engine.run(), SessionStatus::CompletedInsufficientPoints);
    drop(engine);

    let store = Store::open(&config.paths.db).unwrap();
    assert_eq!(store.profile(id).unwrap(), vec![(45.0, 60.0)]);
}

#[test]
fn test_inverted_mount_records_logical_angles() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.sweep.start_angle = 0.0;
    config.sweep.end_angle = 40.0;
    config.sweep.invert_motor_direction = true;
    let (devices, probes) = rig(&config, |_| 70.0, None);

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    engine.run();
    drop(engine);

    let commands = probes.servo.commands();
    assert_eq!(&commands[1..6], &[180.0, 170.0, 160.0, 150.0, 140.0]);

    let store = Store::open(&config.paths.db).unwrap();
    let session = store.session(id).unwrap().unwrap();
    assert!(session.settings.invert_motor_direction);
    let angles: Vec<f64> = store.points(id).unwrap().iter().map(|p| p.angle).collect();
    assert_eq!(angles, grid_angles(5));
}

#[test]
fn test_append_failures_do_not_stop_the_sweep() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (devices, _probes) = rig(&config, |_| 90.0, None);
    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();

    // Another writer makes the store refuse three samples.
    let conn = Connection::open(&config.paths.db).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER refuse_points BEFORE INSERT ON points
         WHEN NEW.angle >= 20 AND NEW.angle < 50
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .unwrap();
    drop(conn);

    assert_eq!(engine.run(), SessionStatus::Completed);
    let stats = engine.stats();
    assert_eq!(stats.samples, 19);
    assert_eq!(stats.append_failures, 3);
    assert_eq!(stats.persisted, 16);
    drop(engine);

    let store = Store::open(&config.paths.db).unwrap();
    let angles: Vec<f64> = store.points(id).unwrap().iter().map(|p| p.angle).collect();
    assert_eq!(angles.len(), 16);
    assert!(!angles.contains(&20.0) && !angles.contains(&40.0));
    assert!(angles.contains(&50.0));
    assert_eq!(
        store.session(id).unwrap().unwrap().status,
        SessionStatus::Completed
    );
}

#[test]
fn test_device_failure_ends_session_as_error() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (devices, probes) = rig_with(&config, |servo| {
        ScriptedSensor::new(servo, |_| 90.0).fail_from(40.0)
    });

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    let status = engine.run();
    assert_eq!(status, SessionStatus::Error);
    assert_eq!(status_exit_code(status), EXIT_FAILURE);
    assert_eq!(engine.stats().samples, 4);
    assert_eq!(engine.stats().persisted, 4);
    drop(engine);

    // Shutdown still ran in full.
    assert!(!config.paths.lock.exists());
    assert!(!config.paths.pid.exists());
    assert_eq!(probes.servo.commands().last(), Some(&90.0));
    assert!(probes.servo.is_detached());
    assert!(!probes.near.history().last().unwrap());
    assert!(!probes.ok.history().last().unwrap());
    assert!(!probes.far.history().last().unwrap());
    assert!(probes.display.is_closed());
    assert_eq!(probes.display.lines()[0].trim_end(), "HATA");

    let store = Store::open(&config.paths.db).unwrap();
    assert_eq!(store.point_count(id).unwrap(), 4);
    assert_eq!(
        store.session(id).unwrap().unwrap().status,
        SessionStatus::Error
    );
}

#[test]
fn test_step_display_frames() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.sweep.end_angle = 20.0;
    let (devices, probes) = rig(&config, |angle| 100.0 + angle, None);

    let mut engine = start_engine(&config, devices, CancelToken::new());
    let id = engine.session_id();
    engine.run();
    drop(engine);

    let frames: Vec<Vec<String>> = probes
        .display
        .frames()
        .into_iter()
        .map(|frame| frame.iter().map(|line| line.trim_end().to_string()).collect())
        .collect();
    // Banner, one frame per step, farewell.
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0], ["TARAMA".to_string(), format!("Oturum {id}")]);
    assert_eq!(frames[1], [format!("A:0 S:{id}"), "100.0cm +0.0".to_string()]);
    assert_eq!(frames[3][0], format!("A:20 S:{id}"));
    assert!(frames[3][1].starts_with("120.0cm "));
    assert_eq!(frames[4][0], "TARAMA BITTI");
}
