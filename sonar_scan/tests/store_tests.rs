//! Store behaviour across processes sharing one file.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use sonar_common::config::ScanConfig;
use sonar_common::session::{ScanSettings, SessionStatus, project};
use sonar_scan::store::{PointRecord, SCHEMA_VERSION, Store};
use tempfile::TempDir;

fn record(angle: f64, distance: f64, offset_ms: i64) -> PointRecord {
    PointRecord {
        angle,
        distance,
        velocity: 0.0,
        timestamp: Utc::now() + Duration::milliseconds(offset_ms),
        projection: Some(project(angle, distance)),
    }
}

#[test]
fn test_appended_points_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scan.sqlite3");
    let settings = ScanSettings::from_config(&ScanConfig::default());

    let id = {
        let store = Store::open(&db).unwrap();
        let id = store.open_session(&settings).unwrap();
        for (k, angle) in [0.0, 10.0, 20.0].into_iter().enumerate() {
            store.append_point(id, &record(angle, 80.0, k as i64)).unwrap();
        }
        id
        // Dropped without a terminal status, like a killed process.
    };

    let store = Store::open(&db).unwrap();
    assert_eq!(store.point_count(id).unwrap(), 3);
    assert_eq!(store.sweep_orphans().unwrap(), 1);
    let session = store.session(id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::InterruptedPriorRun);
    assert_eq!(session.settings, settings);

    // Terminal statuses are never left again.
    assert!(!store.set_status(id, SessionStatus::Completed).unwrap());
    assert_eq!(
        store.session(id).unwrap().unwrap().status,
        SessionStatus::InterruptedPriorRun
    );
}

#[test]
fn test_deleting_a_session_removes_its_points() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scan.sqlite3");
    let settings = ScanSettings::from_config(&ScanConfig::default());

    let store = Store::open(&db).unwrap();
    let old = store.open_session(&settings).unwrap();
    store.append_point(old, &record(0.0, 50.0, 0)).unwrap();
    store.set_status(old, SessionStatus::Completed).unwrap();
    let kept = store.open_session(&settings).unwrap();
    store.append_point(kept, &record(0.0, 60.0, 0)).unwrap();

    // An external retention job with its own connection.
    let retention = Connection::open(&db).unwrap();
    retention.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    retention
        .execute("DELETE FROM sessions WHERE id = ?1", [old])
        .unwrap();

    assert!(store.session(old).unwrap().is_none());
    assert_eq!(store.point_count(old).unwrap(), 0);
    assert_eq!(store.point_count(kept).unwrap(), 1);
}

#[test]
fn test_schema_version_is_recorded() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scan.sqlite3");
    drop(Store::open(&db).unwrap());

    let conn = Connection::open(&db).unwrap();
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
    let journal: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal, "wal");

    // Reopening an existing store keeps its data and version.
    drop(conn);
    let store = Store::open(&db).unwrap();
    assert_eq!(store.latest_session_id().unwrap(), None);
}
