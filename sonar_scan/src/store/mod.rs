//! Durable session and point store (SQLite).
//!
//! Two relations, `sessions` and `points`, with cascade delete from a
//! session to its points and an index on `(session_id, timestamp)`. Every
//! write is its own transaction and is committed before the call returns,
//! so a killed process loses at most the sample it was taking.
//!
//! The scan engine is the only writer of new sessions. Readers (dashboard,
//! planner) and the retention job may open the same file concurrently; WAL
//! mode keeps readers off the writer's path.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use sonar_common::session::{
    AnalysisSummary, ScanPoint, ScanSession, ScanSettings, SessionStatus,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// Current schema version (`PRAGMA user_version`).
pub const SCHEMA_VERSION: i64 = 1;

/// One sample ready for persistence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Logical sweep angle [deg].
    pub angle: f64,
    /// Distance [cm].
    pub distance: f64,
    /// Radial velocity [cm/s].
    pub velocity: f64,
    /// Sample instant.
    pub timestamp: DateTime<Utc>,
    /// Cartesian projection, valid readings only.
    pub projection: Option<(f64, f64)>,
}

/// SQLite-backed store. `close()` is idempotent; every other operation on
/// a closed store fails with `StoreError::Closed`.
pub struct Store {
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!("Store opened at {:?}", path);
        Ok(store)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Self {
            conn: Some(conn),
            path,
        })
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    /// Location on disk, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Mark every `running` session as `interrupted-prior-run`.
    ///
    /// Returns the number of sessions swept. Idempotent.
    pub fn sweep_orphans(&self) -> StoreResult<usize> {
        let swept = self.conn()?.execute(
            "UPDATE sessions SET status = ?1 WHERE status = ?2",
            params![
                SessionStatus::InterruptedPriorRun.as_str(),
                SessionStatus::Running.as_str()
            ],
        )?;
        if swept > 0 {
            warn!("Swept {} orphaned session(s) to interrupted-prior-run", swept);
        }
        Ok(swept)
    }

    /// Insert a `running` session starting now.
    pub fn open_session(&self, settings: &ScanSettings) -> StoreResult<i64> {
        self.open_session_at(settings, Utc::now())
    }

    /// Insert a `running` session with an explicit start instant.
    pub fn open_session_at(
        &self,
        settings: &ScanSettings,
        start: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions
                (start_time, status, start_angle, end_angle, step_angle,
                 object_threshold_cm, invert_motor_direction)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                format_ts(start),
                SessionStatus::Running.as_str(),
                settings.start_angle,
                settings.end_angle,
                settings.step_angle,
                settings.object_threshold_cm,
                settings.invert_motor_direction,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Session {} opened ({:?})", id, settings);
        Ok(id)
    }

    /// Insert one point. Returns the point id.
    pub fn append_point(&self, session_id: i64, point: &PointRecord) -> StoreResult<i64> {
        let conn = self.conn()?;
        let (x, y) = point.projection.unzip();
        conn.execute(
            "INSERT INTO points (session_id, angle, distance, velocity, timestamp, x, y)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id,
                point.angle,
                point.distance,
                point.velocity,
                format_ts(point.timestamp),
                x,
                y,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Move a `running` session to a terminal status.
    ///
    /// Returns `true` when the transition happened; later calls on the same
    /// session are no-ops returning `false`. Only statuses the owning
    /// process may write are accepted: `running` and `interrupted-prior-run`
    /// (reserved for [`Store::sweep_orphans`]) are refused with `false`.
    pub fn set_status(&self, session_id: i64, status: SessionStatus) -> StoreResult<bool> {
        if !status.is_owner_terminal() {
            warn!("Session {}: {} is not an owner status, ignored", session_id, status);
            return Ok(false);
        }
        let changed = self.conn()?.execute(
            "UPDATE sessions SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status.as_str(), session_id, SessionStatus::Running.as_str()],
        )?;
        if changed > 0 {
            info!("Session {} -> {}", session_id, status);
        } else {
            debug!("Session {} already terminal, {} ignored", session_id, status);
        }
        Ok(changed > 0)
    }

    /// Attach a geometry summary.
    pub fn set_analysis(&self, session_id: i64, summary: &AnalysisSummary) -> StoreResult<()> {
        self.conn()?.execute(
            "UPDATE sessions
                SET hull_area = ?1, hull_perimeter = ?2, max_width = ?3, max_depth = ?4
              WHERE id = ?5",
            params![
                summary.area_cm2,
                summary.perimeter_cm,
                summary.max_width_cm,
                summary.max_depth_cm,
                session_id
            ],
        )?;
        Ok(())
    }

    /// Attach commentary text (written by downstream consumers).
    pub fn set_commentary(&self, session_id: i64, text: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "UPDATE sessions SET ai_commentary = ?1 WHERE id = ?2",
            params![text, session_id],
        )?;
        Ok(())
    }

    /// Read one session back.
    pub fn session(&self, session_id: i64) -> StoreResult<Option<ScanSession>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, start_time, status, start_angle, end_angle, step_angle,
                        object_threshold_cm, invert_motor_direction,
                        hull_area, hull_perimeter, max_width, max_depth, ai_commentary
                   FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        start_time: row.get(1)?,
                        status: row.get(2)?,
                        settings: ScanSettings {
                            start_angle: row.get(3)?,
                            end_angle: row.get(4)?,
                            step_angle: row.get(5)?,
                            object_threshold_cm: row.get(6)?,
                            invert_motor_direction: row.get(7)?,
                        },
                        analysis: [row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?],
                        commentary: row.get(12)?,
                    })
                },
            )
            .optional()?;
        row.map(SessionRow::decode).transpose()
    }

    /// Ids of sessions currently in `status`, ascending.
    pub fn session_ids_with_status(&self, status: SessionStatus) -> StoreResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM sessions WHERE status = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Most recent session id.
    pub fn latest_session_id(&self) -> StoreResult<Option<i64>> {
        Ok(self
            .conn()?
            .query_row("SELECT MAX(id) FROM sessions", [], |row| row.get(0))?)
    }

    /// Points of a session in sample order.
    pub fn points(&self, session_id: i64) -> StoreResult<Vec<ScanPoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, angle, distance, velocity, timestamp, x, y
               FROM points WHERE session_id = ?1
              ORDER BY timestamp, id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    ScanPoint {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        angle: row.get(2)?,
                        distance: row.get(3)?,
                        velocity: row.get(4)?,
                        timestamp: DateTime::<Utc>::MIN_UTC,
                        x: row.get(6)?,
                        y: row.get(7)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut point, ts)| {
                point.timestamp = parse_ts(&ts)?;
                Ok(point)
            })
            .collect()
    }

    /// `(angle, distance)` pairs of a session in sample order.
    ///
    /// This is the contract consumed by plotters and the planner.
    pub fn profile(&self, session_id: i64) -> StoreResult<Vec<(f64, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT angle, distance FROM points WHERE session_id = ?1 ORDER BY timestamp, id",
        )?;
        let pairs = stmt
            .query_map(params![session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(f64, f64)>, _>>()?;
        Ok(pairs)
    }

    /// Number of points of a session.
    pub fn point_count(&self, session_id: i64) -> StoreResult<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM points WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Err((_conn, e)) = conn.close() {
            warn!("Store close reported: {}", e);
        } else {
            debug!("Store closed");
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

fn configure_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL, synchronous=FULL, foreign keys)");
    Ok(())
}

fn migrate_schema(conn: &Connection) -> StoreResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "schema version {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    conn.execute_batch(include_str!("schema.sql"))?;
    debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}

/// Fixed-width RFC 3339 so text order equals time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {text:?}: {e}")))
}

struct SessionRow {
    id: i64,
    start_time: String,
    status: String,
    settings: ScanSettings,
    analysis: [Option<f64>; 4],
    commentary: Option<String>,
}

impl SessionRow {
    fn decode(self) -> StoreResult<ScanSession> {
        let status = self
            .status
            .parse::<SessionStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let analysis = match self.analysis {
            [Some(area_cm2), Some(perimeter_cm), Some(max_width_cm), Some(max_depth_cm)] => {
                Some(AnalysisSummary {
                    area_cm2,
                    perimeter_cm,
                    max_width_cm,
                    max_depth_cm,
                })
            }
            _ => None,
        };
        Ok(ScanSession {
            id: self.id,
            start_time: parse_ts(&self.start_time)?,
            settings: self.settings,
            status,
            analysis,
            commentary: self.commentary,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
