//! Scan engine and sweep loop.
//!
//! The `ScanEngine` owns every process-wide resource of a run: the instance
//! lock, the device set, the store and the open session. It sweeps the
//! servo over the angle grid, samples once per angle, records each sample
//! and closes the session with exactly one terminal status.
//!
//! # Loop
//!
//! Per angle: cancel check, servo move (settle included), one sensor read,
//! velocity, display, lamps, close-object check, persist, cadence sleep.
//! A close object breaks the loop before its sample is persisted.
//!
//! # Shutdown
//!
//! `shutdown()` runs once, from `run()` or from `Drop`: terminal status if
//! still running, stop blinking, centre and detach the servo, lamps off,
//! farewell on the display, close the store, release the lock.

use chrono::{DateTime, Utc};
use sonar_common::config::ScanConfig;
use sonar_common::session::{ScanSettings, SessionStatus, is_valid_distance, project};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::analysis;
use crate::devices::{DeviceSet, LampId};
use crate::error::ScanError;
use crate::lock::InstanceLock;
use crate::store::{PointRecord, Store};
use crate::sweep::{AngleGrid, FarLamp, Thresholds, VelocitySlot};

/// Granularity of cancellable sleeps.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Operator cancellation flag shared with the signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe from a signal handler thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep up to `period`, returning early once cancelled.
    pub fn sleep(&self, period: Duration) {
        let deadline = Instant::now() + period;
        while !self.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

/// Timing statistics of one sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    /// Samples taken.
    pub samples: u32,
    /// Samples persisted.
    pub persisted: u32,
    /// Samples whose append failed.
    pub append_failures: u32,
    /// Steps that took longer than the target interval.
    pub overruns: u32,
    /// Longest step.
    pub max_step: Duration,
}

/// How the sweep loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepEnd {
    Finished,
    Cancelled,
    CloseObject,
}

/// One scan run.
pub struct ScanEngine {
    config: ScanConfig,
    settings: ScanSettings,
    thresholds: Thresholds,
    devices: DeviceSet,
    store: Store,
    lock: InstanceLock,
    cancel: CancelToken,
    session_id: i64,
    session_start: DateTime<Utc>,
    status: SessionStatus,
    stats: SweepStats,
    shut_down: bool,
}

impl ScanEngine {
    /// Open the store, sweep orphans and open a new session.
    ///
    /// # Errors
    /// `ScanError::Config` for invalid sweep settings and `ScanError::Store`
    /// when the store or the session cannot be opened. Devices are released
    /// (and the lock dropped) before the error is returned.
    pub fn new(
        config: ScanConfig,
        lock: InstanceLock,
        mut devices: DeviceSet,
        cancel: CancelToken,
    ) -> Result<Self, ScanError> {
        let settings = ScanSettings::from_config(&config);
        if let Err(e) = settings.validate() {
            devices.release(Some(("HATA", "AYAR")));
            return Err(e.into());
        }

        let session_start = Utc::now();
        let opened = Store::open(&config.paths.db).and_then(|store| {
            store.sweep_orphans()?;
            let id = store.open_session_at(&settings, session_start)?;
            Ok((store, id))
        });
        let (store, session_id) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!("Cannot open session in {:?}: {}", config.paths.db, e);
                devices.release(Some(("HATA", "VERITABANI")));
                return Err(e.into());
            }
        };

        let thresholds = Thresholds::new(&config, &settings);
        Ok(Self {
            config,
            settings,
            thresholds,
            devices,
            store,
            lock,
            cancel,
            session_id,
            session_start,
            status: SessionStatus::Running,
            stats: SweepStats::default(),
            shut_down: false,
        })
    }

    /// Id of the open session.
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Statistics of the sweep so far.
    pub fn stats(&self) -> SweepStats {
        self.stats
    }

    /// Run the sweep to its terminal status, then shut down.
    ///
    /// Device failures inside the loop are not returned; they end the
    /// session as `error`.
    pub fn run(&mut self) -> SessionStatus {
        let status = match self.sweep() {
            Ok(SweepEnd::Finished) => self.analyze(),
            Ok(SweepEnd::Cancelled) => {
                info!("Scan interrupted by operator");
                SessionStatus::InterruptedByOperator
            }
            Ok(SweepEnd::CloseObject) => SessionStatus::TerminatedCloseObject,
            Err(e) => {
                error!("Scan failed: {}", e);
                SessionStatus::Error
            }
        };
        self.finish(status);
        self.shutdown();
        status
    }

    fn sweep(&mut self) -> Result<SweepEnd, ScanError> {
        let timing = self.config.timing;
        let target = timing.loop_target_interval();
        info!(
            "Session {} sweeping {}..{} step {} (cycle {}ms)",
            self.session_id,
            self.settings.start_angle,
            self.settings.end_angle,
            self.settings.step_angle,
            target.as_millis()
        );

        self.devices.lamps.all_off()?;
        self.devices
            .write("TARAMA", &format!("Oturum {}", self.session_id));
        self.devices.servo.set_angle(self.settings.start_angle)?;
        self.cancel.sleep(timing.start_grace());

        let mut grid = AngleGrid::new(&self.settings);
        let mut velocity = VelocitySlot::new();
        let mut last_ts = self.session_start;

        while let Some(angle) = grid.next() {
            if self.cancel.is_cancelled() {
                self.log_stats();
                return Ok(SweepEnd::Cancelled);
            }
            let step_start = Instant::now();

            self.devices.servo.set_angle(angle)?;
            let distance = self.devices.sensor.read_cm()?;
            let sampled_at = Instant::now();
            // Wall clock may step backwards; sample order must not.
            let timestamp = Utc::now().max(last_ts);
            last_ts = timestamp;
            let v = velocity.update(distance, sampled_at);
            self.stats.samples += 1;
            debug!("{:>6.1}° {:>7.1} cm {:>+8.1} cm/s", angle, distance, v);

            self.devices.write(
                &format!("A:{:.0} S:{}", angle, self.session_id),
                &format!("{:.1}cm {:+.1}", distance, v),
            );
            self.apply_lamps(distance)?;

            if self.thresholds.is_close_object(distance) {
                self.preempt(angle, distance)?;
                self.log_stats();
                return Ok(SweepEnd::CloseObject);
            }

            self.persist(angle, distance, v, timestamp);

            let elapsed = step_start.elapsed();
            self.stats.max_step = self.stats.max_step.max(elapsed);
            if elapsed > target {
                self.stats.overruns += 1;
                if self.stats.overruns <= 10 {
                    warn!(
                        "Step overrun #{}: {}ms (target {}ms)",
                        self.stats.overruns,
                        elapsed.as_millis(),
                        target.as_millis()
                    );
                }
            }
            if grid.peek().is_some() {
                self.cancel.sleep(target.saturating_sub(elapsed));
            }
        }

        self.log_stats();
        Ok(SweepEnd::Finished)
    }

    fn apply_lamps(&mut self, distance: f64) -> Result<(), ScanError> {
        let cmd = self.thresholds.lamps(distance);
        let lamps = &mut self.devices.lamps;
        lamps.set(LampId::Near, cmd.near)?;
        lamps.set(LampId::Ok, cmd.ok)?;
        match cmd.far {
            FarLamp::On => lamps.set(LampId::Far, true)?,
            FarLamp::Toggle => lamps.toggle(LampId::Far)?,
        }
        Ok(())
    }

    fn preempt(&mut self, angle: f64, distance: f64) -> Result<(), ScanError> {
        warn!(
            "Close object at {:.0}°: {:.1} cm (< {} cm), stopping sweep",
            angle, distance, self.thresholds.termination_cm
        );
        self.devices.write("COK YAKIN!", &format!("{:.1} cm", distance));
        let timing = self.config.timing;
        self.devices.lamps.all_off()?;
        self.devices.lamps.blink(
            LampId::Near,
            Duration::from_millis(timing.preempt_blink_on_ms),
            Duration::from_millis(timing.preempt_blink_off_ms),
            Some(timing.preempt_blink_count),
            true,
        )?;
        Ok(())
    }

    fn persist(&mut self, angle: f64, distance: f64, velocity: f64, timestamp: DateTime<Utc>) {
        let record = PointRecord {
            angle,
            distance,
            velocity,
            timestamp,
            projection: is_valid_distance(distance, self.thresholds.max_range_cm)
                .then(|| project(angle, distance)),
        };
        match self.store.append_point(self.session_id, &record) {
            Ok(_) => self.stats.persisted += 1,
            Err(e) => {
                self.stats.append_failures += 1;
                warn!(
                    "Sample at {:.0}° ({:.1} cm) not persisted: {}",
                    angle, distance, e
                );
            }
        }
    }

    /// Geometry summary of a finished sweep; picks the completed status.
    fn analyze(&mut self) -> SessionStatus {
        let profile = match self.store.profile(self.session_id) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile unavailable, skipping analysis: {}", e);
                return SessionStatus::Completed;
            }
        };
        match analysis::analyze(&profile, self.thresholds.max_range_cm) {
            None => {
                info!(
                    "Only {} sample(s), too few valid readings for analysis",
                    profile.len()
                );
                SessionStatus::CompletedInsufficientPoints
            }
            Some(summary) => {
                info!(
                    "Area {:.0} cm², perimeter {:.0} cm, width {:.0} cm, depth {:.0} cm",
                    summary.area_cm2,
                    summary.perimeter_cm,
                    summary.max_width_cm,
                    summary.max_depth_cm
                );
                if let Err(e) = self.store.set_analysis(self.session_id, &summary) {
                    warn!("Analysis not stored: {}", e);
                }
                SessionStatus::Completed
            }
        }
    }

    fn log_stats(&self) {
        info!(
            "Sweep: {} samples, {} persisted, {} append failures, {} overruns, max step {}ms",
            self.stats.samples,
            self.stats.persisted,
            self.stats.append_failures,
            self.stats.overruns,
            self.stats.max_step.as_millis()
        );
    }

    /// Write the terminal status once.
    fn finish(&mut self, status: SessionStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if let Err(e) = self.store.set_status(self.session_id, status) {
            error!("Failed to record status {} for session {}: {}", status, self.session_id, e);
        }
    }

    /// Ordered release of every resource. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if !self.status.is_terminal() {
            let status = if self.cancel.is_cancelled() {
                SessionStatus::InterruptedByOperator
            } else {
                SessionStatus::Error
            };
            self.finish(status);
        }

        self.devices.lamps.stop_blink();
        if let Err(e) = self.devices.servo.center() {
            warn!("Failed to center servo: {}", e);
        }
        let (line1, line2) = farewell(self.status);
        self.devices.release(Some((line1, line2)));
        self.store.close();
        self.lock.release();
        info!("Session {} closed: {}", self.session_id, self.status);
    }
}

impl Drop for ScanEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Closing display text for `status`.
pub fn farewell(status: SessionStatus) -> (&'static str, &'static str) {
    match status {
        SessionStatus::Completed => ("TARAMA BITTI", ""),
        SessionStatus::CompletedInsufficientPoints => ("TARAMA BITTI", "YETERSIZ VERI"),
        SessionStatus::InterruptedByOperator => ("DURDURULDU", ""),
        SessionStatus::TerminatedCloseObject => ("COK YAKIN!", "DURDURULDU"),
        SessionStatus::Error | SessionStatus::Running | SessionStatus::InterruptedPriorRun => {
            ("HATA", "")
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{LampBank, MountedServo};
    use crate::drivers::null::{NullDisplay, NullLamp, NullSensor, NullServo};
    use sonar_common::config::{PathConfig, TimingConfig};
    use tempfile::{TempDir, tempdir};

    fn config(dir: &TempDir) -> ScanConfig {
        ScanConfig {
            timing: TimingConfig::immediate(),
            paths: PathConfig::in_dir(dir.path()),
            ..ScanConfig::default()
        }
    }

    fn devices(config: &ScanConfig, sensor: NullSensor, display: NullDisplay) -> DeviceSet {
        DeviceSet::new(
            "test",
            Box::new(sensor),
            MountedServo::new(Box::new(NullServo::new()), &config.sweep),
            LampBank::new(
                Box::new(NullLamp::new()),
                Box::new(NullLamp::new()),
                Box::new(NullLamp::new()),
            ),
            Some(Box::new(display)),
            config.display.cols,
        )
    }

    fn engine(config: ScanConfig, sensor: NullSensor) -> ScanEngine {
        let lock = InstanceLock::acquire(&config.paths.lock, &config.paths.pid).unwrap();
        let devices = devices(&config, sensor, NullDisplay::new(2));
        ScanEngine::new(config, lock, devices, CancelToken::new()).unwrap()
    }

    #[test]
    fn cancel_token_sleep_returns_early() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        token.sleep(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn run_completes_and_analyzes() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let db = config.paths.db.clone();
        let mut engine = engine(config, NullSensor::fixed_cm(150.0));
        let id = engine.session_id();

        assert_eq!(engine.run(), SessionStatus::Completed);
        assert_eq!(engine.stats().samples, 19);
        assert_eq!(engine.stats().persisted, 19);
        drop(engine);

        let store = Store::open(&db).unwrap();
        let session = store.session(id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        let analysis = session.analysis.unwrap();
        assert!((analysis.max_depth_cm - 150.0).abs() < 1e-6);
    }

    #[test]
    fn all_invalid_is_insufficient() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let mut engine = engine(config, NullSensor::fixed_cm(0.0));
        assert_eq!(engine.run(), SessionStatus::CompletedInsufficientPoints);
    }

    #[test]
    fn shutdown_without_run_marks_error() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let db = config.paths.db.clone();
        let lock_path = config.paths.lock.clone();
        let mut engine = engine(config, NullSensor::fixed_cm(50.0));
        let id = engine.session_id();

        engine.shutdown();
        engine.shutdown();
        assert_eq!(engine.status(), SessionStatus::Error);
        assert!(!lock_path.exists());
        drop(engine);

        let store = Store::open(&db).unwrap();
        assert_eq!(
            store.session(id).unwrap().unwrap().status,
            SessionStatus::Error
        );
    }

    #[test]
    fn store_failure_releases_devices() {
        let dir = tempdir().unwrap();
        let mut config = config(&dir);
        // A directory where the store file should be.
        config.paths.db = dir.path().to_path_buf();
        let lock = InstanceLock::acquire(&config.paths.lock, &config.paths.pid).unwrap();
        let display = NullDisplay::new(2);
        let devices = devices(&config, NullSensor::fixed_cm(50.0), display.clone());

        let err = ScanEngine::new(config, lock, devices, CancelToken::new())
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), crate::error::EXIT_STORE);
        assert!(display.is_closed());
        assert_eq!(display.lines()[0].trim_end(), "HATA");
    }

    #[test]
    fn farewell_texts() {
        assert_eq!(farewell(SessionStatus::InterruptedByOperator).0, "DURDURULDU");
        assert_eq!(farewell(SessionStatus::Error).0, "HATA");
        assert_eq!(farewell(SessionStatus::TerminatedCloseObject).0, "COK YAKIN!");
    }
}
