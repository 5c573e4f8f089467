//! Shared fixtures: a private directory per test and recording devices.

#![allow(dead_code)]

use sonar_common::config::{PathConfig, ScanConfig, TimingConfig};
use sonar_common::device::{DeviceError, DeviceResult, RangeSensor, Servo};
use sonar_scan::devices::{DeviceSet, LampBank, MountedServo};
use sonar_scan::drivers::null::{NullDisplay, NullLamp, NullServo};
use sonar_scan::lock::InstanceLock;
use sonar_scan::{CancelToken, ScanEngine};
use tempfile::TempDir;

/// Config with zero delays and every path inside `dir`.
pub fn test_config(dir: &TempDir) -> ScanConfig {
    ScanConfig {
        timing: TimingConfig::immediate(),
        paths: PathConfig::in_dir(dir.path()),
        ..ScanConfig::default()
    }
}

/// Sensor whose reading depends on the servo's last commanded angle.
pub struct ScriptedSensor {
    servo: NullServo,
    script: Box<dyn Fn(f64) -> f64 + Send>,
    cancel_at: Option<(f64, CancelToken)>,
    fail_from: Option<f64>,
}

impl ScriptedSensor {
    pub fn new(servo: NullServo, script: impl Fn(f64) -> f64 + Send + 'static) -> Self {
        Self {
            servo,
            script: Box::new(script),
            cancel_at: None,
            fail_from: None,
        }
    }

    /// Request cancellation when sampling at `angle`.
    pub fn cancel_at(mut self, angle: f64, token: CancelToken) -> Self {
        self.cancel_at = Some((angle, token));
        self
    }

    /// Fail every read at or past `angle`.
    pub fn fail_from(mut self, angle: f64) -> Self {
        self.fail_from = Some(angle);
        self
    }
}

impl RangeSensor for ScriptedSensor {
    fn read_m(&mut self) -> DeviceResult<f64> {
        let angle = self.servo.angle().unwrap_or(0.0);
        if self.fail_from.is_some_and(|from| angle >= from) {
            return Err(DeviceError::CommunicationError(format!(
                "echo line stuck at {angle}°"
            )));
        }
        if let Some((at, token)) = &self.cancel_at {
            if (angle - at).abs() < 1e-9 {
                token.cancel();
            }
        }
        Ok((self.script)(angle) / 100.0)
    }
}

/// Handles onto the recording devices of a rig.
pub struct Probes {
    pub servo: NullServo,
    pub near: NullLamp,
    pub ok: NullLamp,
    pub far: NullLamp,
    pub display: NullDisplay,
}

/// Device set around a scripted sensor, plus probes.
pub fn rig(
    config: &ScanConfig,
    script: impl Fn(f64) -> f64 + Send + 'static,
    cancel_at: Option<(f64, CancelToken)>,
) -> (DeviceSet, Probes) {
    rig_with(config, |servo| {
        let sensor = ScriptedSensor::new(servo, script);
        match cancel_at {
            Some((angle, token)) => sensor.cancel_at(angle, token),
            None => sensor,
        }
    })
}

/// Device set around the sensor `build` makes from the servo handle.
pub fn rig_with(
    config: &ScanConfig,
    build: impl FnOnce(NullServo) -> ScriptedSensor,
) -> (DeviceSet, Probes) {
    let probes = Probes {
        servo: NullServo::new(),
        near: NullLamp::new(),
        ok: NullLamp::new(),
        far: NullLamp::new(),
        display: NullDisplay::new(config.display.rows),
    };
    let sensor = build(probes.servo.clone());
    let devices = DeviceSet::new(
        "test",
        Box::new(sensor),
        MountedServo::new(Box::new(probes.servo.clone()), &config.sweep),
        LampBank::new(
            Box::new(probes.near.clone()),
            Box::new(probes.ok.clone()),
            Box::new(probes.far.clone()),
        ),
        Some(Box::new(probes.display.clone())),
        config.display.cols,
    );
    (devices, probes)
}

/// Lock + engine over `devices`.
pub fn start_engine(config: &ScanConfig, devices: DeviceSet, cancel: CancelToken) -> ScanEngine {
    let lock = InstanceLock::acquire(&config.paths.lock, &config.paths.pid).expect("acquire lock");
    ScanEngine::new(config.clone(), lock, devices, cancel).expect("open engine")
}

/// Per-step entries of a lamp history: drop the startup and shutdown
/// `all_off` writes.
pub fn per_step(history: &[bool]) -> &[bool] {
    &history[1..history.len() - 1]
}
