//! Hobby servo on a sysfs PWM channel (50 Hz, 0.5–2.5 ms pulse).

use sonar_common::consts::{
    SERVO_MAX_ANGLE, SERVO_MAX_PULSE_NS, SERVO_MIN_ANGLE, SERVO_MIN_PULSE_NS, SERVO_PERIOD_NS,
};
use sonar_common::device::{DeviceError, DeviceResult, Servo};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Servo driven through `/sys/class/pwm/pwmchipN/pwmM`.
pub struct PwmServo {
    dir: PathBuf,
    settle: Duration,
    angle: Option<f64>,
    enabled: bool,
}

impl PwmServo {
    /// Export (if needed) and configure `pwmchip{chip}/pwm{channel}`.
    pub fn open(root: &Path, chip: u32, channel: u32, settle: Duration) -> DeviceResult<Self> {
        let chip_dir = root.join(format!("pwmchip{chip}"));
        let dir = chip_dir.join(format!("pwm{channel}"));
        if !dir.exists() {
            fs::write(chip_dir.join("export"), channel.to_string())
                .map_err(|e| init_failed(&chip_dir, e))?;
        }

        let servo = Self {
            dir,
            settle,
            angle: None,
            enabled: false,
        };
        servo
            .write_attr("period", SERVO_PERIOD_NS)
            .map_err(|e| DeviceError::InitFailed(e.to_string()))?;
        info!("Servo on pwmchip{} channel {}", chip, channel);
        Ok(servo)
    }

    fn write_attr(&self, attr: &str, value: u64) -> DeviceResult<()> {
        let path = self.dir.join(attr);
        fs::write(&path, value.to_string()).map_err(|e| DeviceError::io(path.display(), e))
    }
}

/// Pulse width for `angle_deg`, linear over the servo range.
pub fn pulse_ns(angle_deg: f64) -> u64 {
    let span = (SERVO_MAX_PULSE_NS - SERVO_MIN_PULSE_NS) as f64;
    let frac = (angle_deg - SERVO_MIN_ANGLE) / (SERVO_MAX_ANGLE - SERVO_MIN_ANGLE);
    SERVO_MIN_PULSE_NS + (span * frac.clamp(0.0, 1.0)).round() as u64
}

impl Servo for PwmServo {
    fn set_angle(&mut self, angle_deg: f64) -> DeviceResult<()> {
        if !(SERVO_MIN_ANGLE..=SERVO_MAX_ANGLE).contains(&angle_deg) {
            return Err(DeviceError::OutOfRange(format!("servo angle {angle_deg}")));
        }
        self.write_attr("duty_cycle", pulse_ns(angle_deg))?;
        if !self.enabled {
            self.write_attr("enable", 1)?;
            self.enabled = true;
        }
        self.angle = Some(angle_deg);
        std::thread::sleep(self.settle);
        Ok(())
    }

    fn detach(&mut self) -> DeviceResult<()> {
        if self.enabled {
            self.write_attr("enable", 0)?;
            self.enabled = false;
            debug!("Servo detached");
        }
        Ok(())
    }

    fn angle(&self) -> Option<f64> {
        self.angle
    }
}

impl Drop for PwmServo {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!("Failed to disable servo PWM: {}", e);
        }
    }
}

fn init_failed(path: &Path, err: std::io::Error) -> DeviceError {
    DeviceError::InitFailed(format!("{}: {err}", path.display()))
}
