//! Simulation driver: a rectangular room around the scanner.
//!
//! The sensor sits at the origin looking along +y at 90°. Walls are at
//! `x = -left`, `x = +right` and `y = depth`; behind the sensor is open.
//! The range reading follows the last physical servo angle, so inverted
//! mounts and sweep bounds behave as they would on hardware.

use parking_lot::Mutex;
use sonar_common::config::ScanConfig;
use sonar_common::consts::{SERVO_MAX_ANGLE, SERVO_MIN_ANGLE};
use sonar_common::device::{CharDisplay, DeviceError, DeviceResult, Lamp, RangeSensor, Servo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::devices::{DeviceSet, LampBank, MountedServo};

/// Registry name.
pub const DRIVER_NAME: &str = "simulation";

/// Default room [cm].
pub const ROOM_LEFT_CM: f64 = 80.0;
/// Default room [cm].
pub const ROOM_RIGHT_CM: f64 = 120.0;
/// Default room [cm].
pub const ROOM_DEPTH_CM: f64 = 150.0;

/// Axis-aligned room, sensor at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Room {
    /// Distance to the left wall [cm].
    pub left_cm: f64,
    /// Distance to the right wall [cm].
    pub right_cm: f64,
    /// Distance to the front wall [cm].
    pub depth_cm: f64,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            left_cm: ROOM_LEFT_CM,
            right_cm: ROOM_RIGHT_CM,
            depth_cm: ROOM_DEPTH_CM,
        }
    }
}

impl Room {
    /// Distance along the ray at `angle_deg` to the nearest wall, or `None`
    /// when the ray leaves the room.
    pub fn range_at(&self, angle_deg: f64) -> Option<f64> {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let mut nearest: Option<f64> = None;
        let mut hit = |t: f64| {
            if t.is_finite() && t > 0.0 {
                nearest = Some(nearest.map_or(t, |n| n.min(t)));
            }
        };
        if cos > f64::EPSILON {
            hit(self.right_cm / cos);
        }
        if cos < -f64::EPSILON {
            hit(-self.left_cm / cos);
        }
        if sin > f64::EPSILON {
            hit(self.depth_cm / sin);
        }
        nearest
    }
}

/// Factory registered as `simulation`.
pub fn create_devices(config: &ScanConfig) -> DeviceResult<DeviceSet> {
    let angle = Arc::new(Mutex::new(None));
    let sensor = SimSensor {
        room: Room::default(),
        angle: Arc::clone(&angle),
        max_range_cm: config.max_range_cm(),
    };
    let servo = SimServo {
        angle,
        settle: config.timing.servo_settle(),
    };
    info!("Simulated room: {:?}", Room::default());

    Ok(DeviceSet::new(
        DRIVER_NAME,
        Box::new(sensor),
        MountedServo::new(Box::new(servo), &config.sweep),
        LampBank::new(
            Box::new(SimLamp::new("near")),
            Box::new(SimLamp::new("ok")),
            Box::new(SimLamp::new("far")),
        ),
        Some(Box::new(SimDisplay::new(config.display.rows))),
        config.display.cols,
    ))
}

/// Sensor reading the room along the servo's current direction.
pub struct SimSensor {
    room: Room,
    angle: Arc<Mutex<Option<f64>>>,
    max_range_cm: f64,
}

impl RangeSensor for SimSensor {
    fn read_m(&mut self) -> DeviceResult<f64> {
        let Some(angle) = *self.angle.lock() else {
            return Err(DeviceError::CommunicationError(
                "servo not positioned".to_string(),
            ));
        };
        // No echo reads as zero, like the kernel driver on timeout.
        let cm = self
            .room
            .range_at(angle)
            .filter(|cm| *cm < self.max_range_cm)
            .unwrap_or(0.0);
        Ok(cm / 100.0)
    }
}

/// Servo that publishes its angle to the simulated sensor.
pub struct SimServo {
    angle: Arc<Mutex<Option<f64>>>,
    settle: Duration,
}

impl Servo for SimServo {
    fn set_angle(&mut self, angle_deg: f64) -> DeviceResult<()> {
        if !(SERVO_MIN_ANGLE..=SERVO_MAX_ANGLE).contains(&angle_deg) {
            return Err(DeviceError::OutOfRange(format!("servo angle {angle_deg}")));
        }
        *self.angle.lock() = Some(angle_deg);
        std::thread::sleep(self.settle);
        Ok(())
    }

    fn detach(&mut self) -> DeviceResult<()> {
        debug!("Simulated servo detached");
        Ok(())
    }

    fn angle(&self) -> Option<f64> {
        *self.angle.lock()
    }
}

/// Lamp that traces its transitions.
pub struct SimLamp {
    name: &'static str,
    on: bool,
}

impl SimLamp {
    fn new(name: &'static str) -> Self {
        Self { name, on: false }
    }
}

impl Lamp for SimLamp {
    fn set(&mut self, on: bool) -> DeviceResult<()> {
        if on != self.on {
            debug!("Lamp {} {}", self.name, if on { "on" } else { "off" });
        }
        self.on = on;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

/// Display that logs each completed frame.
pub struct SimDisplay {
    lines: Vec<String>,
}

impl SimDisplay {
    fn new(rows: usize) -> Self {
        Self {
            lines: vec![String::new(); rows],
        }
    }
}

impl CharDisplay for SimDisplay {
    fn write_line(&mut self, row: usize, text: &str) -> DeviceResult<()> {
        let line = self
            .lines
            .get_mut(row)
            .ok_or_else(|| DeviceError::OutOfRange(format!("display row {row}")))?;
        *line = text.to_string();
        if row + 1 == self.lines.len() {
            debug!("LCD |{}|", self.lines.join("|"));
        }
        Ok(())
    }

    fn clear(&mut self) -> DeviceResult<()> {
        self.lines.iter_mut().for_each(String::clear);
        Ok(())
    }
}
