//! Device layer composition.
//!
//! A [`DeviceSet`] owns one range sensor, one servo (behind a
//! [`MountedServo`] that knows the sweep centre and mount direction), the
//! three-lamp [`LampBank`] and an optional character display. The scan
//! engine owns exactly one `DeviceSet` for the life of the process.

mod lamps;

pub use lamps::{LampBank, LampId, LampState};

use sonar_common::config::SweepConfig;
use sonar_common::consts::SERVO_MAX_ANGLE;
use sonar_common::device::{CharDisplay, DeviceResult, RangeSensor, Servo, fit_line};
use tracing::{info, warn};

/// Servo as mounted on the scanner.
///
/// Takes logical sweep angles; mirrors them to `180 - angle` when the
/// mount is inverted.
pub struct MountedServo {
    servo: Box<dyn Servo>,
    center: f64,
    inverted: bool,
}

impl MountedServo {
    /// Mount `servo` for `sweep`.
    pub fn new(servo: Box<dyn Servo>, sweep: &SweepConfig) -> Self {
        Self {
            servo,
            center: (sweep.start_angle + sweep.end_angle) / 2.0,
            inverted: sweep.invert_motor_direction,
        }
    }

    /// Physical command for a logical angle.
    #[inline]
    pub fn physical_angle(&self, logical: f64) -> f64 {
        if self.inverted {
            SERVO_MAX_ANGLE - logical
        } else {
            logical
        }
    }

    /// Move to `logical` degrees; blocks for the settle time.
    pub fn set_angle(&mut self, logical: f64) -> DeviceResult<()> {
        let physical = self.physical_angle(logical);
        self.servo.set_angle(physical)
    }

    /// Move to the midpoint of the configured sweep.
    pub fn center(&mut self) -> DeviceResult<()> {
        self.set_angle(self.center)
    }

    /// Release the drive signal.
    pub fn detach(&mut self) -> DeviceResult<()> {
        self.servo.detach()
    }
}

/// Every device the engine drives.
pub struct DeviceSet {
    driver: &'static str,
    /// Range finder.
    pub sensor: Box<dyn RangeSensor>,
    /// Sweep servo.
    pub servo: MountedServo,
    /// Indicator lamps.
    pub lamps: LampBank,
    display: Option<Box<dyn CharDisplay>>,
    cols: usize,
    released: bool,
}

impl DeviceSet {
    /// Assemble a device set. `display = None` runs headless.
    pub fn new(
        driver: &'static str,
        sensor: Box<dyn RangeSensor>,
        servo: MountedServo,
        lamps: LampBank,
        display: Option<Box<dyn CharDisplay>>,
        cols: usize,
    ) -> Self {
        if display.is_none() {
            warn!("No character display; continuing without one");
        }
        Self {
            driver,
            sensor,
            servo,
            lamps,
            display,
            cols,
            released: false,
        }
    }

    /// Name of the driver that built this set.
    pub fn driver(&self) -> &'static str {
        self.driver
    }

    /// Whether a display is attached.
    pub fn has_display(&self) -> bool {
        self.display.is_some()
    }

    /// Whether `release()` has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Overwrite both display lines, fitted to the column width.
    ///
    /// Display failures never propagate: the display is dropped and the
    /// scan continues headless.
    pub fn write(&mut self, line1: &str, line2: &str) {
        let Some(display) = self.display.as_mut() else {
            return;
        };
        let result = display
            .write_line(0, &fit_line(line1, self.cols))
            .and_then(|()| display.write_line(1, &fit_line(line2, self.cols)));
        if let Err(e) = result {
            warn!("Display write failed, continuing without display: {}", e);
            self.display = None;
        }
    }

    /// Ordered release: stop blinking, lamps off, detach servo, shut the
    /// sensor down, show `farewell` and close the display. Idempotent;
    /// individual failures are logged.
    pub fn release(&mut self, farewell: Option<(&str, &str)>) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.lamps.all_off() {
            warn!("Failed to switch lamps off: {}", e);
        }
        if let Err(e) = self.servo.detach() {
            warn!("Failed to detach servo: {}", e);
        }
        if let Err(e) = self.sensor.shutdown() {
            warn!("Failed to shut sensor down: {}", e);
        }
        if let Some((line1, line2)) = farewell {
            self.write(line1, line2);
        }
        if let Some(mut display) = self.display.take() {
            if let Err(e) = display.close() {
                warn!("Failed to close display: {}", e);
            }
        }
        info!("Devices released ({})", self.driver);
    }
}

impl Drop for DeviceSet {
    fn drop(&mut self) {
        self.release(None);
    }
}
