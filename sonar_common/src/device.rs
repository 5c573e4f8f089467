//! Device capability traits and error types.
//!
//! This module defines:
//! - `RangeSensor` - distance sampling
//! - `Servo` - angle actuation with settle delay
//! - `Lamp` - one boolean indicator output
//! - `CharDisplay` - fixed-width multi-line character display
//! - `DeviceError` - error type shared by all drivers
//!
//! Drivers implement these traits; the scan engine only ever talks to
//! trait objects, so every engine path runs without physical hardware.
//!
//! # Lifecycle
//!
//! 1. Construction by a driver factory (may fail with `InitFailed`)
//! 2. Operation from the scan loop (blocking calls)
//! 3. `shutdown()` / `detach()` / `close()` during ordered shutdown
//!
//! # Timing Contracts
//!
//! | Operation | Blocks for |
//! |-----------|------------|
//! | `Servo::set_angle()` | settle time |
//! | `RangeSensor::read_m()` | one echo (driver dependent) |
//! | `Lamp::set()` | negligible |
//! | `CharDisplay::write_line()` | bus transfer |

use thiserror::Error;

/// Error types for device operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// Device initialization failed.
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Hardware communication error.
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Commanded value outside the device range.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Driver not found.
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Device already released.
    #[error("Device released: {0}")]
    Released(&'static str),
}

impl DeviceError {
    /// Wrap an I/O error with context.
    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::CommunicationError(format!("{context}: {err}"))
    }
}

/// Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Ultrasonic (or any) range finder.
pub trait RangeSensor: Send {
    /// Take one reading in metres. Never negative.
    ///
    /// A reading with no echo is reported as `0.0` or as the driver's
    /// maximum range, never as an error.
    fn read_m(&mut self) -> DeviceResult<f64>;

    /// Take one reading in centimetres.
    fn read_cm(&mut self) -> DeviceResult<f64> {
        Ok(self.read_m()? * 100.0)
    }

    /// Release the sensor.
    fn shutdown(&mut self) -> DeviceResult<()> {
        Ok(())
    }
}

/// Hobby servo positioned by angle.
pub trait Servo: Send {
    /// Command `angle_deg` and block for the settle time.
    fn set_angle(&mut self, angle_deg: f64) -> DeviceResult<()>;

    /// Release the drive signal. The servo may be moved by hand afterwards.
    fn detach(&mut self) -> DeviceResult<()>;

    /// Last commanded angle, if any.
    fn angle(&self) -> Option<f64>;
}

/// One boolean indicator.
pub trait Lamp: Send {
    /// Drive the output.
    fn set(&mut self, on: bool) -> DeviceResult<()>;

    /// Current output state.
    fn is_on(&self) -> bool;

    /// Switch on.
    fn on(&mut self) -> DeviceResult<()> {
        self.set(true)
    }

    /// Switch off.
    fn off(&mut self) -> DeviceResult<()> {
        self.set(false)
    }

    /// Invert the output.
    fn toggle(&mut self) -> DeviceResult<()> {
        let next = !self.is_on();
        self.set(next)
    }
}

/// Character display with a fixed number of lines.
pub trait CharDisplay: Send {
    /// Overwrite line `row` (0-based) with `text`, already fitted to width.
    fn write_line(&mut self, row: usize, text: &str) -> DeviceResult<()>;

    /// Blank the display.
    fn clear(&mut self) -> DeviceResult<()>;

    /// Release the display. The last content stays visible.
    fn close(&mut self) -> DeviceResult<()> {
        Ok(())
    }
}

/// Fit `text` to exactly `cols` characters: left-aligned, space padded on
/// the right, truncated at the column limit.
pub fn fit_line(text: &str, cols: usize) -> String {
    let mut line: String = text.chars().take(cols).collect();
    let len = line.chars().count();
    line.extend(std::iter::repeat_n(' ', cols - len));
    line
}
