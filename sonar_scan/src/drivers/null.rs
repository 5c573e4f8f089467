//! Null driver: inert devices that only remember what they were told.
//!
//! Every handle is cheaply cloneable and shares its state with the boxed
//! instance handed to the engine, so tests can inspect servo commands,
//! lamp edges and display text after (or during) a run.

use parking_lot::Mutex;
use sonar_common::config::ScanConfig;
use sonar_common::device::{CharDisplay, DeviceResult, Lamp, RangeSensor, Servo};
use std::sync::Arc;

use crate::devices::{DeviceSet, LampBank, MountedServo};

/// Registry name.
pub const DRIVER_NAME: &str = "null";

/// Factory registered as `null`: every reading is half the sensor range.
pub fn create_devices(config: &ScanConfig) -> DeviceResult<DeviceSet> {
    let reading_cm = config.max_range_cm() / 2.0;
    Ok(DeviceSet::new(
        DRIVER_NAME,
        Box::new(NullSensor::fixed_cm(reading_cm)),
        MountedServo::new(Box::new(NullServo::new()), &config.sweep),
        LampBank::new(
            Box::new(NullLamp::new()),
            Box::new(NullLamp::new()),
            Box::new(NullLamp::new()),
        ),
        Some(Box::new(NullDisplay::new(config.display.rows))),
        config.display.cols,
    ))
}

// ─── Sensor ─────────────────────────────────────────────────────────

/// Sensor returning a fixed distance.
#[derive(Debug, Clone)]
pub struct NullSensor {
    reading_m: Arc<Mutex<f64>>,
    reads: Arc<Mutex<u64>>,
}

impl NullSensor {
    /// Fixed reading in centimetres.
    pub fn fixed_cm(cm: f64) -> Self {
        Self {
            reading_m: Arc::new(Mutex::new(cm / 100.0)),
            reads: Arc::new(Mutex::new(0)),
        }
    }

    /// Change the reading for subsequent samples.
    pub fn set_cm(&self, cm: f64) {
        *self.reading_m.lock() = cm / 100.0;
    }

    /// Number of samples taken.
    pub fn reads(&self) -> u64 {
        *self.reads.lock()
    }
}

impl RangeSensor for NullSensor {
    fn read_m(&mut self) -> DeviceResult<f64> {
        *self.reads.lock() += 1;
        Ok(self.reading_m.lock().max(0.0))
    }
}

// ─── Servo ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ServoLog {
    commands: Vec<f64>,
    detached: bool,
}

/// Servo that records every commanded angle.
#[derive(Debug, Clone, Default)]
pub struct NullServo {
    log: Arc<Mutex<ServoLog>>,
}

impl NullServo {
    /// New servo with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every commanded angle, in order.
    pub fn commands(&self) -> Vec<f64> {
        self.log.lock().commands.clone()
    }

    /// Whether the last operation was `detach()`.
    pub fn is_detached(&self) -> bool {
        self.log.lock().detached
    }
}

impl Servo for NullServo {
    fn set_angle(&mut self, angle_deg: f64) -> DeviceResult<()> {
        let mut log = self.log.lock();
        log.commands.push(angle_deg);
        log.detached = false;
        Ok(())
    }

    fn detach(&mut self) -> DeviceResult<()> {
        self.log.lock().detached = true;
        Ok(())
    }

    fn angle(&self) -> Option<f64> {
        self.log.lock().commands.last().copied()
    }
}

// ─── Lamp ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LampLog {
    on: bool,
    history: Vec<bool>,
    rising_edges: u32,
}

/// Lamp that records every write.
#[derive(Debug, Clone, Default)]
pub struct NullLamp {
    log: Arc<Mutex<LampLog>>,
}

impl NullLamp {
    /// New lamp, off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value written, in order.
    pub fn history(&self) -> Vec<bool> {
        self.log.lock().history.clone()
    }

    /// Number of off→on transitions.
    pub fn rising_edges(&self) -> u32 {
        self.log.lock().rising_edges
    }
}

impl Lamp for NullLamp {
    fn set(&mut self, on: bool) -> DeviceResult<()> {
        let mut log = self.log.lock();
        if on && !log.on {
            log.rising_edges += 1;
        }
        log.on = on;
        log.history.push(on);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.log.lock().on
    }
}

// ─── Display ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DisplayLog {
    lines: Vec<String>,
    frames: Vec<Vec<String>>,
    closed: bool,
}

/// Display that keeps its current lines and every completed frame.
#[derive(Debug, Clone, Default)]
pub struct NullDisplay {
    log: Arc<Mutex<DisplayLog>>,
}

impl NullDisplay {
    /// Display with `rows` blank lines.
    pub fn new(rows: usize) -> Self {
        let display = Self::default();
        display.log.lock().lines = vec![String::new(); rows];
        display
    }

    /// Current content, one string per line.
    pub fn lines(&self) -> Vec<String> {
        self.log.lock().lines.clone()
    }

    /// Content after every write to the last line.
    pub fn frames(&self) -> Vec<Vec<String>> {
        self.log.lock().frames.clone()
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }
}

impl CharDisplay for NullDisplay {
    fn write_line(&mut self, row: usize, text: &str) -> DeviceResult<()> {
        let mut log = self.log.lock();
        if row >= log.lines.len() {
            log.lines.resize(row + 1, String::new());
        }
        log.lines[row] = text.to_string();
        if row + 1 == log.lines.len() {
            let frame = log.lines.clone();
            log.frames.push(frame);
        }
        Ok(())
    }

    fn clear(&mut self) -> DeviceResult<()> {
        let mut log = self.log.lock();
        log.lines.iter_mut().for_each(String::clear);
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.log.lock().closed = true;
        Ok(())
    }
}
