//! Configuration loading traits and types.
//!
//! `ScanConfig` is the single configuration document of the scanner. Every
//! field has a default taken from [`crate::consts`], so an empty file (or no
//! file at all) yields the stock sweep.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sonar_common::config::{ConfigError, ConfigLoader, ScanConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ScanConfig::load(Path::new("/etc/sonar/scan.toml"))?;
//!     config.validate()?;
//!     println!("Sweep {}..{}", config.sweep.start_angle, config.sweep.end_angle);
//!     Ok(())
//! }
//! ```

use crate::consts::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "sonar-lab-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SharedConfig {
    /// Logging verbosity level.
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: "sonar_scan".to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Angular sweep parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// First angle [deg].
    pub start_angle: f64,
    /// Last angle [deg], inclusive when it lies on the grid.
    pub end_angle: f64,
    /// Step between samples [deg].
    pub step_angle: f64,
    /// Mirror servo commands (`180 - angle`) for a reversed mount.
    pub invert_motor_direction: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_angle: DEFAULT_START_ANGLE,
            end_angle: DEFAULT_END_ANGLE,
            step_angle: DEFAULT_STEP_ANGLE,
            invert_motor_direction: false,
        }
    }
}

/// Distance thresholds [cm].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetyConfig {
    /// Closer than this preempts the sweep.
    pub termination_cm: u32,
    /// Near-object warning threshold.
    pub object_threshold_cm: u32,
    /// Far lamp steady above this.
    pub yellow_threshold_cm: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            termination_cm: TERMINATION_CM,
            object_threshold_cm: OBJECT_THRESHOLD_CM,
            yellow_threshold_cm: YELLOW_THRESHOLD_CM,
        }
    }
}

/// Loop cadence and device timing [ms].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Target interval between successive samples.
    pub loop_target_interval_ms: u64,
    /// Servo settle time, included in every `set_angle`.
    pub servo_settle_ms: u64,
    /// Wait after pre-positioning at the start angle.
    pub start_grace_ms: u64,
    /// Close-object blink on time.
    pub preempt_blink_on_ms: u64,
    /// Close-object blink off time.
    pub preempt_blink_off_ms: u64,
    /// Close-object blink count.
    pub preempt_blink_count: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            loop_target_interval_ms: LOOP_TARGET_INTERVAL_MS,
            servo_settle_ms: SERVO_SETTLE_MS,
            start_grace_ms: START_GRACE_MS,
            preempt_blink_on_ms: PREEMPT_BLINK_ON_MS,
            preempt_blink_off_ms: PREEMPT_BLINK_OFF_MS,
            preempt_blink_count: PREEMPT_BLINK_COUNT,
        }
    }
}

impl TimingConfig {
    /// Target loop interval as `Duration`.
    pub fn loop_target_interval(&self) -> Duration {
        Duration::from_millis(self.loop_target_interval_ms)
    }

    /// Servo settle time as `Duration`.
    pub fn servo_settle(&self) -> Duration {
        Duration::from_millis(self.servo_settle_ms)
    }

    /// Start grace period as `Duration`.
    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_ms)
    }

    /// All delays zeroed. Used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            loop_target_interval_ms: 0,
            servo_settle_ms: 0,
            start_grace_ms: 0,
            preempt_blink_on_ms: 0,
            preempt_blink_off_ms: 0,
            preempt_blink_count: PREEMPT_BLINK_COUNT,
        }
    }
}

/// Range sensor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    /// Maximum range [cm]. Readings at or above are invalid.
    pub max_range_cm: u32,
    /// Number of queued samples a driver may smooth over.
    pub queue_len: usize,
    /// IIO attribute reporting distance in millimetres.
    pub iio_distance_path: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            max_range_cm: SENSOR_MAX_RANGE_CM,
            queue_len: SENSOR_QUEUE_LEN,
            iio_distance_path: PathBuf::from(DEFAULT_IIO_DISTANCE_PATH),
        }
    }
}

/// Character display geometry and device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Columns per line.
    pub cols: usize,
    /// Number of lines.
    pub rows: usize,
    /// `charlcd` device node.
    pub device: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cols: LCD_COLS,
            rows: LCD_ROWS,
            device: PathBuf::from(DEFAULT_LCD_DEVICE),
        }
    }
}

/// GPIO / PWM assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinConfig {
    /// Ultrasonic trigger (informational, bound by the IIO overlay).
    pub trig: u32,
    /// Ultrasonic echo (informational, bound by the IIO overlay).
    pub echo: u32,
    /// Near lamp GPIO.
    pub led_near: u32,
    /// Ok lamp GPIO.
    pub led_ok: u32,
    /// Far lamp GPIO.
    pub led_far: u32,
    /// Servo PWM chip.
    pub servo_pwm_chip: u32,
    /// Servo PWM channel.
    pub servo_pwm_channel: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            trig: TRIG_PIN,
            echo: ECHO_PIN,
            led_near: LED_NEAR_PIN,
            led_ok: LED_OK_PIN,
            led_far: LED_FAR_PIN,
            servo_pwm_chip: SERVO_PWM_CHIP,
            servo_pwm_channel: SERVO_PWM_CHANNEL,
        }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    /// Store file.
    pub db: PathBuf,
    /// Advisory lock file.
    pub lock: PathBuf,
    /// Identifier file holding the decimal pid.
    pub pid: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from(DEFAULT_DB_PATH),
            lock: PathBuf::from(DEFAULT_LOCK_PATH),
            pid: PathBuf::from(DEFAULT_PID_PATH),
        }
    }
}

impl PathConfig {
    /// Lock and identifier files inside `dir`, store at `dir/scan.sqlite3`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            db: dir.join("scan.sqlite3"),
            lock: dir.join("sonar_scan.lock"),
            pid: dir.join("sonar_scan.pid"),
        }
    }
}

/// Complete scanner configuration.
///
/// # TOML Example
///
/// ```toml
/// [sweep]
/// start_angle = 30.0
/// end_angle = 150.0
/// step_angle = 5.0
///
/// [safety]
/// object_threshold_cm = 25
///
/// [paths]
/// db = "/home/pi/scan.sqlite3"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Logging and identity.
    pub shared: SharedConfig,
    /// Sweep bounds.
    pub sweep: SweepConfig,
    /// Distance thresholds.
    pub safety: SafetyConfig,
    /// Cadence and device timing.
    pub timing: TimingConfig,
    /// Range sensor.
    pub sensor: SensorConfig,
    /// Character display.
    pub display: DisplayConfig,
    /// Pin assignments.
    pub pins: PinConfig,
    /// File locations.
    pub paths: PathConfig,
}

impl ScanConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `step_angle` > 0 and finite
    /// 2. `start_angle` <= `end_angle`, both within the servo range
    /// 3. 0 < termination <= object threshold <= yellow threshold < max range
    /// 4. display has at least one column and two rows
    /// 5. sensor queue length in `1..=SENSOR_QUEUE_CAPACITY`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let sweep = &self.sweep;
        if !(sweep.step_angle.is_finite() && sweep.step_angle > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "step_angle must be > 0 (got {})",
                sweep.step_angle
            )));
        }
        if !(sweep.start_angle.is_finite() && sweep.end_angle.is_finite()) {
            return Err(ConfigError::ValidationError(
                "sweep angles must be finite".to_string(),
            ));
        }
        if sweep.start_angle > sweep.end_angle {
            return Err(ConfigError::ValidationError(format!(
                "start_angle {} is past end_angle {}",
                sweep.start_angle, sweep.end_angle
            )));
        }
        for (name, angle) in [("start_angle", sweep.start_angle), ("end_angle", sweep.end_angle)] {
            if !(SERVO_MIN_ANGLE..=SERVO_MAX_ANGLE).contains(&angle) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} {angle} outside servo range {SERVO_MIN_ANGLE}..={SERVO_MAX_ANGLE}"
                )));
            }
        }

        let safety = &self.safety;
        if safety.termination_cm == 0
            || safety.termination_cm > safety.object_threshold_cm
            || safety.object_threshold_cm > safety.yellow_threshold_cm
            || safety.yellow_threshold_cm >= self.sensor.max_range_cm
        {
            return Err(ConfigError::ValidationError(format!(
                "thresholds must satisfy 0 < termination ({}) <= object ({}) <= yellow ({}) < max range ({})",
                safety.termination_cm,
                safety.object_threshold_cm,
                safety.yellow_threshold_cm,
                self.sensor.max_range_cm
            )));
        }

        if self.display.cols == 0 || self.display.rows < 2 {
            return Err(ConfigError::ValidationError(format!(
                "display must be at least 1x2 (got {}x{})",
                self.display.cols, self.display.rows
            )));
        }

        if self.sensor.queue_len == 0 || self.sensor.queue_len > SENSOR_QUEUE_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "sensor queue_len must be in 1..={SENSOR_QUEUE_CAPACITY} (got {})",
                self.sensor.queue_len
            )));
        }

        Ok(())
    }

    /// Maximum sensor range as `f64` [cm].
    #[inline]
    pub fn max_range_cm(&self) -> f64 {
        f64::from(self.sensor.max_range_cm)
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        tracing::debug!("Parsing configuration from {:?}", path);
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sweep.end_angle, 180.0);
        assert_eq!(config.safety.termination_cm, 10);
        assert_eq!(config.timing.loop_target_interval_ms, 600);
    }

    #[test]
    fn test_zero_step_rejected() {
        let mut config = ScanConfig::default();
        config.sweep.step_angle = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_reversed_bounds_rejected() {
        let mut config = ScanConfig::default();
        config.sweep.start_angle = 120.0;
        config.sweep.end_angle = 60.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_angle_outside_servo_range_rejected() {
        let mut config = ScanConfig::default();
        config.sweep.end_angle = 190.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_order_enforced() {
        let mut config = ScanConfig::default();
        config.safety.object_threshold_cm = 5;
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.safety.yellow_threshold_cm = config.sensor.max_range_cm;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_start_and_end_valid() {
        let mut config = ScanConfig::default();
        config.sweep.start_angle = 90.0;
        config.sweep.end_angle = 90.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = ScanConfig::load(Path::new("/nonexistent/path/scan.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = ScanConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[sweep]\nstart_angel = 10.0\n").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            ScanConfig::load(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[sweep]
start_angle = 30.0
step_angle = 5.0

[shared]
log_level = "debug"

[paths]
db = "/tmp/other.sqlite3"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = ScanConfig::load(file.path()).unwrap();
        assert_eq!(config.sweep.start_angle, 30.0);
        assert_eq!(config.sweep.step_angle, 5.0);
        assert_eq!(config.sweep.end_angle, DEFAULT_END_ANGLE);
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.service_name, "sonar_scan");
        assert_eq!(config.paths.db, PathBuf::from("/tmp/other.sqlite3"));
        assert_eq!(config.paths.lock, PathBuf::from(DEFAULT_LOCK_PATH));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_in_dir_are_siblings() {
        let paths = PathConfig::in_dir(Path::new("/run/sonar"));
        assert_eq!(paths.lock.parent(), paths.pid.parent());
        assert_eq!(paths.db, PathBuf::from("/run/sonar/scan.sqlite3"));
    }
}
