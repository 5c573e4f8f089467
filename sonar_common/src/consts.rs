//! System-wide constants for the sonar workspace.
//!
//! Single source of truth for default sweep parameters, safety thresholds,
//! timing, pin assignments and file locations. `ScanConfig` defaults are
//! taken from here; nothing else hard-codes these values.

use static_assertions::const_assert;

// ─── Sweep ──────────────────────────────────────────────────────────

/// Default first angle of the sweep [deg].
pub const DEFAULT_START_ANGLE: f64 = 0.0;

/// Default last angle of the sweep [deg] (inclusive when on the grid).
pub const DEFAULT_END_ANGLE: f64 = 180.0;

/// Default angular step between samples [deg].
pub const DEFAULT_STEP_ANGLE: f64 = 10.0;

/// Mechanical range of the servo [deg].
pub const SERVO_MIN_ANGLE: f64 = 0.0;
/// Mechanical range of the servo [deg].
pub const SERVO_MAX_ANGLE: f64 = 180.0;

// ─── Safety thresholds [cm] ─────────────────────────────────────────

/// Anything closer than this preempts the sweep.
pub const TERMINATION_CM: u32 = 10;

/// Near-object warning threshold (near lamp on at or below).
pub const OBJECT_THRESHOLD_CM: u32 = 20;

/// Above this the far lamp is held on instead of pulsing.
pub const YELLOW_THRESHOLD_CM: u32 = 100;

/// Sensor maximum range. Readings at or above are invalid.
pub const SENSOR_MAX_RANGE_CM: u32 = 200;

const_assert!(TERMINATION_CM > 0);
const_assert!(TERMINATION_CM <= OBJECT_THRESHOLD_CM);
const_assert!(OBJECT_THRESHOLD_CM <= YELLOW_THRESHOLD_CM);
const_assert!(YELLOW_THRESHOLD_CM < SENSOR_MAX_RANGE_CM);

// ─── Timing [ms] ────────────────────────────────────────────────────

/// Target wall-clock interval between successive samples.
pub const LOOP_TARGET_INTERVAL_MS: u64 = 600;

/// Delay after each servo command before the sensor is trusted.
pub const SERVO_SETTLE_MS: u64 = 150;

/// Grace period after pre-positioning the servo at the start angle.
pub const START_GRACE_MS: u64 = 1000;

/// Close-object blink on time.
pub const PREEMPT_BLINK_ON_MS: u64 = 100;
/// Close-object blink off time.
pub const PREEMPT_BLINK_OFF_MS: u64 = 100;
/// Close-object blink count.
pub const PREEMPT_BLINK_COUNT: u32 = 5;

/// Velocity is only derived when samples are further apart than this.
pub const MIN_VELOCITY_DT_MS: u64 = 1;

// ─── Sensor ─────────────────────────────────────────────────────────

/// Default number of queued samples a range sensor may smooth over.
pub const SENSOR_QUEUE_LEN: usize = 3;

/// Fixed capacity of the sensor sample queue.
pub const SENSOR_QUEUE_CAPACITY: usize = 16;

const_assert!(SENSOR_QUEUE_LEN <= SENSOR_QUEUE_CAPACITY);

// ─── Display ────────────────────────────────────────────────────────

/// Character display width.
pub const LCD_COLS: usize = 16;

/// Character display height.
pub const LCD_ROWS: usize = 2;

// ─── Pin assignments (BCM numbering) ────────────────────────────────

/// Ultrasonic trigger pin (wired through the `srf04` IIO overlay).
pub const TRIG_PIN: u32 = 23;
/// Ultrasonic echo pin (wired through the `srf04` IIO overlay).
pub const ECHO_PIN: u32 = 24;
/// Near lamp (red).
pub const LED_NEAR_PIN: u32 = 17;
/// Ok lamp (green).
pub const LED_OK_PIN: u32 = 27;
/// Far lamp (yellow).
pub const LED_FAR_PIN: u32 = 22;
/// Servo PWM chip index (`/sys/class/pwm/pwmchipN`).
pub const SERVO_PWM_CHIP: u32 = 0;
/// Servo PWM channel (GPIO18 = PWM0).
pub const SERVO_PWM_CHANNEL: u32 = 0;
/// Servo PWM period [ns] (50 Hz).
pub const SERVO_PERIOD_NS: u64 = 20_000_000;
/// Servo pulse width at 0° [ns].
pub const SERVO_MIN_PULSE_NS: u64 = 500_000;
/// Servo pulse width at 180° [ns].
pub const SERVO_MAX_PULSE_NS: u64 = 2_500_000;

// ─── Analysis ───────────────────────────────────────────────────────

/// Fewer valid points than this cannot describe an area.
pub const MIN_ANALYSIS_POINTS: usize = 3;

// ─── Paths ──────────────────────────────────────────────────────────

/// Default store location.
pub const DEFAULT_DB_PATH: &str = "/var/lib/sonar/scan_data.sqlite3";

/// Default lock file location.
pub const DEFAULT_LOCK_PATH: &str = "/tmp/sonar_scan.lock";

/// Default identifier file location (sibling of the lock file).
pub const DEFAULT_PID_PATH: &str = "/tmp/sonar_scan.pid";

/// Default IIO distance attribute of the `srf04` driver.
pub const DEFAULT_IIO_DISTANCE_PATH: &str = "/sys/bus/iio/devices/iio:device0/in_distance_raw";

/// Default character display device (`charlcd`).
pub const DEFAULT_LCD_DEVICE: &str = "/dev/lcd";

/// Default driver name.
pub const DEFAULT_DRIVER: &str = "sysfs";
