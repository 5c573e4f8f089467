//! Prelude module for common re-exports.
//!
//! ```rust
//! use sonar_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, ScanConfig};

// ─── Devices ────────────────────────────────────────────────────────
pub use crate::device::{
    CharDisplay, DeviceError, DeviceResult, Lamp, RangeSensor, Servo, fit_line,
};

// ─── Sessions ───────────────────────────────────────────────────────
pub use crate::session::{
    AnalysisSummary, ScanPoint, ScanSession, ScanSettings, SessionStatus, is_valid_distance,
};
