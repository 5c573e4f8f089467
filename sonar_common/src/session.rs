//! Scan session and point records.
//!
//! These types mirror the durable store contract read by external
//! consumers (dashboard, planner, retention). Status tags are stable
//! lowercase strings and must not be renamed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{ConfigError, ScanConfig};

/// Lifecycle status of a scan session.
///
/// `Running` is the only non-terminal state. Every other state is reached
/// exactly once and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// Sweep in progress (initial).
    Running,
    /// Sweep finished over the whole grid.
    Completed,
    /// Sweep finished but too few valid readings to describe an area.
    CompletedInsufficientPoints,
    /// Operator cancelled the sweep.
    InterruptedByOperator,
    /// Close-object preemption.
    TerminatedCloseObject,
    /// Unexpected failure inside the loop.
    Error,
    /// Left running by a process that did not shut down cleanly.
    InterruptedPriorRun,
}

impl SessionStatus {
    /// All statuses, initial first.
    pub const ALL: [SessionStatus; 7] = [
        Self::Running,
        Self::Completed,
        Self::CompletedInsufficientPoints,
        Self::InterruptedByOperator,
        Self::TerminatedCloseObject,
        Self::Error,
        Self::InterruptedPriorRun,
    ];

    /// Stable store tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedInsufficientPoints => "completed-insufficient-points",
            Self::InterruptedByOperator => "interrupted-by-operator",
            Self::TerminatedCloseObject => "terminated-close-object",
            Self::Error => "error",
            Self::InterruptedPriorRun => "interrupted-prior-run",
        }
    }

    /// Whether the status is final.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether the owning process may write this status.
    ///
    /// `InterruptedPriorRun` is only produced by the orphan sweep of a later
    /// process.
    #[inline]
    pub const fn is_owner_terminal(self) -> bool {
        self.is_terminal() && !matches!(self, Self::InterruptedPriorRun)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown status tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session status tag: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Settings captured with every session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// First angle [deg].
    pub start_angle: f64,
    /// Last angle [deg].
    pub end_angle: f64,
    /// Step [deg].
    pub step_angle: f64,
    /// Near-object warning threshold [cm].
    pub object_threshold_cm: u32,
    /// Servo commands mirrored.
    pub invert_motor_direction: bool,
}

impl ScanSettings {
    /// Build from the effective configuration.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            start_angle: config.sweep.start_angle,
            end_angle: config.sweep.end_angle,
            step_angle: config.sweep.step_angle,
            object_threshold_cm: config.safety.object_threshold_cm,
            invert_motor_direction: config.sweep.invert_motor_direction,
        }
    }

    /// Basic sanity of the sweep parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.step_angle > 0.0 && self.start_angle <= self.end_angle) {
            return Err(ConfigError::ValidationError(format!(
                "invalid sweep {}..{} step {}",
                self.start_angle, self.end_angle, self.step_angle
            )));
        }
        Ok(())
    }
}

/// Geometry summary of a completed sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Area enclosed by the hull of the scan [cm²].
    pub area_cm2: f64,
    /// Hull perimeter [cm].
    pub perimeter_cm: f64,
    /// Extent along x [cm].
    pub max_width_cm: f64,
    /// Largest forward reach along y [cm].
    pub max_depth_cm: f64,
}

/// One scan session as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    /// Store-assigned identity.
    pub id: i64,
    /// Wall-clock start.
    pub start_time: DateTime<Utc>,
    /// Sweep settings.
    pub settings: ScanSettings,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Optional geometry summary.
    pub analysis: Option<AnalysisSummary>,
    /// Optional commentary text.
    pub commentary: Option<String>,
}

/// One distance sample as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Store-assigned identity.
    pub id: i64,
    /// Owning session.
    pub session_id: i64,
    /// Logical sweep angle [deg].
    pub angle: f64,
    /// Measured distance [cm].
    pub distance: f64,
    /// Radial velocity [cm/s].
    pub velocity: f64,
    /// Wall-clock sample instant.
    pub timestamp: DateTime<Utc>,
    /// Cartesian projection [cm], present for valid readings.
    pub x: Option<f64>,
    /// Cartesian projection [cm], present for valid readings.
    pub y: Option<f64>,
}

/// Whether `distance_cm` is a usable reading: strictly inside `(0, max_range)`.
#[inline]
pub fn is_valid_distance(distance_cm: f64, max_range_cm: f64) -> bool {
    distance_cm > 0.0 && distance_cm < max_range_cm
}

/// Project a polar sample onto the scan plane (`x` right, `y` forward).
#[inline]
pub fn project(angle_deg: f64, distance_cm: f64) -> (f64, f64) {
    let rad = angle_deg.to_radians();
    (distance_cm * rad.cos(), distance_cm * rad.sin())
}
