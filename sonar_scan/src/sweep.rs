//! Sweep building blocks: the angle grid, the velocity slot and the
//! lamp policy. All pure; the engine wires them to devices.

use sonar_common::config::ScanConfig;
use sonar_common::consts::MIN_VELOCITY_DT_MS;
use sonar_common::session::{ScanSettings, is_valid_distance};
use std::time::{Duration, Instant};

/// Slack for accumulated float error when comparing against `end`.
const GRID_EPSILON: f64 = 1e-9;

/// Angles `start + k * step` for `k = 0, 1, ...` while `<= end`.
#[derive(Debug, Clone, Copy)]
pub struct AngleGrid {
    start: f64,
    end: f64,
    step: f64,
    k: u32,
}

impl AngleGrid {
    /// Grid of `settings`. `step` must be positive.
    pub fn new(settings: &ScanSettings) -> Self {
        Self {
            start: settings.start_angle,
            end: settings.end_angle,
            step: settings.step_angle,
            k: 0,
        }
    }

    fn angle(&self, k: u32) -> Option<f64> {
        let angle = self.start + f64::from(k) * self.step;
        if angle > self.end + GRID_EPSILON {
            None
        } else {
            // Snap float noise onto the endpoint.
            Some(angle.min(self.end))
        }
    }

    /// Angle at the cursor. The grid ends early rather than let the
    /// counter wrap on absurdly small steps.
    fn current(&self) -> Option<f64> {
        self.k.checked_add(1)?;
        self.angle(self.k)
    }

    /// Angle the next `next()` call yields, without consuming it.
    pub fn peek(&self) -> Option<f64> {
        self.current()
    }

    /// Total number of grid points.
    pub fn point_count(&self) -> usize {
        Self { k: 0, ..*self }.count()
    }
}

impl Iterator for AngleGrid {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let angle = self.current()?;
        self.k += 1;
        Some(angle)
    }
}

/// Single-slot radial velocity estimator.
///
/// Velocity is the difference to the immediately preceding sample divided
/// by the elapsed time; `0` for the first sample and whenever the elapsed
/// time is not above the minimum.
#[derive(Debug, Default)]
pub struct VelocitySlot {
    prev: Option<(f64, Instant)>,
}

impl VelocitySlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `distance_cm` taken at `at`; returns the velocity [cm/s].
    pub fn update(&mut self, distance_cm: f64, at: Instant) -> f64 {
        let velocity = match self.prev {
            Some((prev_cm, prev_at)) => {
                let dt = at.saturating_duration_since(prev_at);
                if dt > Duration::from_millis(MIN_VELOCITY_DT_MS) {
                    (distance_cm - prev_cm) / dt.as_secs_f64()
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.prev = Some((distance_cm, at));
        velocity
    }
}

/// What to do with the far lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FarLamp {
    /// Steady on.
    On,
    /// Invert (liveness pulse).
    Toggle,
}

/// Lamp outputs for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampCommand {
    /// Near lamp.
    pub near: bool,
    /// Ok lamp.
    pub ok: bool,
    /// Far lamp.
    pub far: FarLamp,
}

/// Distance thresholds of one run [cm].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Closer than this preempts the sweep.
    pub termination_cm: f64,
    /// Near lamp at or below this.
    pub object_cm: f64,
    /// Far lamp steady above this.
    pub yellow_cm: f64,
    /// Readings at or above are invalid.
    pub max_range_cm: f64,
}

impl Thresholds {
    /// Thresholds of `config`, with the object threshold taken from
    /// `settings` (operator override).
    pub fn new(config: &ScanConfig, settings: &ScanSettings) -> Self {
        Self {
            termination_cm: f64::from(config.safety.termination_cm),
            object_cm: f64::from(settings.object_threshold_cm),
            yellow_cm: f64::from(config.safety.yellow_threshold_cm),
            max_range_cm: config.max_range_cm(),
        }
    }

    /// Lamp outputs for `distance_cm`.
    ///
    /// Near and ok follow the valid reading; far looks at the raw reading
    /// whether valid or not.
    pub fn lamps(&self, distance_cm: f64) -> LampCommand {
        let valid = is_valid_distance(distance_cm, self.max_range_cm);
        LampCommand {
            near: valid && distance_cm <= self.object_cm,
            ok: valid && distance_cm > self.object_cm,
            far: if distance_cm > self.yellow_cm {
                FarLamp::On
            } else {
                FarLamp::Toggle
            },
        }
    }

    /// Whether `distance_cm` triggers close-object preemption.
    #[inline]
    pub fn is_close_object(&self, distance_cm: f64) -> bool {
        distance_cm > 0.0 && distance_cm < self.termination_cm
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
