//! # Sonar Scan Library
//!
//! Servo-swept ultrasonic scan engine: sweeps a range finder over an angle
//! grid, records every sample to a SQLite store and reflects progress on
//! three lamps and a character display.
//!
//! # Module Structure
//!
//! - [`engine`] - `ScanEngine`, sweep loop, ordered shutdown
//! - [`sweep`] - Angle grid, velocity slot, lamp policy
//! - [`analysis`] - Convex-hull summary of a finished sweep
//! - [`store`] - Session and point persistence
//! - [`lock`] - Host-wide instance lock and pid file
//! - [`devices`] - `DeviceSet`, mounted servo, lamp bank
//! - [`driver_registry`] - Named device factories
//! - [`drivers`] - `null`, `simulation` and `sysfs` drivers
//! - [`error`] - Error types and exit codes
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      sonar_scan (binary)                      │
//! │  ┌───────────┐   ┌───────────────┐   ┌─────────────────────┐  │
//! │  │ Instance  │──►│  ScanEngine   │◄──│  Driver Registry    │  │
//! │  │ Lock      │   │  (sweep loop) │   │  null / sim / sysfs │  │
//! │  └───────────┘   └──────┬────────┘   └─────────────────────┘  │
//! │                         │                                     │
//! │            ┌────────────┴────────────┐                        │
//! │            ▼                         ▼                        │
//! │   ┌────────────────┐        ┌─────────────────┐               │
//! │   │  DeviceSet     │        │  Store (SQLite) │               │
//! │   │  sensor/servo/ │        │  sessions,      │               │
//! │   │  lamps/display │        │  points         │               │
//! │   └────────────────┘        └─────────────────┘               │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod analysis;
pub mod devices;
pub mod driver_registry;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod lock;
pub mod store;
pub mod sweep;

pub use engine::{CancelToken, ScanEngine};
pub use error::{ScanError, status_exit_code};
