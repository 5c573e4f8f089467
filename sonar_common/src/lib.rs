//! Sonar Common Library
//!
//! Shared constants, configuration and device contracts for the sonar
//! scanner workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Default thresholds, timing, pins and paths
//! - [`config`] - `ScanConfig` and TOML loading
//! - [`device`] - Device capability traits and `DeviceError`
//! - [`session`] - Session/point records and status tags
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use sonar_common::prelude::*;
//!
//! let config = ScanConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(SessionStatus::Running.as_str(), "running");
//! ```

pub mod config;
pub mod consts;
pub mod device;
pub mod prelude;
pub mod session;
