//! Built-in device drivers.
//!
//! Each driver module exposes `DRIVER_NAME` and a `create_devices` factory
//! for the [`DriverRegistry`](crate::driver_registry::DriverRegistry).

pub mod null;
pub mod simulation;
pub mod sysfs;
