//! Registry of device drivers.
//!
//! A driver is a named factory that builds a complete [`DeviceSet`] from the
//! effective configuration. The binary picks one by name (`--driver`),
//! tests register their own.

use sonar_common::config::ScanConfig;
use sonar_common::device::{DeviceError, DeviceResult};
use std::collections::HashMap;
use tracing::info;

use crate::devices::DeviceSet;
use crate::drivers;

/// Builds every device the engine needs.
///
/// Sensor, servo or lamp failures are fatal (`DeviceError::InitFailed`); a
/// missing display is not and yields a set without one.
pub type DeviceFactory = fn(&ScanConfig) -> DeviceResult<DeviceSet>;

/// Named device factories.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DeviceFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the `null`, `simulation` and `sysfs` drivers.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register(drivers::null::DRIVER_NAME, drivers::null::create_devices);
        reg.register(
            drivers::simulation::DRIVER_NAME,
            drivers::simulation::create_devices,
        );
        reg.register(drivers::sysfs::DRIVER_NAME, drivers::sysfs::create_devices);
        reg
    }

    /// Register a factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DeviceFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DeviceFactory> {
        self.factories.get(name).copied()
    }

    /// Build the device set of driver `name`.
    ///
    /// # Errors
    /// `DeviceError::DriverNotFound` for an unknown name, otherwise whatever
    /// the factory reports.
    pub fn create_devices(&self, name: &str, config: &ScanConfig) -> DeviceResult<DeviceSet> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| DeviceError::DriverNotFound(name.to_string()))?;
        let devices = factory(config)?;
        info!("Devices initialized by driver '{}'", name);
        Ok(devices)
    }

    /// Registered names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(_config: &ScanConfig) -> DeviceResult<DeviceSet> {
        Err(DeviceError::InitFailed("no echo pin".to_string()))
    }

    #[test]
    fn builtin_drivers_are_listed() {
        let reg = DriverRegistry::with_builtin();
        assert_eq!(reg.list_drivers(), vec!["null", "simulation", "sysfs"]);
    }

    #[test]
    fn create_by_name() {
        let reg = DriverRegistry::with_builtin();
        let devices = reg.create_devices("null", &ScanConfig::default()).unwrap();
        assert_eq!(devices.driver(), "null");
    }

    #[test]
    fn unknown_driver() {
        let reg = DriverRegistry::new();
        let result = reg.create_devices("gpiozero", &ScanConfig::default());
        assert!(matches!(result, Err(DeviceError::DriverNotFound(_))));
    }

    #[test]
    fn factory_error_propagates() {
        let mut reg = DriverRegistry::new();
        reg.register("broken", failing);
        let result = reg.create_devices("broken", &ScanConfig::default());
        assert!(matches!(result, Err(DeviceError::InitFailed(_))));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", failing);
        reg.register("dup", failing);
    }
}
