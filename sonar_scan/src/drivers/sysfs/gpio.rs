//! Lamp on a sysfs GPIO output.

use sonar_common::device::{DeviceError, DeviceResult, Lamp};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// LED on `/sys/class/gpio/gpioN`.
pub struct GpioLamp {
    pin: u32,
    value_path: PathBuf,
    on: bool,
}

impl GpioLamp {
    /// Export `pin` (if needed), make it an output and switch it off.
    pub fn open(root: &Path, pin: u32) -> DeviceResult<Self> {
        let dir = root.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(|e| {
                DeviceError::InitFailed(format!("export GPIO {pin}: {e}"))
            })?;
        }
        fs::write(dir.join("direction"), "out")
            .map_err(|e| DeviceError::InitFailed(format!("GPIO {pin} direction: {e}")))?;

        let mut lamp = Self {
            pin,
            value_path: dir.join("value"),
            on: true,
        };
        lamp.set(false)
            .map_err(|e| DeviceError::InitFailed(e.to_string()))?;
        debug!("Lamp on GPIO {}", pin);
        Ok(lamp)
    }
}

impl Lamp for GpioLamp {
    fn set(&mut self, on: bool) -> DeviceResult<()> {
        fs::write(&self.value_path, if on { "1" } else { "0" })
            .map_err(|e| DeviceError::io(format!("GPIO {}", self.pin), e))?;
        self.on = on;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

impl Drop for GpioLamp {
    fn drop(&mut self) {
        if self.on {
            if let Err(e) = self.set(false) {
                warn!("Failed to switch GPIO {} off: {}", self.pin, e);
            }
        }
    }
}
