//! Linux kernel interface driver.
//!
//! - Range: IIO `srf04` ultrasonic ranger (`in_distance_raw`, mm)
//! - Servo: sysfs PWM channel
//! - Lamps: sysfs GPIO outputs
//! - Display: `charlcd` character device
//!
//! Sensor, servo and lamp failures abort initialization; anything already
//! opened is released by its `Drop`. A missing display only logs a warning.

mod gpio;
mod lcd;
mod pwm;
mod ranger;

pub use gpio::GpioLamp;
pub use lcd::CharLcd;
pub use pwm::PwmServo;
pub use ranger::IioRanger;

use sonar_common::config::ScanConfig;
use sonar_common::device::{CharDisplay, DeviceResult};
use std::path::Path;
use tracing::warn;

use crate::devices::{DeviceSet, LampBank, MountedServo};

/// Registry name.
pub const DRIVER_NAME: &str = "sysfs";

/// sysfs GPIO class directory.
pub const GPIO_ROOT: &str = "/sys/class/gpio";

/// sysfs PWM class directory.
pub const PWM_ROOT: &str = "/sys/class/pwm";

/// Factory registered as `sysfs`.
pub fn create_devices(config: &ScanConfig) -> DeviceResult<DeviceSet> {
    create_devices_at(config, Path::new(GPIO_ROOT), Path::new(PWM_ROOT))
}

/// Build against explicit class directories.
pub fn create_devices_at(
    config: &ScanConfig,
    gpio_root: &Path,
    pwm_root: &Path,
) -> DeviceResult<DeviceSet> {
    let sensor = IioRanger::open(
        &config.sensor.iio_distance_path,
        config.sensor.queue_len,
        config.max_range_cm(),
    )?;
    let servo = PwmServo::open(
        pwm_root,
        config.pins.servo_pwm_chip,
        config.pins.servo_pwm_channel,
        config.timing.servo_settle(),
    )?;
    let lamps = LampBank::new(
        Box::new(GpioLamp::open(gpio_root, config.pins.led_near)?),
        Box::new(GpioLamp::open(gpio_root, config.pins.led_ok)?),
        Box::new(GpioLamp::open(gpio_root, config.pins.led_far)?),
    );

    let display: Option<Box<dyn CharDisplay>> =
        match CharLcd::open(&config.display.device, config.display.rows) {
            Ok(lcd) => Some(Box::new(lcd)),
            Err(e) => {
                warn!("Display unavailable: {}", e);
                None
            }
        };

    Ok(DeviceSet::new(
        DRIVER_NAME,
        Box::new(sensor),
        MountedServo::new(Box::new(servo), &config.sweep),
        lamps,
        display,
        config.display.cols,
    ))
}
