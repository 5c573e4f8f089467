//! IIO ultrasonic ranger with a short median queue.

use heapless::Deque;
use nix::errno::Errno;
use sonar_common::consts::SENSOR_QUEUE_CAPACITY;
use sonar_common::device::{DeviceError, DeviceResult, RangeSensor};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `srf04`-style ranger exposed through IIO.
///
/// Every `read_m()` takes one fresh sample and reports the median of the
/// last `queue_len` samples. A missing echo reads as `0.0`.
pub struct IioRanger {
    path: PathBuf,
    queue: Deque<f64, SENSOR_QUEUE_CAPACITY>,
    queue_len: usize,
    max_range_m: f64,
}

impl IioRanger {
    /// Open the distance attribute at `path`.
    pub fn open(path: &Path, queue_len: usize, max_range_cm: f64) -> DeviceResult<Self> {
        if !(1..=SENSOR_QUEUE_CAPACITY).contains(&queue_len) {
            return Err(DeviceError::InitFailed(format!(
                "sensor queue length {queue_len} outside 1..={SENSOR_QUEUE_CAPACITY}"
            )));
        }
        if !path.exists() {
            return Err(DeviceError::InitFailed(format!(
                "distance attribute {path:?} not found (srf04 overlay loaded?)"
            )));
        }
        info!("Range sensor at {:?} (median of {})", path, queue_len);
        Ok(Self {
            path: path.to_path_buf(),
            queue: Deque::new(),
            queue_len,
            max_range_m: max_range_cm / 100.0,
        })
    }

    fn sample_m(&self) -> DeviceResult<f64> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let mm: f64 = text.trim().parse().map_err(|_| {
                    DeviceError::CommunicationError(format!("bad distance {:?}", text.trim()))
                })?;
                Ok((mm / 1000.0).clamp(0.0, self.max_range_m))
            }
            Err(e) if is_no_echo(&e) => {
                debug!("No echo");
                Ok(0.0)
            }
            Err(e) => Err(DeviceError::io(self.path.display(), e)),
        }
    }

    fn push(&mut self, sample: f64) {
        while self.queue.len() >= self.queue_len {
            self.queue.pop_front();
        }
        // Cannot fail: len < queue_len <= capacity.
        let _ = self.queue.push_back(sample);
    }
}

impl RangeSensor for IioRanger {
    fn read_m(&mut self) -> DeviceResult<f64> {
        let sample = self.sample_m()?;
        self.push(sample);
        Ok(median(self.queue.iter().copied()))
    }

    fn shutdown(&mut self) -> DeviceResult<()> {
        self.queue.clear();
        Ok(())
    }
}

/// The kernel reports a lost echo as EIO or ETIMEDOUT.
fn is_no_echo(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error().map(Errno::from_raw),
        Some(Errno::EIO | Errno::ETIMEDOUT)
    )
}

fn median(samples: impl Iterator<Item = f64>) -> f64 {
    let mut buf: heapless::Vec<f64, SENSOR_QUEUE_CAPACITY> = samples.collect();
    if buf.is_empty() {
        return 0.0;
    }
    buf.sort_unstable_by(f64::total_cmp);
    let mid = buf.len() / 2;
    if buf.len() % 2 == 1 {
        buf[mid]
    } else {
        (buf[mid - 1] + buf[mid]) / 2.0
    }
}
