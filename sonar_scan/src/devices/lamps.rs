//! Near / ok / far lamp bank with foreground and background blinking.

use parking_lot::Mutex;
use sonar_common::device::{DeviceError, DeviceResult, Lamp};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lamp shared with a blink thread.
type SharedLamp = Arc<Mutex<Box<dyn Lamp>>>;

/// Which lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LampId {
    /// Object within the warning threshold (red).
    Near,
    /// Object seen beyond the warning threshold (green).
    Ok,
    /// Liveness pulse / nothing within the yellow radius (yellow).
    Far,
}

impl LampId {
    const fn index(self) -> usize {
        match self {
            Self::Near => 0,
            Self::Ok => 1,
            Self::Far => 2,
        }
    }
}

/// Snapshot of the three outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LampState {
    /// Near lamp.
    pub near: bool,
    /// Ok lamp.
    pub ok: bool,
    /// Far lamp.
    pub far: bool,
}

struct Blinker {
    lamp: LampId,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The three indicator lamps.
pub struct LampBank {
    lamps: [SharedLamp; 3],
    blinker: Option<Blinker>,
}

impl LampBank {
    /// Assemble from the three drivers.
    pub fn new(near: Box<dyn Lamp>, ok: Box<dyn Lamp>, far: Box<dyn Lamp>) -> Self {
        Self {
            lamps: [
                Arc::new(Mutex::new(near)),
                Arc::new(Mutex::new(ok)),
                Arc::new(Mutex::new(far)),
            ],
            blinker: None,
        }
    }

    fn lamp(&self, id: LampId) -> &SharedLamp {
        &self.lamps[id.index()]
    }

    /// Stop a background blink running on `id`, if any.
    fn claim(&mut self, id: LampId) {
        if self.blinker.as_ref().is_some_and(|b| b.lamp == id) {
            self.stop_blink();
        }
    }

    /// Drive `id`.
    pub fn set(&mut self, id: LampId, on: bool) -> DeviceResult<()> {
        self.claim(id);
        self.lamp(id).lock().set(on)
    }

    /// Switch `id` on.
    pub fn on(&mut self, id: LampId) -> DeviceResult<()> {
        self.set(id, true)
    }

    /// Switch `id` off.
    pub fn off(&mut self, id: LampId) -> DeviceResult<()> {
        self.set(id, false)
    }

    /// Invert `id`.
    pub fn toggle(&mut self, id: LampId) -> DeviceResult<()> {
        self.claim(id);
        self.lamp(id).lock().toggle()
    }

    /// Current output of `id`.
    pub fn is_on(&self, id: LampId) -> bool {
        self.lamp(id).lock().is_on()
    }

    /// Snapshot of all outputs.
    pub fn state(&self) -> LampState {
        LampState {
            near: self.is_on(LampId::Near),
            ok: self.is_on(LampId::Ok),
            far: self.is_on(LampId::Far),
        }
    }

    /// Blink `id`.
    ///
    /// `count = None` blinks until `stop_blink()` and is only allowed in the
    /// background. A foreground blink blocks for
    /// `count * (on_time + off_time)` and leaves the lamp off.
    pub fn blink(
        &mut self,
        id: LampId,
        on_time: Duration,
        off_time: Duration,
        count: Option<u32>,
        foreground: bool,
    ) -> DeviceResult<()> {
        self.stop_blink();

        if foreground {
            let Some(count) = count else {
                return Err(DeviceError::OutOfRange(
                    "endless blink requires background mode".to_string(),
                ));
            };
            let lamp = Arc::clone(self.lamp(id));
            for _ in 0..count {
                lamp.lock().set(true)?;
                std::thread::sleep(on_time);
                lamp.lock().set(false)?;
                std::thread::sleep(off_time);
            }
            return Ok(());
        }

        let lamp = Arc::clone(self.lamp(id));
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(format!("blink-{id:?}").to_lowercase())
            .spawn(move || blink_loop(lamp, on_time, off_time, count, thread_stop))
            .map_err(|e| DeviceError::CommunicationError(format!("blink thread: {e}")))?;

        debug!("Background blink started on {:?}", id);
        self.blinker = Some(Blinker {
            lamp: id,
            stop,
            handle,
        });
        Ok(())
    }

    /// Whether a background blink is active.
    pub fn is_blinking(&self) -> bool {
        self.blinker.as_ref().is_some_and(|b| !b.handle.is_finished())
    }

    /// Stop and join the background blink. Idempotent.
    pub fn stop_blink(&mut self) {
        let Some(blinker) = self.blinker.take() else {
            return;
        };
        blinker.stop.store(true, Ordering::SeqCst);
        blinker.handle.thread().unpark();
        if blinker.handle.join().is_err() {
            warn!("Blink thread for {:?} panicked", blinker.lamp);
        }
        debug!("Background blink stopped on {:?}", blinker.lamp);
    }

    /// Stop blinking and switch everything off.
    pub fn all_off(&mut self) -> DeviceResult<()> {
        self.stop_blink();
        for lamp in &self.lamps {
            lamp.lock().set(false)?;
        }
        Ok(())
    }
}

impl Drop for LampBank {
    fn drop(&mut self) {
        self.stop_blink();
    }
}

fn blink_loop(
    lamp: SharedLamp,
    on_time: Duration,
    off_time: Duration,
    count: Option<u32>,
    stop: Arc<AtomicBool>,
) {
    let mut done = 0u32;
    while !stop.load(Ordering::SeqCst) && count.is_none_or(|n| done < n) {
        if let Err(e) = lamp.lock().set(true) {
            warn!("Blink aborted: {}", e);
            return;
        }
        if !wait(on_time, &stop) {
            break;
        }
        if let Err(e) = lamp.lock().set(false) {
            warn!("Blink aborted: {}", e);
            return;
        }
        if !wait(off_time, &stop) {
            break;
        }
        done += 1;
    }
    // Never leave a stopped blink lit.
    let _ = lamp.lock().set(false);
}

/// Sleep up to `period`; `false` when stopped early.
fn wait(period: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + period;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::park_timeout(deadline - now);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
