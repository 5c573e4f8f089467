//! HD44780 display through the kernel `charlcd` device.
//!
//! Escapes used: `\x1b[LI` re-initialise, `\x1b[Lc` cursor off, `\x1b[Lb`
//! backlight on, `\x1b[Lx<col>y<row>;` goto, `\f` clear.

use sonar_common::device::{CharDisplay, DeviceError, DeviceResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const INIT: &str = "\x1b[LI\x1b[Lc\x1b[Lb";
const CLEAR: &str = "\x0c";

/// Character display on `/dev/lcd`.
pub struct CharLcd {
    path: PathBuf,
    file: Option<File>,
    rows: usize,
}

impl CharLcd {
    /// Open and initialise the device node.
    pub fn open(path: &Path, rows: usize) -> DeviceResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| DeviceError::InitFailed(format!("{}: {e}", path.display())))?;
        let mut lcd = Self {
            path: path.to_path_buf(),
            file: Some(file),
            rows,
        };
        lcd.send(INIT)
            .and_then(|()| lcd.send(CLEAR))
            .map_err(|e| DeviceError::InitFailed(e.to_string()))?;
        info!("Display at {:?} ({} rows)", path, rows);
        Ok(lcd)
    }

    fn send(&mut self, bytes: &str) -> DeviceResult<()> {
        let file = self.file.as_mut().ok_or(DeviceError::Released("display"))?;
        file.write_all(bytes.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| DeviceError::io(self.path.display(), e))
    }
}

impl CharDisplay for CharLcd {
    fn write_line(&mut self, row: usize, text: &str) -> DeviceResult<()> {
        if row >= self.rows {
            return Err(DeviceError::OutOfRange(format!("display row {row}")));
        }
        self.send(&format!("\x1b[Lx0y{row};{text}"))
    }

    fn clear(&mut self) -> DeviceResult<()> {
        self.send(CLEAR)
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.file.take();
        Ok(())
    }
}
