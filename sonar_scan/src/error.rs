//! Error types for the scan engine and its collaborators.

use sonar_common::config::ConfigError;
use sonar_common::device::DeviceError;
use sonar_common::session::SessionStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code: completed, operator interrupt or close-object stop.
pub const EXIT_OK: i32 = 0;
/// Exit code: any other failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code: another engine holds the lock.
pub const EXIT_ALREADY_RUNNING: i32 = 2;
/// Exit code: sensor, servo or lamps could not be initialized.
pub const EXIT_DEVICE_INIT: i32 = 3;
/// Exit code: store could not be opened or the session not created.
pub const EXIT_STORE: i32 = 4;

/// Errors of the instance lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("Scan engine already running (pid {})", holder_display(.holder))]
    AlreadyRunning {
        /// Identifier published by the holder, if readable.
        holder: Option<u32>,
    },

    /// Lock or identifier file I/O failed.
    #[error("Lock file error at {path:?}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Source IO error
        source: std::io::Error,
    },

    /// flock(2) failed for a reason other than contention.
    #[error("flock failed: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

fn holder_display(holder: &Option<u32>) -> String {
    holder.map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
}

/// Errors of the point store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Store directory could not be created.
    #[error("Store directory {path:?}: {source}")]
    Io {
        /// Directory involved.
        path: PathBuf,
        /// Source IO error
        source: std::io::Error,
    },

    /// Row contents could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Operation on a closed store.
    #[error("Store is closed")]
    Closed,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Top-level error of a scan run.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Invalid configuration or arguments.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Instance lock failure.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Sensor, servo or lamps failed to initialize.
    #[error("Device initialization failed: {0}")]
    DeviceInit(DeviceError),

    /// Device failure during the sweep.
    #[error("Device failure: {0}")]
    Device(#[from] DeviceError),

    /// Store open/session failure.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// Signal handler could not be installed.
    #[error("Signal handler: {0}")]
    Signal(String),
}

impl ScanError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Lock(LockError::AlreadyRunning { .. }) => EXIT_ALREADY_RUNNING,
            Self::DeviceInit(_) => EXIT_DEVICE_INIT,
            Self::Store(_) => EXIT_STORE,
            _ => EXIT_FAILURE,
        }
    }
}

/// Process exit code for a session that reached `status`.
pub fn status_exit_code(status: SessionStatus) -> i32 {
    match status {
        SessionStatus::Completed
        | SessionStatus::CompletedInsufficientPoints
        | SessionStatus::InterruptedByOperator
        | SessionStatus::TerminatedCloseObject => EXIT_OK,
        SessionStatus::Error | SessionStatus::Running | SessionStatus::InterruptedPriorRun => {
            EXIT_FAILURE
        }
    }
}
