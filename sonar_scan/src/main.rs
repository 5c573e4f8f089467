//! # Sonar Scan Binary
//!
//! Sweeps the ultrasonic sensor once over the configured angle grid and
//! records the session.
//!
//! # Usage
//!
//! ```bash
//! # Stock sweep on real hardware
//! sonar_scan
//!
//! # Narrow, fine sweep with a config file
//! sonar_scan --config /etc/sonar/scan.toml --start-angle 45 --end-angle 135 --step-angle 2
//!
//! # No hardware: simulated room, private store
//! sonar_scan --simulate --db /tmp/scan.sqlite3 -v
//! ```
//!
//! # Exit codes
//!
//! `0` completed / interrupted / close-object stop, `1` error, `2` another
//! instance running, `3` device initialization failed, `4` store failure.

use clap::Parser;
use clap::error::ErrorKind;
use sonar_common::config::{ConfigError, ConfigLoader, LogLevel, ScanConfig};
use sonar_common::consts::DEFAULT_DRIVER;
use sonar_scan::driver_registry::DriverRegistry;
use sonar_scan::drivers::simulation;
use sonar_scan::error::{EXIT_FAILURE, EXIT_OK, ScanError, status_exit_code};
use sonar_scan::lock::InstanceLock;
use sonar_scan::{CancelToken, ScanEngine};
use std::path::PathBuf;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Sonar Scan - servo-swept ultrasonic scanner
#[derive(Parser, Debug)]
#[command(name = "sonar_scan")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Sweep an ultrasonic range finder and record the scan")]
#[command(long_about = None)]
struct Args {
    /// First angle [deg]
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    start_angle: Option<f64>,

    /// Last angle [deg], inclusive when on the grid
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    end_angle: Option<f64>,

    /// Step between samples [deg]
    #[arg(long, value_name = "DEG")]
    step_angle: Option<f64>,

    /// Near-object warning threshold [cm]
    #[arg(long, value_name = "CM")]
    threshold: Option<u32>,

    /// Servo mounted reversed: mirror every command
    #[arg(long)]
    invert_motor: bool,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device driver
    #[arg(short, long, default_value = DEFAULT_DRIVER)]
    driver: String,

    /// Force the simulation driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Store file (overrides the configuration)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Configuration file (or defaults) with the command line applied.
    fn effective_config(&self) -> Result<ScanConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::load(path)?,
            None => ScanConfig::default(),
        };
        if let Some(angle) = self.start_angle {
            config.sweep.start_angle = angle;
        }
        if let Some(angle) = self.end_angle {
            config.sweep.end_angle = angle;
        }
        if let Some(step) = self.step_angle {
            config.sweep.step_angle = step;
        }
        if let Some(threshold) = self.threshold {
            config.safety.object_threshold_cm = threshold;
        }
        if self.invert_motor {
            config.sweep.invert_motor_direction = true;
        }
        if let Some(db) = &self.db {
            config.paths.db = db.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn driver_name(&self) -> &str {
        if self.simulate {
            simulation::DRIVER_NAME
        } else {
            &self.driver
        }
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => std::process::exit(report_usage(&e)),
    };
    let config = args.effective_config();

    setup_tracing(
        &args,
        config.as_ref().map_or(LogLevel::Info, |c| c.shared.log_level),
    );

    let code = match config.map_err(ScanError::from).and_then(|c| run(&args, c)) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Print a clap outcome; `--help` / `--version` exit 0, usage errors 1.
fn report_usage(e: &clap::Error) -> i32 {
    // Printing only fails when stdout/stderr is gone; nothing left to tell.
    let _ = e.print();
    usage_exit_code(e.kind())
}

fn usage_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
        _ => EXIT_FAILURE,
    }
}

fn run(args: &Args, config: ScanConfig) -> Result<i32, ScanError> {
    info!("Sonar Scan v{} starting...", env!("CARGO_PKG_VERSION"));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_token.cancel();
    })
    .map_err(|e| ScanError::Signal(e.to_string()))?;

    // Contention exits here, before any device is touched.
    let lock = InstanceLock::acquire(&config.paths.lock, &config.paths.pid)?;

    let registry = DriverRegistry::with_builtin();
    let devices = registry
        .create_devices(args.driver_name(), &config)
        .map_err(ScanError::DeviceInit)?;

    let mut engine = ScanEngine::new(config, lock, devices, cancel)?;
    let status = engine.run();
    info!("Sonar Scan finished: {}", status);
    Ok(status_exit_code(status))
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, level: LogLevel) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
