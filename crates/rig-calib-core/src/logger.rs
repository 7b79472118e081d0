//! Stderr logging for binaries and examples.
//!
//! Lines look like `[  1.234s  INFO rig_calib::calibration] message`.
//! Install once with [`init_with_level`], or with [`init_from_env`] to take
//! the level from `RIG_CALIB_LOG`. With the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` instead.

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt::format::FmtSpan, util::SubscriberInitExt, EnvFilter};

/// Environment variable read by [`init_from_env`].
pub const LEVEL_ENV: &str = "RIG_CALIB_LOG";

struct StderrLogger {
    max_level: LevelFilter,
    epoch: Instant,
}

fn write_line(
    out: &mut impl Write,
    since_start: Duration,
    level: log::Level,
    target: &str,
    args: &fmt::Arguments<'_>,
) -> std::io::Result<()> {
    writeln!(
        out,
        "[{:8.3}s {:>5} {}] {}",
        since_start.as_secs_f64(),
        level,
        target,
        args
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut err = std::io::stderr().lock();
            let _ = write_line(
                &mut err,
                self.epoch.elapsed(),
                record.level(),
                record.target(),
                record.args(),
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`.
///
/// Only the first call installs anything; later calls return `Ok(())` and
/// keep the original level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        max_level: level,
        epoch: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Parse a level name as accepted in `RIG_CALIB_LOG`; case-insensitive.
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    raw.trim().parse().ok()
}

/// Install the stderr logger at the level named by `RIG_CALIB_LOG`
/// (`off`, `error`, `warn`, `info`, `debug`, `trace`); `info` otherwise.
pub fn init_from_env() -> Result<(), log::SetLoggerError> {
    let level = std::env::var(LEVEL_ENV)
        .ok()
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(LevelFilter::Info);
    init_with_level(level)
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default
/// `info`). Span close events carry their timings. A no-op if a global
/// subscriber is already set.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
