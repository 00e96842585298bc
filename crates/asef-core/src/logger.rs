//! Logger setup for binaries and tests.
//!
//! Library code only talks to the `log` facade. A binary picks one backend:
//! [`init_with_level`] installs a small stderr logger, and [`init_tracing`]
//! (feature `tracing`) installs a `tracing-subscriber` with `log` records
//! bridged into it.
//!
//! The stderr logger prints `[elapsed LEVEL target] message`. Records from
//! crates outside this workspace are shown only at `Warn` and above, so `-vvv`
//! on a binary does not drown eye-locator output in decoder chatter.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Target prefix shared by the workspace crates (`asef`, `asef_core`, `asef_eyes`).
const WORKSPACE_TARGET: &str = "asef";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn max_level_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(WORKSPACE_TARGET) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let secs = self.started.elapsed().as_secs_f64();
        let line = format!(
            "[{secs:8.3}s {:>5} {}] {}\n",
            record.level(),
            record.target(),
            record.args()
        );
        // one write per record keeps lines from interleaving
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with `level` as the maximum for workspace crates.
///
/// Only the first call installs the logger; later calls leave it untouched.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Level for a `-v` count: none is `Warn`, then `Info`, `Debug`, `Trace`.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Directive used when `RUST_LOG` is unset.
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,asef={level},asef_core={level},asef_eyes={level}")
}

/// Install a `tracing` subscriber.
///
/// Filtering comes from `RUST_LOG`, falling back to `info` for the workspace
/// crates. Span close events carry timings of the instrumented entry points.
/// With `json` every event is written as one flattened JSON object.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = tracing_log::LogTracer::init();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(Level::Info)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
