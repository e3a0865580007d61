//! A `log` backend for the boot tools. Records go to stderr as
//! `[LEVEL] target: message`, leaving stdout to the tool's actual output.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// Environment variable holding the maximum log level.
pub const LOG_ENV: &str = "BOOT_LOG";

pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// A logger whose level is read from [`LOG_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(parse_level(std::env::var(LOG_ENV).ok().as_deref()))
    }

    /// Install as the global logger. Call this once, early in `main`.
    ///
    /// # Errors
    /// If a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

/// `off`, `error`, ... `trace` (any case); [`LevelFilter::Info`] if unset
/// or unparsable.
#[must_use]
pub fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

fn format_record(record: &Record) -> String {
    format!(
        "[{}] {}: {}\n",
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // one write per record keeps lines whole
        let _ = std::io::stderr().write_all(format_record(record).as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
