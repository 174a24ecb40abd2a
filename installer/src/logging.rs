//! Process logger for unattended bootstrap runs.
//!
//! Every record goes to stdout, which bootstrap tooling usually captures to
//! a console log. Records at `Info` and above also go to the local syslog
//! daemon under the `authpriv` facility at error severity, so default syslog
//! filters keep them. Debug records are only emitted with `--verbose` and
//! never reach syslog.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::sync::Mutex;
use syslog::{Facility, Formatter3164, LoggerBackend};

/// Process name attached to syslog entries.
pub const SYSLOG_PROCESS: &str = "chronicle-installer";

type SyslogWriter = syslog::Logger<LoggerBackend, Formatter3164>;

/// Severity-filtering logger writing to stdout and, once connected, syslog.
pub struct BootstrapLogger {
    level: LevelFilter,
    syslog: Option<Mutex<SyslogWriter>>,
}

impl BootstrapLogger {
    /// Creates a stdout-only logger at `Info`, or `Debug` when `verbose` is
    /// set.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self {
            level: if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
            syslog: None,
        }
    }

    /// Returns the most verbose level this logger emits.
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Renders a record as a single output line.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronicle_installer::logging::BootstrapLogger;
    /// use log::{Level, Record};
    ///
    /// let record = Record::builder()
    ///     .level(Level::Warn)
    ///     .args(format_args!("retrying"))
    ///     .build();
    /// assert_eq!(BootstrapLogger::render(&record), "warning: retrying");
    /// ```
    #[must_use]
    pub fn render(record: &Record<'_>) -> String {
        match record.level() {
            Level::Info => record.args().to_string(),
            Level::Error => format!("error: {}", record.args()),
            Level::Warn => format!("warning: {}", record.args()),
            Level::Debug | Level::Trace => format!("debug: {}", record.args()),
        }
    }

    fn write_syslog(&self, line: &str) {
        let Some(syslog) = &self.syslog else {
            return;
        };
        // A poisoned lock or a vanished daemon must not abort the run.
        if let Ok(mut writer) = syslog.lock() {
            writer.err(line).unwrap_or_default();
        }
    }
}

/// Returns the RFC 3164 header settings used for syslog entries.
#[must_use]
pub fn syslog_formatter() -> Formatter3164 {
    Formatter3164 {
        facility: Facility::LOG_AUTHPRIV,
        hostname: None,
        process: SYSLOG_PROCESS.to_owned(),
        pid: std::process::id(),
    }
}

impl Log for BootstrapLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::render(record);
        // A closed stdout must not abort the run.
        writeln!(std::io::stdout().lock(), "{line}").unwrap_or_default();
        if record.level() <= Level::Info {
            self.write_syslog(&line);
        }
    }

    fn flush(&self) {
        std::io::stdout().flush().unwrap_or_default();
    }
}

/// Installs a [`BootstrapLogger`] as the global logger.
///
/// When the local syslog socket cannot be reached the logger still writes
/// to stdout and a warning is logged.
///
/// # Errors
///
/// Returns [`SetLoggerError`] when a global logger is already installed.
pub fn init(verbose: bool) -> Result<(), SetLoggerError> {
    let mut logger = BootstrapLogger::new(verbose);
    let syslog_error = match syslog::unix(syslog_formatter()) {
        Ok(writer) => {
            logger.syslog = Some(Mutex::new(writer));
            None
        }
        Err(err) => Some(err),
    };
    let level = logger.level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    if let Some(err) = syslog_error {
        log::warn!("syslog unavailable, logging to stdout only: {err}");
    }
    Ok(())
}
