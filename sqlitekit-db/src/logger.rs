//! Bridge from the `log` facade to an embedder-provided logger.
//!
//! The crate logs through the [`log`] macros. Applications that already
//! install a `log` backend (or `tracing-subscriber`, which captures `log`
//! records) need nothing from this module. Embedders without one can pass
//! a [`Logger`] to [`set_logger`].

use std::sync::{Arc, OnceLock};

/// Trait representing a logger that can log messages at various levels.
///
/// # Examples
///
/// ```rust
/// use sqlitekit_db::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
///
/// sqlitekit_db::logger::set_logger(std::sync::Arc::new(StderrLogger));
/// ```
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Enumeration of possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very low priority, often extremely detailed messages (each step).
    Trace,
    /// Lower priority debugging information (open, prepare, backup lifecycle).
    Debug,
    /// Informational messages.
    Info,
    /// Potentially harmful situations, e.g. a failed rollback on drop.
    Warn,
    /// Errors.
    Error,
}

/// Forwards `log` records to the installed [`Logger`].
struct ForeignLogger;

impl ForeignLogger {
    /// Debug and trace records are only forwarded when they originate from
    /// this crate.
    fn accepts(record: &log::Record<'_>) -> bool {
        let is_record_from_sqlitekit = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("sqlitekit"));
        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;
        is_record_from_sqlitekit || !is_debug_or_trace_level
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        if !Self::accepts(record) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs `logger` as the destination for this crate's log records.
///
/// Only the first call has an effect. If another `log` backend is already
/// installed the logger is stored but never receives records.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }
    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
