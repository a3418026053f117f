//! Pluggable process-wide logger.
//!
//! The library never prints on its own: every message goes through a
//! [`LogHandler`] registered with [`set_logger`] (or a plain callback via
//! [`set_logger_fn`]). Without a registered handler nothing is emitted.
//!
//! Level ordering is `Mute < Error < Warning < Info < Debug < Trace`; a
//! message is emitted when its level is at most the handler's gate level
//! and is not `Mute`. A gate of `Mute` silences everything.
//!
//! Registration is intended to happen once at startup; swapping handlers
//! mid-flight is safe but messages in flight may land on either handler.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Verbosity levels, least to most verbose. `Mute` is a sentinel gate
/// value; no message carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Mute = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(raw: u8) -> LogLevel {
        match raw {
            1 => LogLevel::Error,
            2 => LogLevel::Warning,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Mute,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            LogLevel::Mute => "MUTE",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// Logger interface used by the library.
///
/// `message` must be thread-safe; locking is the implementation's
/// responsibility.
pub trait LogHandler: Send + Sync {
    /// Set the gate level.
    fn set_level(&self, level: LogLevel);

    /// Current gate level.
    fn level(&self) -> LogLevel;

    /// Emit one message. `location` is a `file:line` string.
    fn message(&self, level: LogLevel, location: &str, text: &str);
}

static LOGGER: RwLock<Option<Arc<dyn LogHandler>>> = RwLock::new(None);

/// Install a logger for the whole process. Replaces any previous one.
pub fn set_logger(logger: Arc<dyn LogHandler>) {
    *LOGGER.write().expect("logger registry poisoned") = Some(logger);
}

/// Install a callback-backed logger gated at `level`.
pub fn set_logger_fn<F>(level: LogLevel, log_fn: F)
where
    F: Fn(LogLevel, &str, &str) + Send + Sync + 'static,
{
    set_logger(Arc::new(FnLogger::new(level, log_fn)));
}

/// Change the gate level of the installed logger, if any.
pub fn set_log_level(level: LogLevel) {
    if let Some(logger) = LOGGER.read().expect("logger registry poisoned").as_ref() {
        logger.set_level(level);
    }
}

/// Gate level of the installed logger, `Mute` when none is installed.
pub fn log_level() -> LogLevel {
    LOGGER
        .read()
        .expect("logger registry poisoned")
        .as_ref()
        .map(|logger| logger.level())
        .unwrap_or(LogLevel::Mute)
}

/// Emit a message through the installed logger, subject to its gate.
pub fn log_message(level: LogLevel, location: &str, text: &str) {
    if level == LogLevel::Mute {
        return;
    }
    if let Some(logger) = LOGGER.read().expect("logger registry poisoned").as_ref() {
        if level <= logger.level() {
            logger.message(level, location, text);
        }
    }
}

/// Gate check plus lazy formatting, used by the `log_*!` macros so message
/// bodies are not built when the gate filters them out.
pub(crate) fn log_with<F>(level: LogLevel, location: &str, build: F)
where
    F: FnOnce() -> String,
{
    if let Some(logger) = LOGGER.read().expect("logger registry poisoned").as_ref() {
        if level != LogLevel::Mute && level <= logger.level() {
            logger.message(level, location, &build());
        }
    }
}

macro_rules! log_error {
    ($($arg:tt)+) => {
        $crate::base::logger::log_with(
            $crate::base::logger::LogLevel::Error,
            concat!(file!(), ":", line!()),
            || ::std::format!($($arg)+),
        )
    };
}

macro_rules! log_warn {
    ($($arg:tt)+) => {
        $crate::base::logger::log_with(
            $crate::base::logger::LogLevel::Warning,
            concat!(file!(), ":", line!()),
            || ::std::format!($($arg)+),
        )
    };
}

macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::base::logger::log_with(
            $crate::base::logger::LogLevel::Info,
            concat!(file!(), ":", line!()),
            || ::std::format!($($arg)+),
        )
    };
}

macro_rules! log_debug {
    ($($arg:tt)+) => {
        $crate::base::logger::log_with(
            $crate::base::logger::LogLevel::Debug,
            concat!(file!(), ":", line!()),
            || ::std::format!($($arg)+),
        )
    };
}

macro_rules! log_trace {
    ($($arg:tt)+) => {
        $crate::base::logger::log_with(
            $crate::base::logger::LogLevel::Trace,
            concat!(file!(), ":", line!()),
            || ::std::format!($($arg)+),
        )
    };
}

pub(crate) use {log_debug, log_error, log_info, log_trace, log_warn};

/// Gate-level storage shared by the bundled handlers.
#[derive(Debug)]
struct GateLevel(AtomicU8);

impl GateLevel {
    fn new(level: LogLevel) -> Self {
        GateLevel(AtomicU8::new(level as u8))
    }

    fn get(&self) -> LogLevel {
        LogLevel::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, level: LogLevel) {
        self.0.store(level as u8, Ordering::Relaxed);
    }
}

/// Logger that forwards messages to a user callback.
pub struct FnLogger<F> {
    gate: GateLevel,
    log_fn: F,
}

impl<F> FnLogger<F>
where
    F: Fn(LogLevel, &str, &str) + Send + Sync,
{
    pub fn new(level: LogLevel, log_fn: F) -> Self {
        FnLogger {
            gate: GateLevel::new(level),
            log_fn,
        }
    }
}

impl<F> LogHandler for FnLogger<F>
where
    F: Fn(LogLevel, &str, &str) + Send + Sync,
{
    fn set_level(&self, level: LogLevel) {
        self.gate.set(level);
    }

    fn level(&self) -> LogLevel {
        self.gate.get()
    }

    fn message(&self, level: LogLevel, location: &str, text: &str) {
        (self.log_fn)(level, location, text);
    }
}

/// Default logger: `RFC3339-UTC: LEVEL: location: message`.
/// Errors and warnings go to stderr, everything else to stdout.
pub struct ConsoleLogger {
    gate: GateLevel,
    sync: Mutex<()>,
}

impl ConsoleLogger {
    pub fn new(level: LogLevel) -> Self {
        ConsoleLogger {
            gate: GateLevel::new(level),
            sync: Mutex::new(()),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        ConsoleLogger::new(LogLevel::Trace)
    }
}

impl LogHandler for ConsoleLogger {
    fn set_level(&self, level: LogLevel) {
        self.gate.set(level);
    }

    fn level(&self) -> LogLevel {
        self.gate.get()
    }

    fn message(&self, level: LogLevel, location: &str, text: &str) {
        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("-"));
        let line = format!("{}: {}: {}: {}", stamp, level.tag(), location, text);

        let _held = self.sync.lock().expect("console logger poisoned");
        if level <= LogLevel::Warning {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}
