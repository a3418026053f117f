//! Core types: error taxonomy, deadline engine, and the process-wide
//! logging interface.

pub mod logger;
pub mod neterror;
pub mod timed;

pub use logger::{ConsoleLogger, FnLogger, LogHandler, LogLevel};
pub use neterror::Error;
pub use timed::{Deadline, DURATION_RESOLUTION};
