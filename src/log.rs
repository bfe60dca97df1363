//! Structured file logging for conductor.
//!
//! Log levels:
//! - ERROR: collaborator failures, failed executions, persistence errors
//! - WARN: recovery resets, rejected operations
//! - INFO: graph mutations (plan ingested, task started/completed, split, fix task)
//! - DEBUG: collaborator calls, snapshot installs, store reads and writes
//! - TRACE: raw collaborator output
//!
//! Debug mode is enabled with the `--debug` flag or `CONDUCTOR_DEBUG=1`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub const DEBUG_ENV_VAR: &str = "CONDUCTOR_DEBUG";
const LOG_FILE_NAME: &str = "conductor.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Initialize logging into `~/.conductor/conductor.log`.
pub fn init_with_debug(debug: bool) {
    let dir = dirs::home_dir().map(|h| h.join(".conductor"));
    if let Some(dir) = dir {
        init_at(&dir, debug);
    } else {
        set_level(level_for(debug));
    }
}

/// Initialize logging into `dir/conductor.log`, truncating any previous log.
///
/// The first successful call wins the log path; later calls only adjust the level.
pub fn init_at(dir: &Path, debug: bool) {
    set_level(level_for(debug));

    if std::fs::create_dir_all(dir).is_ok() {
        let path = dir.join(LOG_FILE_NAME);
        let _ = std::fs::write(&path, "");
        LOG_PATH.set(path).ok();
    }
}

fn level_for(debug: bool) -> LogLevel {
    let env_debug = std::env::var(DEBUG_ENV_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Check if debug-level output is enabled.
pub fn is_debug() -> bool {
    get_level() >= LogLevel::Debug
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Path of the active log file, if logging was initialized.
pub fn log_path() -> Option<&'static Path> {
    LOG_PATH.get().map(PathBuf::as_path)
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    if level > get_level() {
        return;
    }

    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
        }
    }
}

pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

pub fn info(msg: &str) {
    log_at(LogLevel::Info, msg);
}

pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

/// Log at INFO level.
#[macro_export]
macro_rules! clog {
    ($($arg:tt)*) => {
        $crate::log::info(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log at DEBUG level (only written in debug mode).
#[macro_export]
macro_rules! clog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
