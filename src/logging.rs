//! Logging front-end
//!
//! Thin layer over the `log` facade. The level enum and the `log_*!` macros
//! give engine code one vocabulary for severities, including `User`-level
//! fatal reports that must always reach the log.

/// Log levels used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Nothing = 0,
    User = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Debug = 5,
    All = 6,
}

impl LogLevel {
    /// Create a LogLevel from an integer
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => LogLevel::Nothing,
            1 => LogLevel::User,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            6 => LogLevel::All,
            _ => LogLevel::Info,
        }
    }

    /// Get the integer representation
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Matching `log` record level, `None` for `Nothing`
    pub fn to_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::Nothing => None,
            LogLevel::User | LogLevel::Error => Some(log::Level::Error),
            LogLevel::Warning => Some(log::Level::Warn),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::All => Some(log::Level::Trace),
        }
    }

    /// Matching filter for logger initialisation
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self.to_log_level() {
            Some(level) => level.to_level_filter(),
            None => log::LevelFilter::Off,
        }
    }
}

/// Add a log entry at the given level
pub fn log_add(level: LogLevel, message: &str) {
    let Some(record_level) = level.to_log_level() else {
        return;
    };
    if level == LogLevel::User {
        log::log!(target: "padlayer::fatal", record_level, "{}", message);
    } else {
        log::log!(target: "padlayer", record_level, "{}", message);
    }
}

/// Convenience macro for fatal errors
#[macro_export]
macro_rules! log_fatal {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::User, &format!($($arg)*))
    };
}

/// Convenience macro for errors
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Error, &format!($($arg)*))
    };
}

/// Convenience macro for warnings
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Warning, &format!($($arg)*))
    };
}

/// Convenience macro for info messages
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Info, &format!($($arg)*))
    };
}

/// Convenience macro for debug messages
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Debug, &format!($($arg)*))
    };
}
