use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod logging;

pub use logging::{LogEntry, StructuredLogger};

/// Severity levels accepted by `logging/setLevel`, ordered from least to
/// most severe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Notice,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Alert,
        LogLevel::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Alert => "alert",
            LogLevel::Emergency => "emergency",
        }
    }

    /// The `log` facade has five levels; the syslog-style extras collapse
    /// onto the nearest one.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info | LogLevel::Notice => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => {
                log::LevelFilter::Error
            }
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| CommonError::UnknownLogLevel {
                level: s.to_string(),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error(
        "unknown log level `{level}` (expected one of: debug, info, notice, warning, \
         error, critical, alert, emergency)"
    )]
    UnknownLogLevel { level: String },

    #[error("logger already installed: {source}")]
    LoggerInstalled {
        #[from]
        source: log::SetLoggerError,
    },
}

pub type Result<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_every_wire_name() {
        for level in LogLevel::ALL {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = "verbose".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("verbose"));
    }

    #[test]
    fn log_level_serializes_lowercase() {
        let json = serde_json::to_value(LogLevel::Warning).unwrap();
        assert_eq!(json, "warning");
        let level: LogLevel = serde_json::from_value(serde_json::json!("critical")).unwrap();
        assert_eq!(level, LogLevel::Critical);
    }

    #[test]
    fn syslog_levels_collapse_onto_facade_levels() {
        assert_eq!(LogLevel::Notice.to_level_filter(), log::LevelFilter::Info);
        assert_eq!(LogLevel::Warning.to_level_filter(), log::LevelFilter::Warn);
        assert_eq!(LogLevel::Emergency.to_level_filter(), log::LevelFilter::Error);
        assert_eq!(LogLevel::Debug.to_level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::Emergency);
    }
}
