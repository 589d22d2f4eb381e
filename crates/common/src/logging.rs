use std::io::Write;
use std::sync::{Mutex, PoisonError};

use log::kv::Key;
use serde::{Deserialize, Serialize};

use crate::LogLevel;

/// One structured log line, serialized as a single JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
}

impl LogEntry {
    /// An entry stamped with the current time, for lines written outside the
    /// `log` facade (for example before a logger is installed).
    pub fn now(level: &str, component: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp(),
            level: level.to_string(),
            component: component.to_string(),
            request_id: None,
            message: message.into(),
        }
    }

    /// Build an entry from a `log` record. The record target becomes the
    /// component; a `request_id` key-value, when present, is lifted out.
    pub fn from_record(record: &log::Record<'_>) -> Self {
        Self {
            timestamp: timestamp(),
            level: record.level().as_str().to_ascii_lowercase(),
            component: record.target().to_string(),
            request_id: record
                .key_values()
                .get(Key::from_str("request_id"))
                .map(|value| value.to_string()),
            message: record.args().to_string(),
        }
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// `log` backend writing [`LogEntry`] JSON Lines to an output (stderr in
/// production).
pub struct StructuredLogger<W = std::io::Stderr> {
    output: Mutex<W>,
}

impl StructuredLogger<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send + 'static> StructuredLogger<W> {
    pub fn new(output: W) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    /// Install as the global logger and apply the initial level.
    pub fn install(self, level: LogLevel) -> crate::Result<()> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl<W: Write + Send> StructuredLogger<W> {
    fn write_entry(&self, entry: &LogEntry) {
        let Ok(json) = serde_json::to_string(entry) else {
            return;
        };
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = output.write_all(json.as_bytes());
        let _ = output.write_all(b"\n");
        let _ = output.flush();
    }
}

impl<W: Write + Send> log::Log for StructuredLogger<W> {
    // Level filtering happens in the facade via `log::set_max_level`, which
    // `logging/setLevel` adjusts at run time.
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        self.write_entry(&LogEntry::from_record(record));
    }

    fn flush(&self) {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = output.flush();
    }
}
