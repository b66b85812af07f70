//! Log pipeline — the application journal shown to operators.
//!
//! Every entry is formatted as `[dd.mm.yyyy HH:MM][PREFIX] items...`, with
//! structured items redacted before they are rendered. A rendered entry is
//! then, in one critical section:
//!   1. pushed onto the bounded in-memory history (oldest evicted first),
//!   2. broadcast to presentation subscribers,
//!   3. appended to the rotating file sink.
//!
//! Entries are mirrored to `tracing` so the daemon's structured output
//! carries the same events. Sink failures are reported through `tracing`
//! only and never reach the caller.

pub mod redact;
pub mod sink;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use self::sink::FileSink;

const BROADCAST_CAPACITY: usize = 512;

/// One argument of a log call: free text or a structured value that is
/// redacted before rendering.
#[derive(Debug, Clone)]
pub enum LogItem {
    Text(String),
    Data(Value),
}

impl From<&str> for LogItem {
    fn from(s: &str) -> Self {
        LogItem::Text(s.to_string())
    }
}

impl From<String> for LogItem {
    fn from(s: String) -> Self {
        LogItem::Text(s)
    }
}

impl From<&String> for LogItem {
    fn from(s: &String) -> Self {
        LogItem::Text(s.clone())
    }
}

impl From<Value> for LogItem {
    fn from(v: Value) -> Self {
        LogItem::Data(v)
    }
}

impl From<&Value> for LogItem {
    fn from(v: &Value) -> Self {
        LogItem::Data(v.clone())
    }
}

impl LogItem {
    /// Wrap any serializable value as a structured (redacted) item.
    pub fn data<T: Serialize + ?Sized>(data: &T) -> Self {
        LogItem::Data(serde_json::to_value(data).unwrap_or(Value::Null))
    }

    fn render(&self, pretty: bool) -> String {
        match self {
            LogItem::Text(s) => s.clone(),
            LogItem::Data(Value::String(s)) => s.clone(),
            LogItem::Data(v) => {
                let redacted = redact::redact(v);
                let rendered = if pretty {
                    serde_json::to_string_pretty(&redacted)
                } else {
                    serde_json::to_string(&redacted)
                };
                rendered.unwrap_or_default()
            }
        }
    }
}

/// An immutable, rendered journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub prefix: String,
    pub message: String,
    /// `[dd.mm.yyyy HH:MM][PREFIX] message`
    pub line: String,
}

/// Settings for the log pipeline, derived from the daemon config.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub debug: bool,
    pub capacity: usize,
    pub file: Option<PathBuf>,
    pub rotate_bytes: u64,
    pub clear_on_start: bool,
}

struct LogState {
    history: VecDeque<LogLine>,
    sink: Option<FileSink>,
}

pub struct Logger {
    debug: bool,
    capacity: usize,
    state: Mutex<LogState>,
    lines: broadcast::Sender<LogLine>,
}

impl Logger {
    pub fn new(settings: &LogSettings) -> Self {
        let sink = settings.file.as_ref().and_then(|path| {
            match FileSink::open(path, settings.rotate_bytes, settings.clear_on_start) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to open log file, file logging disabled");
                    None
                }
            }
        });

        let (lines, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            debug: settings.debug,
            capacity: settings.capacity.max(1),
            state: Mutex::new(LogState {
                history: VecDeque::with_capacity(settings.capacity.min(4096)),
                sink,
            }),
            lines,
        }
    }

    /// History and forwarding only, no file.
    pub fn in_memory(capacity: usize, debug: bool) -> Self {
        Self::new(&LogSettings {
            debug,
            capacity,
            file: None,
            rotate_bytes: u64::MAX,
            clear_on_start: false,
        })
    }

    pub fn record(&self, prefix: &str, items: &[LogItem]) {
        let message = render_items(items, false);
        info!(target: "flux_sweeper::journal", prefix = %prefix, "{}", message);
        self.dispatch(prefix, message);
    }

    /// Like [`Logger::record`] but a no-op unless debug mode is on.
    pub fn record_debug(&self, prefix: &str, items: &[LogItem]) {
        if !self.debug {
            return;
        }
        let message = render_items(items, true);
        debug!(target: "flux_sweeper::journal", prefix = %prefix, "{}", message);
        self.dispatch(prefix, message);
    }

    /// Snapshot of the in-memory history, oldest first.
    pub fn history(&self) -> Vec<LogLine> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.lines.subscribe()
    }

    pub fn file_logging_enabled(&self) -> bool {
        self.lock().sink.as_ref().is_some_and(FileSink::is_enabled)
    }

    /// Flush the file sink. Further records still reach history and
    /// subscribers.
    pub fn close(&self) {
        if let Some(sink) = self.lock().sink.as_mut() {
            sink.flush();
        }
    }

    fn dispatch(&self, prefix: &str, message: String) {
        let now = Utc::now();
        let line = format!(
            "{}[{}] {}",
            now.with_timezone(&Local).format("[%d.%m.%Y %H:%M]"),
            prefix,
            message
        );
        let entry = LogLine {
            timestamp: now,
            prefix: prefix.to_string(),
            message,
            line,
        };

        let mut state = self.lock();

        state.history.push_back(entry.clone());
        while state.history.len() > self.capacity {
            state.history.pop_front();
        }

        // No subscribers is not an error.
        let _ = self.lines.send(entry.clone());

        if let Some(sink) = state.sink.as_mut() {
            if let Err(e) = sink.write_line(&entry.line) {
                warn!(error = %e, "log file write failed, file logging disabled");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn render_items(items: &[LogItem], pretty: bool) -> String {
    items
        .iter()
        .map(|item| item.render(pretty))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_carries_prefix_and_joined_items() {
        let logger = Logger::in_memory(10, false);
        logger.record("DISCOVERY", &["Scanning IP:".into(), "10.0.0.5".into()]);

        let history = logger.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "Scanning IP: 10.0.0.5");
        assert!(history[0].line.starts_with('['));
        assert!(history[0].line.ends_with("[DISCOVERY] Scanning IP: 10.0.0.5"));
    }

    #[test]
    fn structured_items_are_redacted_compactly() {
        let logger = Logger::in_memory(10, false);
        logger.record(
            "MAIN",
            &["auth:".into(), json!({ "loggedIn": true, "token": "abc" }).into()],
        );

        let message = &logger.history()[0].message;
        assert_eq!(message, r#"auth: {"loggedIn":true,"token":"[REDACTED]"}"#);
    }

    #[test]
    fn debug_items_render_pretty() {
        let logger = Logger::in_memory(10, true);
        logger.record_debug("API-n1", &[json!({ "status": "success" }).into()]);

        assert!(logger.history()[0].message.contains('\n'));
    }
}
