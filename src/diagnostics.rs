use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// In-memory mirror of every warning and error logged during this run.
///
/// Cloning yields another handle to the same buffer. Entries are kept in
/// append order and reading them never clears the buffer.
#[derive(Clone, Default)]
pub struct DiagnosticSink {
    entries: Arc<Mutex<VecDeque<String>>>,
    max_entries: Option<usize>,
}

impl DiagnosticSink {
    /// Create a sink that keeps only the newest `max_entries` entries when set
    pub fn with_limit(max_entries: Option<usize>) -> Self {
        Self {
            entries: Arc::default(),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a log event. Anything less severe than WARN is ignored.
    pub fn record(&self, level: Level, target: &str, message: &str) {
        // tracing orders more verbose levels higher
        if level > Level::WARN {
            return;
        }
        self.push(format_entry(Local::now(), target, level, message));
    }

    fn push(&self, entry: String) {
        let mut entries = self.lock();
        if let Some(max) = self.max_entries {
            while entries.len() >= max.max(1) {
                entries.pop_front();
            }
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Newline-joined snapshot, or `None` if nothing has been recorded.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(self.snapshot().join("\n"))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A tracing layer that feeds WARN and ERROR events into this sink
    pub fn layer(&self) -> DiagnosticLayer {
        DiagnosticLayer { sink: self.clone() }
    }
}

fn level_name(level: Level) -> &'static str {
    if level == Level::WARN {
        "WARNING"
    } else {
        level.as_str()
    }
}

/// `<timestamp> - <target> - <LEVEL> - <message>`
pub fn format_entry(at: DateTime<Local>, target: &str, level: Level, message: &str) -> String {
    format!(
        "{} - {} - {} - {}",
        at.format("%Y-%m-%d %H:%M:%S,%3f"),
        target,
        level_name(level),
        message
    )
}

pub struct DiagnosticLayer {
    sink: DiagnosticSink,
}

impl<S: Subscriber> Layer<S> for DiagnosticLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.sink
            .record(*metadata.level(), metadata.target(), &visitor.finish());
    }
}

/// Collects the `message` field first, followed by other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
            return;
        }
        // Fields bridged from the `log` crate duplicate the metadata.
        if field.name().starts_with("log.") {
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={:?}", field.name(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_record_ignores_info_and_below() {
        let sink = DiagnosticSink::default();
        sink.record(Level::INFO, "relay", "hello");
        sink.record(Level::DEBUG, "relay", "hello");
        sink.record(Level::TRACE, "relay", "hello");
        assert!(sink.is_empty());
        assert_eq!(sink.render(), None);
    }

    #[test]
    fn test_record_keeps_append_order() {
        let sink = DiagnosticSink::default();
        sink.record(Level::WARN, "relay", "first");
        sink.record(Level::ERROR, "relay", "second");

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with(" - relay - WARNING - first"));
        assert!(entries[1].ends_with(" - relay - ERROR - second"));

        // Reading does not clear.
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.render().unwrap(), entries.join("\n"));
    }

    #[test]
    fn test_clones_share_buffer() {
        let sink = DiagnosticSink::default();
        let other = sink.clone();
        other.record(Level::WARN, "relay", "shared");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let sink = DiagnosticSink::with_limit(Some(2));
        for msg in ["a", "b", "c"] {
            sink.record(Level::WARN, "relay", msg);
        }
        let entries = sink.snapshot();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with("- b"));
        assert!(entries[1].ends_with("- c"));
    }

    #[test]
    fn test_format_entry() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            format_entry(at, "channel_relay::commands", Level::WARN, "denied"),
            "2024-03-09 14:05:07,000 - channel_relay::commands - WARNING - denied"
        );
    }

    #[test]
    fn test_layer_captures_warnings_and_errors() {
        let sink = DiagnosticSink::default();
        let subscriber = tracing_subscriber::registry().with(sink.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("not captured");
            tracing::warn!("disk almost full");
            tracing::error!(chat = 5, "copy failed");
        });

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains(" - WARNING - disk almost full"));
        assert!(entries[1].contains(" - ERROR - copy failed chat=5"));
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let sink = DiagnosticSink::default();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        sink.record(Level::WARN, "relay", &format!("{}-{}", i, j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.len(), 400);
    }
}
