//! Log sinks for invocation and reconciliation traces.
//!
//! The invoker and reconciler report what they do through a [`LogSink`].
//! Nothing ever branches on which sink is installed.

/// Receives human-readable trace messages.
pub trait LogSink: Send + Sync {
    /// Records one message.
    fn log(&self, message: &str);
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _message: &str) {}
}

/// Forwards messages to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::debug!(target: "multipass", "{message}");
    }
}

/// Keeps every message in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for RecordingSink {
    fn log(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

#[cfg(test)]
impl LogSink for std::sync::Arc<RecordingSink> {
    fn log(&self, message: &str) {
        self.as_ref().log(message);
    }
}
