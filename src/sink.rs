//! Diagnostic sink for handler failures.

use std::sync::Mutex;

use tracing::warn;

/// Write-only channel the dispatcher reports handler failures to.
///
/// There is no structured contract beyond "accepts a string"; messages
/// carry the event type name and the handler's error text.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Default sink: forwards handler failures to `tracing` at WARN level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Sink that captures reports in memory, oldest first.
///
/// Lets tests and embedders that post-process diagnostics observe
/// handler failures without a tracing subscriber.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
