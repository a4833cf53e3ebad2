//! Devtools event sink.
//!
//! The store never talks to an inspector transport directly. It pushes
//! [`DevtoolsEvent`]s into an injected [`DevtoolsSink`]; whatever relays them
//! to a panel (a channel, a socket, a test buffer) lives outside this crate.
//! The default sink drops everything, so a store without devtools costs one
//! virtual call per commit.

use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;

/// A single event streamed to an inspector.
#[derive(Debug, Clone, PartialEq)]
pub struct DevtoolsEvent {
    /// Event label, e.g. `"counter/increment"` or `"counter/@hydrate"`.
    pub ty: String,
    /// Optional structured payload.
    pub payload: Option<Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl DevtoolsEvent {
    pub fn new(ty: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            ty: ty.into(),
            payload,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Sink for devtools events.
///
/// Implementations must not block or fail; the store calls `push` from the
/// middle of its commit path.
pub trait DevtoolsSink: Send + Sync {
    fn push(&self, event: DevtoolsEvent);
}

/// Default sink: discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDevtools;

impl DevtoolsSink for NoopDevtools {
    fn push(&self, _event: DevtoolsEvent) {}
}

/// In-memory sink that records every event, for tests and demos.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DevtoolsEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything pushed so far.
    pub fn events(&self) -> Vec<DevtoolsEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event labels only, in push order.
    pub fn types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.ty).collect()
    }
}

impl DevtoolsSink for RecordingSink {
    fn push(&self, event: DevtoolsEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_push_order() {
        let sink = RecordingSink::new();
        sink.push(DevtoolsEvent::new("a/one", None));
        sink.push(DevtoolsEvent::new("a/two", Some(serde_json::json!({"n": 2}))));

        assert_eq!(sink.types(), vec!["a/one", "a/two"]);
        assert_eq!(
            sink.events()[1].payload,
            Some(serde_json::json!({"n": 2}))
        );
    }
}
