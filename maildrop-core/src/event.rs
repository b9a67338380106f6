//! The event record queued by the log and dispatched to handlers.

use std::fmt;

use serde::Serialize;

pub use maildrop_engine::EventData;
use maildrop_engine::names;

/// A named notification with two opaque payload fields, emitted by the
/// engine for one session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub data1: EventData,
    pub data2: EventData,
}

impl Event {
    pub fn new(name: impl Into<String>, data1: EventData, data2: EventData) -> Self {
        Self {
            name: name.into(),
            data1,
            data2,
        }
    }

    /// Whether this is the engine's designated error event.
    pub fn is_error(&self) -> bool {
        self.name == names::ERROR
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.name, self.data1, self.data2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_name_and_payloads() {
        let ev = Event::new(
            "INCOMING_MSG",
            EventData::Int(12),
            EventData::Text("hello".into()),
        );
        assert_eq!(ev.to_string(), r#"INCOMING_MSG(12, "hello")"#);
    }

    #[test]
    fn error_event_is_recognized() {
        let ev = Event::new(names::ERROR, EventData::Int(1), EventData::None);
        assert!(ev.is_error());
        assert!(!Event::new("INFO", EventData::None, EventData::None).is_error());
    }

    #[test]
    fn serializes_for_observers() {
        let ev = Event::new("INFO", EventData::None, EventData::Text("ready".into()));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["name"], "INFO");
        assert_eq!(json["data2"]["text"], "ready");
    }
}
