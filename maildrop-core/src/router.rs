//! Routes every raw engine event for one session.

use std::collections::HashMap;
use std::sync::Arc;

use maildrop_engine::{CallbackReply, EventData, EventSink, SessionId, names};

use crate::event::Event;
use crate::fetch;
use crate::log::EventLog;

/// A registered event handler. Receives the event payloads; its return
/// value goes back to the engine.
pub type Handler = Box<dyn Fn(&EventData, &EventData) -> CallbackReply + Send + Sync>;

/// The engine's event sink for one session.
///
/// Every event is first recorded to the session's [`EventLog`], then
/// dispatched through an explicit table keyed by the lower-cased event
/// name. Unregistered names get the default no-op reply. The engine may
/// invoke this concurrently from several of its own threads; the table
/// is immutable once the router is shared, so dispatch needs no lock.
pub struct CallbackRouter {
    session: SessionId,
    log: Arc<EventLog>,
    handlers: HashMap<String, Handler>,
}

impl CallbackRouter {
    /// Build a router with the two first-class handlers in place:
    /// `http_get` answers URL-fetch requests (empty bytes on network
    /// failure) and `is_offline` reports "online". Both can be replaced
    /// via [`register`](Self::register) before the router is shared.
    pub fn new(session: SessionId, log: Arc<EventLog>) -> Self {
        let mut router = Self {
            session,
            log,
            handlers: HashMap::new(),
        };
        router.register(names::HTTP_GET, |data1, _| {
            let EventData::Text(url) = data1 else {
                return CallbackReply::Bytes(Vec::new());
            };
            CallbackReply::Bytes(fetch::fetch_url(url))
        });
        // Deliberate stub: transient send failures are the engine's to
        // handle, so the default probe always reports online.
        router.register(names::IS_OFFLINE, |_, _| CallbackReply::Int(0));
        router
    }

    /// Register `handler` for `name` (case-insensitive; event `HTTP_GET`
    /// and key `http_get` are the same entry). Replaces any previous
    /// handler for the name.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&EventData, &EventData) -> CallbackReply + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_ascii_lowercase(), Box::new(handler));
    }
}

impl EventSink for CallbackRouter {
    /// Panics if `session` is not the router's own session: a callback
    /// routed across sessions is a wiring bug, not a recoverable error.
    /// Handler panics propagate to the engine call boundary unchanged.
    fn on_event(
        &self,
        session: SessionId,
        name: &str,
        data1: EventData,
        data2: EventData,
    ) -> CallbackReply {
        assert_eq!(
            session, self.session,
            "event {name} for session {session} reached the router of session {}",
            self.session
        );
        self.log
            .record(Event::new(name, data1.clone(), data2.clone()));
        match self.handlers.get(&name.to_ascii_lowercase()) {
            Some(handler) => handler(&data1, &data2),
            None => CallbackReply::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> (CallbackRouter, Arc<EventLog>) {
        let log = Arc::new(EventLog::new("router-test", false));
        (CallbackRouter::new(SessionId(1), Arc::clone(&log)), log)
    }

    #[test]
    fn every_event_is_recorded_before_dispatch() {
        let (router, log) = router();
        router.on_event(SessionId(1), "UNKNOWN_THING", EventData::Int(9), EventData::None);
        let got = log.get(None, true).unwrap();
        assert_eq!(got.name, "UNKNOWN_THING");
        assert_eq!(got.data1, EventData::Int(9));
    }

    #[test]
    fn unregistered_name_gets_default_reply() {
        let (router, _log) = router();
        let reply = router.on_event(SessionId(1), "NO_SUCH_EVENT", EventData::None, EventData::None);
        assert_eq!(reply, CallbackReply::None);
    }

    #[test]
    fn dispatch_is_case_insensitive_on_event_names() {
        let (mut router, _log) = router();
        router.register("my_probe", |data1, _| match data1 {
            EventData::Int(n) => CallbackReply::Int(n + 1),
            _ => CallbackReply::None,
        });
        let reply = router.on_event(SessionId(1), "MY_PROBE", EventData::Int(41), EventData::None);
        assert_eq!(reply, CallbackReply::Int(42));
    }

    #[test]
    fn is_offline_defaults_to_online() {
        let (router, _log) = router();
        let reply = router.on_event(
            SessionId(1),
            names::IS_OFFLINE,
            EventData::None,
            EventData::None,
        );
        assert_eq!(reply, CallbackReply::Int(0));
    }

    #[test]
    fn http_get_failure_is_empty_bytes_not_an_error() {
        let (router, _log) = router();
        let reply = router.on_event(
            SessionId(1),
            names::HTTP_GET,
            EventData::Text("http://127.0.0.1:1/x".into()),
            EventData::None,
        );
        assert_eq!(reply, CallbackReply::Bytes(Vec::new()));
    }

    #[test]
    fn registering_again_replaces_the_handler() {
        let (mut router, _log) = router();
        router.register(names::IS_OFFLINE, |_, _| CallbackReply::Int(1));
        let reply = router.on_event(
            SessionId(1),
            names::IS_OFFLINE,
            EventData::None,
            EventData::None,
        );
        assert_eq!(reply, CallbackReply::Int(1));
    }

    #[test]
    #[should_panic(expected = "reached the router of session")]
    fn cross_session_event_is_fatal() {
        let (router, _log) = router();
        router.on_event(SessionId(2), "INFO", EventData::None, EventData::None);
    }
}
