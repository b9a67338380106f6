//! Collaborator contract for the maildrop messaging engine.
//!
//! The engine owns protocol, storage and transport internals. This crate
//! specifies only the surface the control layer drives: session open and
//! release, configuration, event-sink registration, contact/chat/message
//! creation and fetch, and the per-transport work primitives. The
//! [`mem`] module ships an in-memory engine implementing the whole
//! contract, used by the control layer's test suite and usable as a
//! loopback backend.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

pub mod error;
pub mod mem;
pub mod names;

pub use error::EngineError;

/// One open engine session. Minted by [`Engine::open`], valid until
/// [`Engine::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contact record id within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactId(pub u32);

/// Chat record id within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub u32);

/// Message record id within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgId(pub u32);

/// The contact id every session reserves for its own account.
pub const SELF_CONTACT_ID: ContactId = ContactId(1);

/// One opaque engine resource (a fetched contact, chat or message).
///
/// Must be released exactly once via [`Engine::release_resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawResource(pub u64);

/// The two independent data-movement directions the engine processes on
/// separate schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Inbound,
    Outbound,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Inbound => "inbound",
            Transport::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque event payload. The engine decides per event name which slots
/// carry what.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventData {
    None,
    Int(i64),
    Text(String),
}

impl fmt::Display for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventData::None => f.write_str("None"),
            EventData::Int(n) => write!(f, "{n}"),
            EventData::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Value a sink hands back to the engine after dispatching an event.
///
/// `None` is the default no-op reply; the engine reads it as "0/empty".
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackReply {
    None,
    Int(i64),
    Bytes(Vec<u8>),
}

/// Receiver for every raw event the engine fires for a session.
///
/// Invoked from engine-internal threads, concurrently with the transport
/// workers; implementations must be thread-safe and re-entrant.
pub trait EventSink: Send + Sync {
    fn on_event(
        &self,
        session: SessionId,
        name: &str,
        data1: EventData,
        data2: EventData,
    ) -> CallbackReply;
}

/// The messaging engine, as seen by the control layer.
///
/// `wait_for_work` blocks until the given transport has new work;
/// `interrupt_wait` is a level signal — issuing it with nothing currently
/// waiting must still wake the next wait.
pub trait Engine: Send + Sync {
    fn open(&self, db_path: &Path) -> Result<SessionId, EngineError>;

    /// Release the session. The caller guarantees nothing will call into
    /// the engine for this session afterwards.
    fn release(&self, session: SessionId);

    fn set_config(&self, session: SessionId, key: &str, value: &str) -> Result<(), EngineError>;
    fn get_config(&self, session: SessionId, key: &str) -> Option<String>;
    fn is_configured(&self, session: SessionId) -> bool;

    fn register_event_sink(&self, session: SessionId, sink: Arc<dyn EventSink>);
    fn unregister_event_sink(&self, session: SessionId);

    /// Start the asynchronous configuration/handshake sequence. Progress
    /// and failure are reported through events, never a return value.
    fn begin_configuration(&self, session: SessionId);

    fn create_contact(
        &self,
        session: SessionId,
        name: Option<&str>,
        addr: &str,
    ) -> Result<ContactId, EngineError>;
    fn create_chat_by_contact(
        &self,
        session: SessionId,
        contact: ContactId,
    ) -> Result<ChatId, EngineError>;
    fn send_text(&self, session: SessionId, chat: ChatId, text: &str)
    -> Result<MsgId, EngineError>;

    fn get_contact(&self, session: SessionId, id: ContactId) -> Result<RawResource, EngineError>;
    fn get_chat(&self, session: SessionId, id: ChatId) -> Result<RawResource, EngineError>;
    fn get_message(&self, session: SessionId, id: MsgId) -> Result<RawResource, EngineError>;

    /// Give a fetched resource back. Releasing the same resource twice is
    /// a caller bug and the engine is free to abort on it.
    fn release_resource(&self, resource: RawResource);

    fn contact_addr(&self, resource: RawResource) -> Result<String, EngineError>;
    fn contact_display_name(&self, resource: RawResource) -> Result<String, EngineError>;
    fn contact_is_blocked(&self, resource: RawResource) -> Result<bool, EngineError>;
    fn contact_is_verified(&self, resource: RawResource) -> Result<bool, EngineError>;
    fn msg_text(&self, resource: RawResource) -> Result<String, EngineError>;
    fn msg_chat_id(&self, resource: RawResource) -> Result<ChatId, EngineError>;

    /// Perform one round of queued jobs for the transport. Returns when
    /// the round is done, whether or not anything was pending.
    fn perform_pending_jobs(&self, session: SessionId, transport: Transport);

    /// Pull new inbound data from the network (inbound transport only).
    fn fetch_new(&self, session: SessionId);

    /// Block until the transport has new work, or until interrupted.
    fn wait_for_work(&self, session: SessionId, transport: Transport);

    /// Wake the transport's blocking wait. Level signal; safe to call
    /// with nothing waiting, and safe to call repeatedly.
    fn interrupt_wait(&self, session: SessionId, transport: Transport);
}
