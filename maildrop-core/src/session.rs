//! One engine session and everything that serves it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use maildrop_engine::{
    ContactId, Engine, EngineError, EventSink, MsgId, SELF_CONTACT_ID, SessionId,
};

use crate::error::Result;
use crate::handle::{Chat, Contact, Message};
use crate::log::EventLog;
use crate::router::CallbackRouter;
use crate::transport::TransportWorkers;

/// An open engine session: the engine handle, the callback router, the
/// event log and the transport worker pair, managed as one unit.
///
/// The engine session handle lives exactly as long as this value and is
/// released once, after both workers have stopped — no component calls
/// into the engine for this session after release. Dropping a session
/// that was never shut down runs the same teardown.
pub struct Session {
    engine: Arc<dyn Engine>,
    id: SessionId,
    router: Arc<CallbackRouter>,
    log: Arc<EventLog>,
    workers: TransportWorkers,
    started: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    /// Open a session with its state at `db_path`.
    pub fn open(engine: Arc<dyn Engine>, db_path: &Path) -> Result<Self> {
        Self::open_with(engine, db_path, None, |_| {})
    }

    /// Open a session with an explicit log label and a chance to add
    /// handlers to the router before the engine can deliver events.
    pub fn open_with(
        engine: Arc<dyn Engine>,
        db_path: &Path,
        label: Option<&str>,
        customize: impl FnOnce(&mut CallbackRouter),
    ) -> Result<Self> {
        let id = engine.open(db_path)?;
        let label = label
            .map(str::to_owned)
            .unwrap_or_else(|| format!("session-{id}"));
        let log = Arc::new(EventLog::new(label, true));
        let mut router = CallbackRouter::new(id, Arc::clone(&log));
        customize(&mut router);
        let workers = TransportWorkers::new(Arc::clone(&engine), id);
        Ok(Self {
            engine,
            id,
            router: Arc::new(router),
            log,
            workers,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session's event log, for observers and tests.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    fn guard_open(&self) {
        assert!(
            !self.closed.load(Ordering::Acquire),
            "session {} used after shutdown",
            self.id
        );
    }

    // ── Configuration ──

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.guard_open();
        Ok(self.engine.set_config(self.id, key, value)?)
    }

    pub fn get_config(&self, key: &str) -> Option<String> {
        self.guard_open();
        self.engine.get_config(self.id, key)
    }

    pub fn is_configured(&self) -> bool {
        self.guard_open();
        self.engine.is_configured(self.id)
    }

    // ── Contacts, chats, messages ──

    /// The contact representing this account. Needs a configured
    /// session.
    pub fn self_contact(&self) -> Result<Contact> {
        self.guard_open();
        if !self.engine.is_configured(self.id) {
            return Err(EngineError::NotConfigured.into());
        }
        Ok(Contact::new(
            Arc::clone(&self.engine),
            self.id,
            SELF_CONTACT_ID,
        ))
    }

    pub fn create_contact(&self, addr: &str, name: Option<&str>) -> Result<Contact> {
        self.guard_open();
        let id = self.engine.create_contact(self.id, name, addr)?;
        Ok(Contact::new(Arc::clone(&self.engine), self.id, id))
    }

    pub fn create_chat_by_contact(&self, contact: &Contact) -> Result<Chat> {
        self.chat_by_contact_id(contact.id())
    }

    pub fn chat_by_contact_id(&self, contact: ContactId) -> Result<Chat> {
        self.guard_open();
        let id = self.engine.create_chat_by_contact(self.id, contact)?;
        Ok(Chat::new(Arc::clone(&self.engine), self.id, id))
    }

    /// Handle for an existing message id. The underlying resource is
    /// fetched lazily by the handle's accessors.
    pub fn message(&self, id: MsgId) -> Message {
        self.guard_open();
        Message::new(Arc::clone(&self.engine), self.id, id)
    }

    // ── Lifecycle ──

    /// Register the router as the engine's event sink, kick off the
    /// asynchronous configuration sequence (progress arrives as events),
    /// and start both transport workers. Starting twice is a bug.
    pub fn start(&self) {
        self.guard_open();
        assert!(
            !self.started.swap(true, Ordering::SeqCst),
            "session {} already started",
            self.id
        );
        self.engine
            .register_event_sink(self.id, Arc::clone(&self.router) as Arc<dyn EventSink>);
        self.engine.begin_configuration(self.id);
        self.workers.start();
    }

    /// Tear the session down: unregister the event sink so no further
    /// callbacks can be dispatched, stop and join both workers, then
    /// release the engine session handle. Exactly that order — the
    /// handle must outlive every worker that calls into the engine.
    ///
    /// Idempotent; later calls (and `Drop`) do nothing.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("shutting down session {}", self.id);
        self.engine.unregister_event_sink(self.id);
        self.workers.stop(true);
        self.engine.release(self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
