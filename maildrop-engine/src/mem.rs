//! In-memory reference engine.
//!
//! Implements the full [`Engine`] contract against process memory: no
//! network, no disk. The control layer's test suite runs against this,
//! and it doubles as a loopback backend for demos. Work signals are real
//! blocking waits, configuration runs on its own thread and reports
//! progress through events, and resource releases are accounted so tests
//! can assert the release-once law.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::{
    CallbackReply, ChatId, ContactId, Engine, EngineError, EventData, EventSink, MsgId,
    RawResource, SELF_CONTACT_ID, SessionId, Transport, names,
};

/// Ids below this are reserved for well-known records such as the self
/// contact.
const FIRST_DYNAMIC_ID: u32 = 10;

/// Level-triggered wakeup for one transport's blocking wait.
///
/// A notify with no waiter parked is remembered and satisfies the next
/// wait immediately.
#[derive(Default)]
struct WorkSignal {
    pending: Mutex<bool>,
    cvar: Condvar,
}

impl WorkSignal {
    fn wait(&self) {
        let mut pending = self.pending.lock();
        while !*pending {
            self.cvar.wait(&mut pending);
        }
        *pending = false;
    }

    fn notify(&self) {
        *self.pending.lock() = true;
        self.cvar.notify_all();
    }
}

struct ContactRec {
    name: String,
    addr: String,
    blocked: bool,
    verified: bool,
}

struct ChatRec {
    contact: ContactId,
}

struct MsgRec {
    chat: ChatId,
    text: String,
    delivered: bool,
}

/// Snapshot taken when a resource is fetched; released independently of
/// the backing record.
enum ResourceEntry {
    Contact {
        name: String,
        addr: String,
        blocked: bool,
        verified: bool,
    },
    Chat,
    Message {
        text: String,
        chat: ChatId,
    },
}

struct MemSession {
    id: SessionId,
    config: Mutex<HashMap<String, String>>,
    contacts: Mutex<HashMap<ContactId, ContactRec>>,
    chats: Mutex<HashMap<ChatId, ChatRec>>,
    messages: Mutex<HashMap<MsgId, MsgRec>>,
    outbox: Mutex<Vec<MsgId>>,
    staged_incoming: Mutex<Vec<(ChatId, String)>>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    inbound_signal: WorkSignal,
    outbound_signal: WorkSignal,
    configured: AtomicBool,
    next_contact: AtomicU32,
    next_chat: AtomicU32,
    next_msg: AtomicU32,
    jobs_inbound: AtomicU32,
    jobs_outbound: AtomicU32,
    fetches: AtomicU32,
}

impl MemSession {
    fn new(id: SessionId) -> Self {
        let contacts = HashMap::from([(
            SELF_CONTACT_ID,
            ContactRec {
                name: "self".to_string(),
                addr: String::new(),
                blocked: false,
                verified: true,
            },
        )]);
        Self {
            id,
            config: Mutex::new(HashMap::new()),
            contacts: Mutex::new(contacts),
            chats: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
            staged_incoming: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            inbound_signal: WorkSignal::default(),
            outbound_signal: WorkSignal::default(),
            configured: AtomicBool::new(false),
            next_contact: AtomicU32::new(FIRST_DYNAMIC_ID),
            next_chat: AtomicU32::new(FIRST_DYNAMIC_ID),
            next_msg: AtomicU32::new(1),
            jobs_inbound: AtomicU32::new(0),
            jobs_outbound: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        }
    }

    fn signal(&self, transport: Transport) -> &WorkSignal {
        match transport {
            Transport::Inbound => &self.inbound_signal,
            Transport::Outbound => &self.outbound_signal,
        }
    }

    /// Deliver one event to the registered sink, if any. The sink is
    /// cloned out of the lock first: sinks may call back into the engine.
    fn fire(&self, name: &str, data1: EventData, data2: EventData) -> CallbackReply {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink.on_event(self.id, name, data1, data2),
            None => CallbackReply::None,
        }
    }
}

/// In-memory [`Engine`] implementation.
#[derive(Default)]
pub struct MemEngine {
    sessions: Mutex<HashMap<SessionId, Arc<MemSession>>>,
    resources: Mutex<HashMap<RawResource, ResourceEntry>>,
    release_log: Mutex<Vec<RawResource>>,
    next_session: AtomicU64,
    next_resource: AtomicU64,
}

impl MemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, id: SessionId) -> Result<Arc<MemSession>, EngineError> {
        self.sessions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownSession)
    }

    fn mint_resource(&self, entry: ResourceEntry) -> RawResource {
        let resource = RawResource(self.next_resource.fetch_add(1, Ordering::Relaxed) + 1);
        self.resources.lock().insert(resource, entry);
        resource
    }

    // ── Test and observability helpers ──

    /// Queue an incoming message the next `fetch_new` will pick up, and
    /// wake the inbound transport.
    pub fn stage_incoming(
        &self,
        session: SessionId,
        chat: ChatId,
        text: &str,
    ) -> Result<(), EngineError> {
        let sess = self.session(session)?;
        sess.staged_incoming.lock().push((chat, text.to_string()));
        sess.inbound_signal.notify();
        Ok(())
    }

    /// Fire one event at the session's sink and return its reply.
    pub fn emit(
        &self,
        session: SessionId,
        name: &str,
        data1: EventData,
        data2: EventData,
    ) -> Result<CallbackReply, EngineError> {
        Ok(self.session(session)?.fire(name, data1, data2))
    }

    /// How many times `resource` has been released.
    pub fn release_count(&self, resource: RawResource) -> usize {
        self.release_log.lock().iter().filter(|r| **r == resource).count()
    }

    /// Fetched-but-unreleased resource count.
    pub fn live_resources(&self) -> usize {
        self.resources.lock().len()
    }

    /// Whether the outbound transport has delivered `msg` yet.
    pub fn is_delivered(&self, session: SessionId, msg: MsgId) -> bool {
        self.session(session)
            .map(|s| s.messages.lock().get(&msg).is_some_and(|m| m.delivered))
            .unwrap_or(false)
    }

    pub fn jobs_performed(&self, session: SessionId, transport: Transport) -> u32 {
        let Ok(sess) = self.session(session) else {
            return 0;
        };
        match transport {
            Transport::Inbound => sess.jobs_inbound.load(Ordering::Relaxed),
            Transport::Outbound => sess.jobs_outbound.load(Ordering::Relaxed),
        }
    }

    pub fn fetch_count(&self, session: SessionId) -> u32 {
        self.session(session)
            .map(|s| s.fetches.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn has_sink(&self, session: SessionId) -> bool {
        self.session(session)
            .map(|s| s.sink.lock().is_some())
            .unwrap_or(false)
    }

    pub fn is_open(&self, session: SessionId) -> bool {
        self.sessions.lock().contains_key(&session)
    }
}

impl Engine for MemEngine {
    fn open(&self, db_path: &Path) -> Result<SessionId, EngineError> {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
        self.sessions.lock().insert(id, Arc::new(MemSession::new(id)));
        tracing::debug!("opened session {id} for {}", db_path.display());
        Ok(id)
    }

    fn release(&self, session: SessionId) {
        if self.sessions.lock().remove(&session).is_none() {
            panic!("release of unknown session {session} (double release?)");
        }
        tracing::debug!("released session {session}");
    }

    fn set_config(&self, session: SessionId, key: &str, value: &str) -> Result<(), EngineError> {
        let sess = self.session(session)?;
        sess.config.lock().insert(key.to_string(), value.to_string());
        if key == "addr" {
            // The self contact mirrors the configured address.
            if let Some(me) = sess.contacts.lock().get_mut(&SELF_CONTACT_ID) {
                me.addr = value.to_string();
            }
        }
        Ok(())
    }

    fn get_config(&self, session: SessionId, key: &str) -> Option<String> {
        self.session(session).ok()?.config.lock().get(key).cloned()
    }

    fn is_configured(&self, session: SessionId) -> bool {
        self.session(session)
            .map(|s| s.configured.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn register_event_sink(&self, session: SessionId, sink: Arc<dyn EventSink>) {
        if let Ok(sess) = self.session(session) {
            *sess.sink.lock() = Some(sink);
        }
    }

    fn unregister_event_sink(&self, session: SessionId) {
        if let Ok(sess) = self.session(session) {
            *sess.sink.lock() = None;
        }
    }

    fn begin_configuration(&self, session: SessionId) {
        let Ok(sess) = self.session(session) else {
            return;
        };
        // Runs on its own thread so progress events reach the sink from an
        // engine-internal context, like a real backend.
        std::thread::spawn(move || {
            let ok = {
                let cfg = sess.config.lock();
                cfg.contains_key("addr") && cfg.contains_key("mail_pw")
            };
            sess.fire(names::CONFIGURE_PROGRESS, EventData::Int(0), EventData::None);
            if ok {
                sess.fire(names::CONFIGURE_PROGRESS, EventData::Int(500), EventData::None);
                sess.configured.store(true, Ordering::Release);
                sess.fire(names::CONFIGURE_PROGRESS, EventData::Int(1000), EventData::None);
            } else {
                sess.fire(
                    names::ERROR,
                    EventData::Int(1),
                    EventData::Text("configuration needs addr and mail_pw".to_string()),
                );
            }
        });
    }

    fn create_contact(
        &self,
        session: SessionId,
        name: Option<&str>,
        addr: &str,
    ) -> Result<ContactId, EngineError> {
        let sess = self.session(session)?;
        let id = ContactId(sess.next_contact.fetch_add(1, Ordering::Relaxed));
        sess.contacts.lock().insert(
            id,
            ContactRec {
                name: name.unwrap_or_default().to_string(),
                addr: addr.to_string(),
                blocked: false,
                verified: false,
            },
        );
        Ok(id)
    }

    fn create_chat_by_contact(
        &self,
        session: SessionId,
        contact: ContactId,
    ) -> Result<ChatId, EngineError> {
        let sess = self.session(session)?;
        if !sess.contacts.lock().contains_key(&contact) {
            return Err(EngineError::UnknownContact);
        }
        let mut chats = sess.chats.lock();
        if let Some((id, _)) = chats.iter().find(|(_, rec)| rec.contact == contact) {
            return Ok(*id);
        }
        let id = ChatId(sess.next_chat.fetch_add(1, Ordering::Relaxed));
        chats.insert(id, ChatRec { contact });
        Ok(id)
    }

    fn send_text(
        &self,
        session: SessionId,
        chat: ChatId,
        text: &str,
    ) -> Result<MsgId, EngineError> {
        let sess = self.session(session)?;
        if !sess.chats.lock().contains_key(&chat) {
            return Err(EngineError::UnknownChat);
        }
        let id = MsgId(sess.next_msg.fetch_add(1, Ordering::Relaxed));
        sess.messages.lock().insert(
            id,
            MsgRec {
                chat,
                text: text.to_string(),
                delivered: false,
            },
        );
        sess.outbox.lock().push(id);
        // New outbound work.
        sess.outbound_signal.notify();
        Ok(id)
    }

    fn get_contact(&self, session: SessionId, id: ContactId) -> Result<RawResource, EngineError> {
        let sess = self.session(session)?;
        let contacts = sess.contacts.lock();
        let rec = contacts.get(&id).ok_or(EngineError::UnknownContact)?;
        let entry = ResourceEntry::Contact {
            name: rec.name.clone(),
            addr: rec.addr.clone(),
            blocked: rec.blocked,
            verified: rec.verified,
        };
        drop(contacts);
        Ok(self.mint_resource(entry))
    }

    fn get_chat(&self, session: SessionId, id: ChatId) -> Result<RawResource, EngineError> {
        let sess = self.session(session)?;
        if !sess.chats.lock().contains_key(&id) {
            return Err(EngineError::UnknownChat);
        }
        Ok(self.mint_resource(ResourceEntry::Chat))
    }

    fn get_message(&self, session: SessionId, id: MsgId) -> Result<RawResource, EngineError> {
        let sess = self.session(session)?;
        let messages = sess.messages.lock();
        let rec = messages.get(&id).ok_or(EngineError::UnknownMessage)?;
        let entry = ResourceEntry::Message {
            text: rec.text.clone(),
            chat: rec.chat,
        };
        drop(messages);
        Ok(self.mint_resource(entry))
    }

    fn release_resource(&self, resource: RawResource) {
        if self.resources.lock().remove(&resource).is_none() {
            panic!("release of unknown resource {resource:?} (double release?)");
        }
        self.release_log.lock().push(resource);
    }

    fn contact_addr(&self, resource: RawResource) -> Result<String, EngineError> {
        match self.resources.lock().get(&resource) {
            Some(ResourceEntry::Contact { addr, .. }) => Ok(addr.clone()),
            Some(_) => Err(EngineError::WrongResourceKind),
            None => Err(EngineError::UnknownResource),
        }
    }

    fn contact_display_name(&self, resource: RawResource) -> Result<String, EngineError> {
        match self.resources.lock().get(&resource) {
            Some(ResourceEntry::Contact { name, addr, .. }) => {
                if name.is_empty() {
                    Ok(addr.clone())
                } else {
                    Ok(name.clone())
                }
            }
            Some(_) => Err(EngineError::WrongResourceKind),
            None => Err(EngineError::UnknownResource),
        }
    }

    fn contact_is_blocked(&self, resource: RawResource) -> Result<bool, EngineError> {
        match self.resources.lock().get(&resource) {
            Some(ResourceEntry::Contact { blocked, .. }) => Ok(*blocked),
            Some(_) => Err(EngineError::WrongResourceKind),
            None => Err(EngineError::UnknownResource),
        }
    }

    fn contact_is_verified(&self, resource: RawResource) -> Result<bool, EngineError> {
        match self.resources.lock().get(&resource) {
            Some(ResourceEntry::Contact { verified, .. }) => Ok(*verified),
            Some(_) => Err(EngineError::WrongResourceKind),
            None => Err(EngineError::UnknownResource),
        }
    }

    fn msg_text(&self, resource: RawResource) -> Result<String, EngineError> {
        match self.resources.lock().get(&resource) {
            Some(ResourceEntry::Message { text, .. }) => Ok(text.clone()),
            Some(_) => Err(EngineError::WrongResourceKind),
            None => Err(EngineError::UnknownResource),
        }
    }

    fn msg_chat_id(&self, resource: RawResource) -> Result<ChatId, EngineError> {
        match self.resources.lock().get(&resource) {
            Some(ResourceEntry::Message { chat, .. }) => Ok(*chat),
            Some(_) => Err(EngineError::WrongResourceKind),
            None => Err(EngineError::UnknownResource),
        }
    }

    fn perform_pending_jobs(&self, session: SessionId, transport: Transport) {
        let Ok(sess) = self.session(session) else {
            return;
        };
        match transport {
            Transport::Inbound => {
                sess.jobs_inbound.fetch_add(1, Ordering::Relaxed);
            }
            Transport::Outbound => {
                sess.jobs_outbound.fetch_add(1, Ordering::Relaxed);
                let sent: Vec<(ChatId, MsgId)> = {
                    let pending: Vec<MsgId> = sess.outbox.lock().drain(..).collect();
                    let mut messages = sess.messages.lock();
                    pending
                        .into_iter()
                        .filter_map(|id| {
                            messages.get_mut(&id).map(|rec| {
                                rec.delivered = true;
                                (rec.chat, id)
                            })
                        })
                        .collect()
                };
                // Locks dropped before firing: sinks may re-enter.
                for (chat, msg) in sent {
                    sess.fire(
                        names::MSG_DELIVERED,
                        EventData::Int(i64::from(chat.0)),
                        EventData::Int(i64::from(msg.0)),
                    );
                }
            }
        }
    }

    fn fetch_new(&self, session: SessionId) {
        let Ok(sess) = self.session(session) else {
            return;
        };
        sess.fetches.fetch_add(1, Ordering::Relaxed);
        let staged: Vec<(ChatId, String)> = sess.staged_incoming.lock().drain(..).collect();
        for (chat, text) in staged {
            let id = MsgId(sess.next_msg.fetch_add(1, Ordering::Relaxed));
            sess.messages.lock().insert(
                id,
                MsgRec {
                    chat,
                    text,
                    delivered: true,
                },
            );
            sess.fire(
                names::INCOMING_MSG,
                EventData::Int(i64::from(chat.0)),
                EventData::Int(i64::from(id.0)),
            );
        }
    }

    fn wait_for_work(&self, session: SessionId, transport: Transport) {
        if let Ok(sess) = self.session(session) {
            sess.signal(transport).wait();
        }
    }

    fn interrupt_wait(&self, session: SessionId, transport: Transport) {
        if let Ok(sess) = self.session(session) {
            sess.signal(transport).notify();
        }
    }
}
