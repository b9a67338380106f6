//! Owned wrappers around opaque engine resources.
//!
//! A handle fetches its underlying engine resource at most once, caches
//! it, and gives it back exactly once when the last clone goes away.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use maildrop_engine::{ChatId, ContactId, Engine, MsgId, RawResource, SessionId};

use crate::error::Result;

/// What a handle points at; selects the engine fetch call.
#[derive(Debug, Clone, Copy)]
enum Target {
    Contact(ContactId),
    Chat(ChatId),
    Message(MsgId),
}

/// State shared by all clones of one handle. The `Drop` impl is the only
/// place the resource is released, so release happens exactly once, after
/// last use.
struct RawHandle {
    engine: Arc<dyn Engine>,
    session: SessionId,
    target: Target,
    cell: OnceCell<RawResource>,
}

impl RawHandle {
    fn new(engine: Arc<dyn Engine>, session: SessionId, target: Target) -> Arc<Self> {
        Arc::new(Self {
            engine,
            session,
            target,
            cell: OnceCell::new(),
        })
    }

    /// The underlying resource, fetched on first use and cached; a second
    /// access reuses the cached token instead of asking the engine again.
    fn raw(&self) -> Result<RawResource> {
        let raw = self.cell.get_or_try_init(|| match self.target {
            Target::Contact(id) => self.engine.get_contact(self.session, id),
            Target::Chat(id) => self.engine.get_chat(self.session, id),
            Target::Message(id) => self.engine.get_message(self.session, id),
        })?;
        Ok(*raw)
    }
}

impl Drop for RawHandle {
    fn drop(&mut self) {
        if let Some(raw) = self.cell.take() {
            self.engine.release_resource(raw);
        }
    }
}

/// A contact known to the session.
#[derive(Clone)]
pub struct Contact {
    inner: Arc<RawHandle>,
    id: ContactId,
}

impl Contact {
    pub(crate) fn new(engine: Arc<dyn Engine>, session: SessionId, id: ContactId) -> Self {
        Self {
            inner: RawHandle::new(engine, session, Target::Contact(id)),
            id,
        }
    }

    pub fn id(&self) -> ContactId {
        self.id
    }

    /// The contact's e-mail address.
    pub fn addr(&self) -> Result<String> {
        let raw = self.inner.raw()?;
        Ok(self.inner.engine.contact_addr(raw)?)
    }

    /// The name to show for this contact; falls back to the address when
    /// no name is known.
    pub fn display_name(&self) -> Result<String> {
        let raw = self.inner.raw()?;
        Ok(self.inner.engine.contact_display_name(raw)?)
    }

    pub fn is_blocked(&self) -> Result<bool> {
        let raw = self.inner.raw()?;
        Ok(self.inner.engine.contact_is_blocked(raw)?)
    }

    pub fn is_verified(&self) -> Result<bool> {
        let raw = self.inner.raw()?;
        Ok(self.inner.engine.contact_is_verified(raw)?)
    }
}

/// A chat within the session.
#[derive(Clone)]
pub struct Chat {
    inner: Arc<RawHandle>,
    id: ChatId,
}

impl Chat {
    pub(crate) fn new(engine: Arc<dyn Engine>, session: SessionId, id: ChatId) -> Self {
        Self {
            inner: RawHandle::new(engine, session, Target::Chat(id)),
            id,
        }
    }

    pub fn id(&self) -> ChatId {
        self.id
    }

    /// Queue a text message for delivery and return its handle. Delivery
    /// itself happens on the outbound transport and is observed through
    /// events.
    pub fn send_text(&self, text: &str) -> Result<Message> {
        let msg_id = self
            .inner
            .engine
            .send_text(self.inner.session, self.id, text)?;
        Ok(Message::new(
            Arc::clone(&self.inner.engine),
            self.inner.session,
            msg_id,
        ))
    }
}

/// A single message.
#[derive(Clone)]
pub struct Message {
    inner: Arc<RawHandle>,
    id: MsgId,
}

impl Message {
    pub(crate) fn new(engine: Arc<dyn Engine>, session: SessionId, id: MsgId) -> Self {
        Self {
            inner: RawHandle::new(engine, session, Target::Message(id)),
            id,
        }
    }

    pub fn id(&self) -> MsgId {
        self.id
    }

    pub fn text(&self) -> Result<String> {
        let raw = self.inner.raw()?;
        Ok(self.inner.engine.msg_text(raw)?)
    }

    /// The chat this message belongs to.
    pub fn chat(&self) -> Result<Chat> {
        let raw = self.inner.raw()?;
        let chat_id = self.inner.engine.msg_chat_id(raw)?;
        Ok(Chat::new(
            Arc::clone(&self.inner.engine),
            self.inner.session,
            chat_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use maildrop_engine::mem::MemEngine;

    fn contact_fixture() -> (Arc<MemEngine>, SessionId, Contact) {
        let engine = Arc::new(MemEngine::new());
        let session = engine.open(Path::new("/tmp/h.db")).unwrap();
        let id = engine
            .create_contact(session, Some("Bob"), "bob@example.org")
            .unwrap();
        let contact = Contact::new(Arc::clone(&engine) as Arc<dyn Engine>, session, id);
        (engine, session, contact)
    }

    #[test]
    fn resource_is_fetched_once_across_accessors() {
        let (engine, _session, contact) = contact_fixture();
        assert_eq!(engine.live_resources(), 0);
        assert_eq!(contact.addr().unwrap(), "bob@example.org");
        assert_eq!(contact.display_name().unwrap(), "Bob");
        assert!(!contact.is_blocked().unwrap());
        assert!(!contact.is_verified().unwrap());
        assert_eq!(engine.live_resources(), 1);
    }

    #[test]
    fn clones_share_one_release() {
        let (engine, _session, contact) = contact_fixture();
        let raw = {
            let copy = contact.clone();
            let _ = copy.addr().unwrap();
            let raw = copy.inner.raw().unwrap();
            drop(copy);
            // A clone is still alive; nothing may be released yet.
            assert_eq!(engine.release_count(raw), 0);
            raw
        };
        drop(contact);
        assert_eq!(engine.release_count(raw), 1);
        assert_eq!(engine.live_resources(), 0);
    }

    #[test]
    fn unfetched_handle_releases_nothing() {
        let (engine, _session, contact) = contact_fixture();
        drop(contact);
        assert_eq!(engine.live_resources(), 0);
    }

    #[test]
    fn message_knows_its_chat() {
        let engine = Arc::new(MemEngine::new());
        let session = engine.open(Path::new("/tmp/h.db")).unwrap();
        let contact_id = engine.create_contact(session, None, "a@example.org").unwrap();
        let chat_id = engine.create_chat_by_contact(session, contact_id).unwrap();
        let chat = Chat::new(Arc::clone(&engine) as Arc<dyn Engine>, session, chat_id);

        let message = chat.send_text("hello").unwrap();
        assert_eq!(message.text().unwrap(), "hello");
        assert_eq!(message.chat().unwrap().id(), chat_id);
    }
}
