// conversation.rs
// Sessions, messages and the store that owns them

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::SessionPersistence;

const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 50;

/// Creation-ordered message identifier. Allocated by the store's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Locally generated notice (errors, connectivity). Never sent to the model.
    #[serde(rename = "system")]
    Notice,
}

impl Role {
    /// Role name on the wire, or `None` for roles that stay local.
    pub fn wire_name(self) -> Option<&'static str> {
        match self {
            Role::User => Some("user"),
            Role::Assistant => Some("assistant"),
            Role::Notice => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub reasoning_collapsed: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// True when either field carries non-blank text.
    pub fn has_output(&self) -> bool {
        !self.content.trim().is_empty()
            || self.reasoning.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub provider_used: Option<String>,
    #[serde(default)]
    pub system_prompt_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Selection recorded on sessions when they are created or written to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTag {
    pub model: Option<String>,
    pub provider: Option<String>,
    pub system_prompt_id: Option<String>,
}

/// Everything the persistence backend stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub sessions: BTreeMap<SessionId, Session>,
    #[serde(default)]
    pub current_session_id: Option<SessionId>,
    #[serde(default)]
    pub next_message_id: u64,
}

/// Owns every session and the current-session pointer.
pub struct ConversationStore {
    sessions: BTreeMap<SessionId, Session>,
    current: SessionId,
    next_message_id: u64,
    tag: SessionTag,
    backend: Box<dyn SessionPersistence>,
}

impl ConversationStore {
    /// Load state from `backend`, creating a fresh session when none is current.
    pub fn open(backend: Box<dyn SessionPersistence>, tag: SessionTag) -> Result<Self> {
        let snapshot = backend
            .load()
            .context("Failed to load stored conversations")?
            .unwrap_or_default();

        // Never hand out an id that is already in use, even if the counter was lost.
        let highest = snapshot
            .sessions
            .values()
            .flat_map(|s| s.messages.iter())
            .map(|m| m.id.0 + 1)
            .max()
            .unwrap_or(0);

        let current = snapshot
            .current_session_id
            .filter(|id| snapshot.sessions.contains_key(id));

        let mut store = Self {
            sessions: snapshot.sessions,
            current: SessionId(String::new()),
            next_message_id: snapshot.next_message_id.max(highest),
            tag,
            backend,
        };

        match current {
            Some(id) => store.current = id,
            None => {
                store.new_session();
                store.persist()?;
            }
        }
        Ok(store)
    }

    pub fn set_tag(&mut self, tag: SessionTag) {
        self.tag = tag;
    }

    pub fn current_id(&self) -> &SessionId {
        &self.current
    }

    pub fn current(&self) -> &Session {
        // The constructor and every mutator keep `current` pointing at a live session.
        &self.sessions[&self.current]
    }

    #[cfg(test)]
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Sessions ordered most recently touched first.
    pub fn sessions_by_recency(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sessions
    }

    pub fn new_session(&mut self) -> SessionId {
        let base = format!("session_{}", Utc::now().format("%Y%m%d_%H%M%S%3f"));
        let mut id = SessionId(base.clone());
        let mut suffix = 1;
        while self.sessions.contains_key(&id) {
            id = SessionId(format!("{}_{}", base, suffix));
            suffix += 1;
        }

        self.sessions.insert(id.clone(), blank_session(id.clone(), &self.tag));
        self.current = id.clone();
        id
    }

    pub fn switch_session(&mut self, id: &SessionId) -> Result<()> {
        if !self.sessions.contains_key(id) {
            return Err(anyhow!("Unknown session '{}'", id));
        }
        self.current = id.clone();
        Ok(())
    }

    /// Remove a session. If it was current, the most recent remaining session
    /// becomes current, or a new one is created.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<()> {
        if self.sessions.remove(id).is_none() {
            return Err(anyhow!("Unknown session '{}'", id));
        }
        if &self.current == id {
            let next = self.sessions_by_recency().first().map(|s| s.id.clone());
            match next {
                Some(next) => self.current = next,
                None => {
                    self.new_session();
                }
            }
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    /// Append a message to the current session.
    pub fn push_message(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        let id = self.allocate_id();
        let now = Utc::now();
        let tag = self.tag.clone();
        let session = self
            .sessions
            .entry(self.current.clone())
            .or_insert_with_key(|id| blank_session(id.clone(), &tag));

        let content = content.into();
        if role == Role::User && session.messages.is_empty() {
            session.title = make_title(&content);
        }
        session.messages.push(Message {
            id,
            role,
            content,
            reasoning: None,
            reasoning_collapsed: false,
            timestamp: now,
        });
        session.timestamp = now;
        session.model_used = tag.model;
        session.provider_used = tag.provider;
        session.system_prompt_id = tag.system_prompt_id;
        id
    }

    pub fn message(&self, session: &SessionId, id: MessageId) -> Option<&Message> {
        self.sessions
            .get(session)
            .and_then(|s| s.messages.iter().find(|m| m.id == id))
    }

    pub fn message_mut(&mut self, session: &SessionId, id: MessageId) -> Option<&mut Message> {
        self.sessions
            .get_mut(session)
            .and_then(|s| s.messages.iter_mut().find(|m| m.id == id))
    }

    pub fn remove_message(&mut self, session: &SessionId, id: MessageId) -> Option<Message> {
        let session = self.sessions.get_mut(session)?;
        let index = session.messages.iter().position(|m| m.id == id)?;
        Some(session.messages.remove(index))
    }

    /// Cut the current session's history so `id` can be answered again.
    ///
    /// A user message is kept along with everything before it; any other
    /// message is dropped along with everything after it. Returns the content
    /// of the last remaining user message, which is what gets resent.
    pub fn truncate_for_regenerate(&mut self, id: MessageId) -> Result<Option<String>> {
        let session = self
            .sessions
            .get_mut(&self.current)
            .ok_or_else(|| anyhow!("No current session"))?;
        let index = session
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| anyhow!("Message {} is not in the current session", id))?;

        let keep = match session.messages[index].role {
            Role::User => index + 1,
            _ => index,
        };
        session.messages.truncate(keep);
        session.timestamp = Utc::now();

        Ok(session
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone()))
    }

    /// Flip the collapsed flag of a message's reasoning; returns the new value.
    pub fn toggle_reasoning(&mut self, id: MessageId) -> Result<bool> {
        let current = self.current.clone();
        let message = self
            .message_mut(&current, id)
            .ok_or_else(|| anyhow!("Message {} is not in the current session", id))?;
        message.reasoning_collapsed = !message.reasoning_collapsed;
        Ok(message.reasoning_collapsed)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            sessions: self.sessions.clone(),
            current_session_id: Some(self.current.clone()),
            next_message_id: self.next_message_id,
        }
    }

    pub fn persist(&self) -> Result<()> {
        self.backend.save(&self.snapshot())
    }
}

fn blank_session(id: SessionId, tag: &SessionTag) -> Session {
    Session {
        id,
        title: DEFAULT_TITLE.to_string(),
        timestamp: Utc::now(),
        model_used: tag.model.clone(),
        provider_used: tag.provider.clone(),
        system_prompt_id: tag.system_prompt_id.clone(),
        messages: Vec::new(),
    }
}

fn make_title(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let head: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryPersistence;

    fn open_store() -> (ConversationStore, MemoryPersistence) {
        let backend = MemoryPersistence::default();
        let store = ConversationStore::open(Box::new(backend.clone()), SessionTag::default()).unwrap();
        (store, backend)
    }

    #[test]
    fn test_open_creates_current_session() {
        let (store, backend) = open_store();
        assert_eq!(store.current().title, "New Chat");
        assert!(store.current().messages.is_empty());
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn test_message_ids_increase_in_creation_order() {
        let (mut store, _) = open_store();
        let a = store.push_message(Role::User, "first");
        let b = store.push_message(Role::Assistant, "second");
        let c = store.push_message(Role::Notice, "third");
        assert!(a < b && b < c);
    }

    #[test]
    fn test_title_from_first_user_message() {
        let (mut store, _) = open_store();
        let long = "x".repeat(60);
        store.push_message(Role::User, long.as_str());
        assert_eq!(store.current().title, format!("{}...", "x".repeat(50)));

        store.new_session();
        store.push_message(Role::User, "short question");
        assert_eq!(store.current().title, "short question");
    }

    #[test]
    fn test_reopen_keeps_counter_and_current_session() {
        let backend = MemoryPersistence::default();
        let mut store = ConversationStore::open(Box::new(backend.clone()), SessionTag::default()).unwrap();
        let first = store.push_message(Role::User, "hello");
        let session = store.current_id().clone();
        store.persist().unwrap();
        drop(store);

        let mut reopened = ConversationStore::open(Box::new(backend), SessionTag::default()).unwrap();
        assert_eq!(reopened.current_id(), &session);
        let next = reopened.push_message(Role::Assistant, "hi");
        assert!(next > first);
    }

    #[test]
    fn test_delete_current_falls_back_to_most_recent() {
        let (mut store, _) = open_store();
        let first = store.current_id().clone();
        store.push_message(Role::User, "older");
        let second = store.new_session();
        store.push_message(Role::User, "newer");
        let third = store.new_session();

        store.delete_session(&third).unwrap();
        assert_eq!(store.current_id(), &second);

        store.delete_session(&second).unwrap();
        assert_eq!(store.current_id(), &first);

        store.delete_session(&first).unwrap();
        assert_eq!(store.sessions_by_recency().len(), 1);
        assert!(store.current().messages.is_empty());
    }

    #[test]
    fn test_switch_to_unknown_session_fails() {
        let (mut store, _) = open_store();
        assert!(store.switch_session(&SessionId::from("nope")).is_err());
    }

    #[test]
    fn test_truncate_for_regenerate() {
        let (mut store, _) = open_store();
        let q1 = store.push_message(Role::User, "q1");
        let a1 = store.push_message(Role::Assistant, "a1");
        store.push_message(Role::User, "q2");
        store.push_message(Role::Assistant, "a2");

        let resend = store.truncate_for_regenerate(a1).unwrap();
        assert_eq!(resend.as_deref(), Some("q1"));
        assert_eq!(store.current().messages.len(), 1);

        store.push_message(Role::Assistant, "a1 again");
        let resend = store.truncate_for_regenerate(q1).unwrap();
        assert_eq!(resend.as_deref(), Some("q1"));
        assert_eq!(store.current().messages.len(), 1);
        assert_eq!(store.current().messages[0].id, q1);
    }

    #[test]
    fn test_toggle_reasoning() {
        let (mut store, _) = open_store();
        let id = store.push_message(Role::Assistant, "answer");
        assert!(store.toggle_reasoning(id).unwrap());
        assert!(!store.toggle_reasoning(id).unwrap());
        assert!(store.toggle_reasoning(MessageId(999)).is_err());
    }

    #[test]
    fn test_has_output_ignores_whitespace() {
        let (mut store, _) = open_store();
        let id = store.push_message(Role::Assistant, "  ");
        let session = store.current_id().clone();
        let message = store.message_mut(&session, id).unwrap();
        assert!(!message.has_output());
        message.reasoning = Some("thinking".into());
        assert!(message.has_output());
    }

    #[test]
    fn test_notice_role_serializes_as_system() {
        let json = serde_json::to_string(&Role::Notice).unwrap();
        assert_eq!(json, "\"system\"");
        assert_eq!(Role::Notice.wire_name(), None);
        assert_eq!(Role::User.wire_name(), Some("user"));
    }
}
