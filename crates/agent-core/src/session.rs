//! Session Management
//!
//! The durable, ordered transcript of one conversation. Sessions are owned
//! values passed explicitly into each chat call and persisted through a
//! pluggable storage trait; the serde form of a `Session` is its snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Message;

/// A complete conversation transcript with free-form metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    messages: Vec<Message>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a generated id
    pub fn new() -> Self {
        Self::with_id(generate_id())
    }

    /// Create a session with a caller-chosen id
    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message and bump the activity timestamp
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all messages, keeping id and metadata
    pub fn clear(&mut self) {
        self.messages.clear();
        self.touch();
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
        self.touch();
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Save a session snapshot
    fn save(&self, session: &Session) -> Result<()>;

    /// Load a session by id
    fn load(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    fn delete(&self, id: &str) -> Result<()>;

    /// Remove sessions untouched for more than `days`; returns the count
    fn prune_older_than(&self, days: i64) -> Result<usize>;
}

/// In-memory session store (for development/testing)
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.id().to_string(), session.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(id);
        Ok(())
    }

    fn prune_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at() >= cutoff);
        Ok(before - sessions.len())
    }
}

/// Thin facade over a shared store.
///
/// Keeps no cache of live sessions: a session is an owned value, and the
/// store is the single source of truth.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Create a fresh session, generating an id when none is given
    pub fn create(&self, id: Option<&str>) -> Session {
        match id {
            Some(id) => Session::with_id(id),
            None => Session::new(),
        }
    }

    /// Load a stored session, or create a fresh one under that id
    pub fn get(&self, id: &str) -> Result<Session> {
        Ok(self.store.load(id)?.unwrap_or_else(|| Session::with_id(id)))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        self.store.save(session)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id)
    }

    pub fn prune_older_than(&self, days: i64) -> Result<usize> {
        self.store.prune_older_than(days)
    }
}
