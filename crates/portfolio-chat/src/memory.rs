//! Per-session chat history kept in memory

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

pub trait MemoryStore: Send + Sync {
    fn append(&self, session_id: &str, message: Message);
    /// Copy of the most recent messages, oldest first
    fn get_recent(&self, session_id: &str) -> Vec<Message>;
    fn clear(&self, session_id: &str);
    /// Drop sessions idle for longer than the TTL, returns how many were removed
    fn sweep_expired(&self) -> usize;
    fn session_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Messages handed out by `get_recent`
    pub history_window: usize,
    /// Messages retained per session
    pub history_capacity: usize,
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            history_capacity: 50,
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug)]
struct SessionData {
    messages: VecDeque<Message>,
    last_activity: DateTime<Utc>,
}

impl SessionData {
    fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            last_activity: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct InMemoryMemoryStore {
    store: Arc<DashMap<String, SessionData>>,
    config: SessionConfig,
}

impl InMemoryMemoryStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn is_expired(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        now.signed_duration_since(last_activity) > ttl
    }

    /// Sweep against an explicit clock
    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, session| !self.is_expired(session.last_activity, now));
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            info!("{} idle sessions removed (TTL: {}s)", removed, self.config.ttl.as_secs());
        }
        removed
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl MemoryStore for InMemoryMemoryStore {
    fn append(&self, session_id: &str, message: Message) {
        if session_id.trim().is_empty() {
            warn!("Ignoring message without a session id");
            return;
        }
        let capacity = self.config.history_capacity.max(1);
        let mut entry = self
            .store
            .entry(session_id.to_string())
            .or_insert_with(|| SessionData::new(capacity));
        if entry.messages.len() >= capacity {
            entry.messages.pop_front();
        }
        entry.messages.push_back(message);
        entry.last_activity = Utc::now();
        debug!("Session {} now holds {} messages", session_id, entry.messages.len());
    }

    fn get_recent(&self, session_id: &str) -> Vec<Message> {
        if session_id.trim().is_empty() {
            return Vec::new();
        }
        match self.store.get(session_id) {
            Some(session) => {
                let skip = session.messages.len().saturating_sub(self.config.history_window);
                session.messages.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    fn clear(&self, session_id: &str) {
        if let Some((_, removed)) = self.store.remove(session_id) {
            info!("Cleared session {} ({} messages)", session_id, removed.messages.len());
        }
    }

    fn sweep_expired(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn session_count(&self) -> usize {
        self.store.len()
    }
}
