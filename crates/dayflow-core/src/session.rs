//! Per-chat conversation state.
//!
//! Sessions live in process memory only. Each one sits behind its own async
//! mutex so events for one chat are handled strictly one at a time while
//! different chats proceed concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::flow::Step;

/// Stable chat identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for SessionId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Values accumulated across one flow (draft task, review answers, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scratch(HashMap<String, serde_json::Value>);

impl Scratch {
    /// Typed read. `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.0
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), serde_json::Error> {
        self.0.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Conversation state for one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub current_step: Step,
    #[serde(default)]
    pub scratch: Scratch,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            current_step: Step::Idle,
            scratch: Scratch::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current_step == Step::Idle
    }

    /// Leave the active flow: idle step, empty scratch. Returns the old scratch.
    pub fn reset(&mut self) -> Scratch {
        self.current_step = Step::Idle;
        std::mem::take(&mut self.scratch)
    }
}

pub type SessionSlot = Arc<tokio::sync::Mutex<Session>>;

/// Sessions keyed by chat id, created lazily.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<SessionId, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's slot, creating an idle session on first use.
    pub fn slot(&self, id: &SessionId) -> SessionSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Session::new(id.clone()))))
            .clone()
    }

    /// Copy of the session, waiting for any in-flight handler to finish.
    pub async fn snapshot(&self, id: &SessionId) -> Option<Session> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.get(id).cloned()
        }?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
