//! Per-conversation session state for stateful upstream adapters.
//!
//! A conversation is identified by the MD5 of its first user message; the
//! session carries the upstream chat id and the `parent_id` turn pointer.
//! Entries expire on a TTL measured from last access and are reaped by a
//! periodic sweep task owned by the provider instance.

use qwengate_types::{GateError, now_millis, traits::Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default session lifetime measured from last access.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
/// Default interval between sweep passes.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// In-memory state of one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// 32-char lowercase hex MD5 of the first user message content.
    pub session_id: String,
    /// Opaque chat id returned by the upstream on chat creation.
    pub chat_id: Option<String>,
    /// Upstream pointer to the previous assistant turn; `None` on turn one.
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub last_accessed: i64,
    pub message_count: u64,
}

/// Counters exposed by [`SessionManager::metrics`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionMetrics {
    pub active: usize,
    pub total_created: u64,
    pub total_cleaned: u64,
}

/// Derives the conversation id: MD5 over the UTF-8 bytes of the first user
/// message content.
///
/// # Errors
///
/// Returns [`GateError::Validation`] for empty input.
pub fn generate_session_id(first_user_message: &str) -> Result<String> {
    if first_user_message.is_empty() {
        return Err(GateError::Validation(
            "first user message content must be non-empty".into(),
        ));
    }
    Ok(format!("{:x}", md5::compute(first_user_message.as_bytes())))
}

/// Keyed conversation state with TTL and a periodic sweep.
///
/// All map operations take the mutex briefly; the sweep task holds it only
/// while scanning. The sweep is a plain tokio task and never keeps the
/// process alive on its own.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
    cleanup_interval: Duration,
    total_created: AtomicU64,
    total_cleaned: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// A manager with the default 30-min TTL and 10-min sweep.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TTL, DEFAULT_CLEANUP_INTERVAL)
    }

    /// A manager with explicit TTL and sweep interval.
    #[must_use]
    pub fn with_config(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            cleanup_interval,
            total_created: AtomicU64::new(0),
            total_cleaned: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    fn expired(&self, session: &Session, now: i64) -> bool {
        let age = now.saturating_sub(session.last_accessed);
        u128::try_from(age).unwrap_or(0) > self.ttl.as_millis()
    }

    /// Inserts a fresh session (`parent_id = None`, `message_count = 0`).
    /// The empty string is a legal id; only the caller knows whether that
    /// makes sense.
    pub fn create(&self, session_id: &str, chat_id: Option<String>) -> Session {
        let now = now_millis();
        let session = Session {
            session_id: session_id.to_string(),
            chat_id,
            parent_id: None,
            created_at: now,
            last_accessed: now,
            message_count: 0,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), session.clone());
        self.total_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id, "session created");
        session
    }

    /// Looks up a session. Absent and expired both read as `None`; an
    /// expired entry is evicted as a side effect. A hit bumps
    /// `last_accessed`.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let now = now_millis();
        let mut map = self.sessions.lock().unwrap();
        let session = map.get_mut(session_id)?;
        if self.expired(session, now) {
            map.remove(session_id);
            self.total_cleaned.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_id, "session expired on access");
            return None;
        }
        session.last_accessed = now;
        Some(session.clone())
    }

    /// Records the upstream's new turn pointer: sets `parent_id`, bumps
    /// `message_count` and `last_accessed`. `false` when the session is gone.
    pub fn update_parent_id(&self, session_id: &str, parent_id: &str) -> bool {
        let mut map = self.sessions.lock().unwrap();
        let Some(session) = map.get_mut(session_id) else {
            return false;
        };
        session.parent_id = Some(parent_id.to_string());
        session.message_count += 1;
        session.last_accessed = now_millis();
        true
    }

    /// Overwrites the upstream chat id. `false` when the session is gone.
    pub fn set_chat_id(&self, session_id: &str, chat_id: &str) -> bool {
        let mut map = self.sessions.lock().unwrap();
        let Some(session) = map.get_mut(session_id) else {
            return false;
        };
        session.chat_id = Some(chat_id.to_string());
        session.last_accessed = now_millis();
        true
    }

    /// Removes a session; `true` if it existed.
    pub fn delete(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }

    /// Drops every entry whose last access is older than the TTL; returns
    /// the number removed.
    pub fn cleanup(&self) -> usize {
        let now = now_millis();
        let mut map = self.sessions.lock().unwrap();
        let before = map.len();
        map.retain(|_, s| !self.expired(s, now));
        let removed = before - map.len();
        drop(map);
        if removed > 0 {
            self.total_cleaned
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::info!(removed, "session sweep");
        }
        removed
    }

    /// Starts the periodic sweep task. Restarting replaces the old task.
    pub fn start_cleanup(self: &Arc<Self>) {
        let mgr = Arc::clone(self);
        let interval = self.cleanup_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                mgr.cleanup();
            }
        });
        if let Some(old) = self.sweeper.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// Stops the sweep task if one is running.
    pub fn stop_cleanup(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Stops the sweep and drops all entries.
    pub fn shutdown(&self) {
        self.stop_cleanup();
        self.sessions.lock().unwrap().clear();
    }

    /// Live entry count plus lifetime created/cleaned counters.
    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            active: self.sessions.lock().unwrap().len(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_cleaned: self.total_cleaned.load(Ordering::Relaxed),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}
