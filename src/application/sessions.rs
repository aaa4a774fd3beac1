use crate::types::ChatMessage;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

// Oldest messages are dropped first once a single conversation grows past this.
const MAX_SESSION_MESSAGES: usize = 64;

/// Keyed conversation store backing multi-turn chat. Sessions are evicted
/// least-recently-used once the configured cap is exceeded.
pub struct SessionStore {
    inner: Mutex<HashMap<String, SessionEntry>>,
    max_sessions: usize,
}

struct SessionEntry {
    messages: Vec<ChatMessage>,
    last_used: Instant,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Snapshot of the stored history for one session (empty for unknown ids).
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        let mut sessions = self.inner.lock().expect("session store lock");
        match sessions.get_mut(session_id) {
            Some(entry) => {
                entry.last_used = Instant::now();
                entry.messages.clone()
            }
            None => Vec::new(),
        }
    }

    /// Persist one completed exchange. Tool traffic inside the turn is not
    /// stored; only what the user said and what the agent finally answered.
    pub fn record(&self, session_id: &str, user: ChatMessage, assistant: ChatMessage) {
        let mut sessions = self.inner.lock().expect("session store lock");
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                messages: Vec::new(),
                last_used: Instant::now(),
            });
        entry.messages.push(user);
        entry.messages.push(assistant);
        entry.last_used = Instant::now();
        if entry.messages.len() > MAX_SESSION_MESSAGES {
            let excess = entry.messages.len() - MAX_SESSION_MESSAGES;
            entry.messages.drain(..excess);
        }
        debug!(
            session_id,
            total_messages = entry.messages.len(),
            "Persisted chat exchange to session history"
        );

        while sessions.len() > self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            debug!(session_id = oldest.as_str(), "Evicted least-recently-used session");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
