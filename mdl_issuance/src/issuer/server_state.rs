//! Process-wide registry of the sessions currently progressing through a
//! lifecycle flow. Sessions are destroyed on any end-of-session event and
//! reaped by a cleanup task when idle for too long.

use std::{collections::HashMap, fmt::Display, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::warn;

use super::SessionData;

pub const SESSION_EXPIRY_MINUTES: i64 = 5;
pub const CLEANUP_INTERVAL_SECONDS: u64 = 10;

/// An opaque session identifier: 16 lowercase hex characters drawn uniformly
/// at random.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new_random() -> Self {
        SessionId(hex::encode(crate::utils::crypto::random_bytes(8)))
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        SessionId(value)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub data: SessionData,
    pub last_active: DateTime<Utc>,
}

impl SessionState {
    fn new(data: SessionData) -> Self {
        SessionState {
            data,
            last_active: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh session, retrying the id on collision.
    pub fn create(&self, data: SessionData) -> SessionId {
        let mut sessions = self.sessions.lock();
        let session_id = loop {
            let candidate = SessionId::new_random();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(session_id.clone(), SessionState::new(data));
        session_id
    }

    /// Removes the session for processing; [`put`](Self::put) reinstates it.
    /// Between the two, concurrent messages for the same session do not find
    /// it, so a session handles at most one message at a time.
    pub fn take(&self, session_id: &SessionId) -> Option<SessionState> {
        self.sessions.lock().remove(session_id)
    }

    pub fn put(&self, session_id: SessionId, data: SessionData) {
        self.sessions.lock().insert(session_id, SessionState::new(data));
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<SessionState> {
        self.sessions.lock().remove(session_id)
    }

    fn purge_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::minutes(SESSION_EXPIRY_MINUTES);
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_active > cutoff);
        let purged = before - sessions.len();
        if purged > 0 {
            warn!("purged {purged} idle session(s)");
        }
    }

    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                self.purge_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::provisioning::ProvisioningState;
    use super::*;

    #[test]
    fn session_ids_are_sixteen_hex_chars() {
        let session_id = SessionId::new_random();
        let id = session_id.to_string();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn take_blocks_concurrent_processing() {
        let registry = SessionRegistry::new();
        let session_id = registry.create(SessionData::Provisioning(ProvisioningState::New));

        let state = registry.take(&session_id).unwrap();
        assert!(registry.take(&session_id).is_none());

        registry.put(session_id.clone(), state.data);
        assert!(registry.take(&session_id).is_some());
    }
}
