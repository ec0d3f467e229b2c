//! Session bookkeeping for the streamable HTTP transport.
//!
//! A session is created by a successful `initialize` request and lives until
//! the client deletes it or it sits idle longer than the store's timeout.
//! Nothing is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

/// Client identity announced in `initialize` params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    /// Read `clientInfo` from initialize params, if present and well-formed.
    pub fn from_initialize_params(params: Option<&Value>) -> Option<Self> {
        let info = params?.get("clientInfo")?;
        Some(Self {
            name: info.get("name")?.as_str()?.to_string(),
            version: info.get("version").and_then(Value::as_str).unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub protocol_version: String,
    pub client: Option<ClientInfo>,
    pub created_at: Instant,
    /// Refreshed whenever the client presents the session id.
    pub last_seen: Instant,
}

impl Session {
    fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.last_seen.elapsed() >= idle_timeout
    }
}

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// In-memory session table shared by all HTTP workers.
///
/// Idle sessions are evicted lazily: lookups treat them as gone, and every
/// `create` sweeps the table, so abandoned sessions cannot accumulate.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a session and return its id (32 lowercase hex characters).
    pub fn create(&self, protocol_version: &str, client: Option<ClientInfo>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let session = Session {
            id: id.clone(),
            protocol_version: protocol_version.to_string(),
            client,
            created_at: now,
            last_seen: now,
        };

        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.idle_timeout));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "idle sessions dropped");
        }
        sessions.insert(id.clone(), session);
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock()
            .get(id)
            .filter(|s| !s.is_expired(self.idle_timeout))
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Mark a session as active. Returns false (and forgets the session) if
    /// it is unknown or has expired.
    pub fn touch(&self, id: &str) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(id) {
            Some(session) if !session.is_expired(self.idle_timeout) => {
                session.last_seen = Instant::now();
                true
            }
            Some(_) => {
                sessions.remove(id);
                tracing::debug!(session = %id, "session expired");
                false
            }
            None => false,
        }
    }

    /// Terminate a session. Returns false if it did not exist or had expired.
    pub fn remove(&self, id: &str) -> bool {
        self.lock()
            .remove(id)
            .is_some_and(|s| !s.is_expired(self.idle_timeout))
    }

    /// Live sessions.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| !s.is_expired(self.idle_timeout))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn create_and_remove() {
        let store = SessionStore::new();
        let id = store.create("2025-06-18", None);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.contains(&id));
        assert_eq!(store.get(&id).unwrap().protocol_version, "2025-06-18");

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn ids_are_unique_and_clones_share_state() {
        let store = SessionStore::new();
        let shared = store.clone();
        let first = store.create("2025-06-18", None);
        let second = shared.create("2025-06-18", None);
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(20));
        let id = store.create("2025-06-18", None);
        assert!(store.contains(&id));

        sleep(Duration::from_millis(40));
        assert!(!store.contains(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.touch(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn create_sweeps_abandoned_sessions() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(20));
        for _ in 0..50 {
            store.create("2025-06-18", None);
        }
        sleep(Duration::from_millis(40));

        let fresh = store.create("2025-06-18", None);
        assert_eq!(store.inner.lock().unwrap().len(), 1);
        assert!(store.contains(&fresh));
    }

    #[test]
    fn touch_keeps_a_session_alive() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(300));
        let id = store.create("2025-06-18", None);

        sleep(Duration::from_millis(200));
        assert!(store.touch(&id));
        sleep(Duration::from_millis(200));
        assert!(store.contains(&id));
        assert!(store.get(&id).unwrap().created_at < store.get(&id).unwrap().last_seen);
    }

    #[test]
    fn client_info_from_params() {
        let params = json!({ "clientInfo": { "name": "mcp-probe", "version": "1.0" } });
        let info = ClientInfo::from_initialize_params(Some(&params)).unwrap();
        assert_eq!(info.name, "mcp-probe");
        assert_eq!(info.version, "1.0");

        assert!(ClientInfo::from_initialize_params(Some(&json!({}))).is_none());
        assert!(ClientInfo::from_initialize_params(None).is_none());
    }
}
