//! Server-side sessions keyed by an opaque cookie
//!
//! Tokens never reach the browser; it only holds a random session id.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::oauth::TokenSet;

/// Authorization request in flight between `/launch` and `/redirect`
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub pending: Option<PendingAuthorization>,
    pub tokens: Option<TokenSet>,
    pub touched_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Session {
            pending: None,
            tokens: None,
            touched_at: Utc::now(),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }
}

pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(id, Session::new());
        debug!(session_id = %id, "session created");
        id
    }

    /// Snapshot of a live session; expired sessions are dropped on sight
    pub fn get(&self, id: &Uuid) -> Option<Session> {
        let session = self.sessions.get(id)?.value().clone();
        if self.is_expired(&session) {
            self.sessions.remove(id);
            return None;
        }
        Some(session)
    }

    /// Mutate a live session in place; returns `None` if it is gone
    pub fn update<R>(&self, id: &Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut entry = self.sessions.get_mut(id)?;
        if self.is_expired(&entry) {
            drop(entry);
            self.sessions.remove(id);
            return None;
        }
        entry.touched_at = Utc::now();
        Some(f(entry.value_mut()))
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Move a live session to a fresh id; the old id stops resolving
    pub fn rotate(&self, id: &Uuid) -> Option<Uuid> {
        let (_, mut session) = self.sessions.remove(id)?;
        if self.is_expired(&session) {
            return None;
        }
        session.touched_at = Utc::now();
        let new_id = Uuid::new_v4();
        self.sessions.insert(new_id, session);
        debug!(session_id = %new_id, "session id rotated");
        Some(new_id)
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.sessions.retain(|_, s| {
            let keep = now - s.touched_at <= self.ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, session: &Session) -> bool {
        Utc::now() - session.touched_at > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenSet {
        TokenSet {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            scope: None,
            id_token: None,
        }
    }

    #[test]
    fn new_session_is_unauthenticated() {
        let store = SessionStore::new(Duration::minutes(5));
        let id = store.create();
        let session = store.get(&id).unwrap();
        assert!(session.access_token().is_none());
        assert!(session.pending.is_none());
    }

    #[test]
    fn update_stores_tokens() {
        let store = SessionStore::new(Duration::minutes(5));
        let id = store.create();
        store.update(&id, |s| s.tokens = Some(tokens())).unwrap();
        assert_eq!(store.get(&id).unwrap().access_token(), Some("at"));
    }

    #[test]
    fn unknown_session_is_absent() {
        let store = SessionStore::new(Duration::minutes(5));
        assert!(store.get(&Uuid::new_v4()).is_none());
        assert!(store.update(&Uuid::new_v4(), |_| ()).is_none());
    }

    #[test]
    fn expired_session_is_dropped() {
        let store = SessionStore::new(Duration::minutes(5));
        let id = store.create();
        store.sessions.get_mut(&id).unwrap().touched_at = Utc::now() - Duration::minutes(10);

        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn purge_only_removes_stale_sessions() {
        let store = SessionStore::new(Duration::minutes(5));
        let stale = store.create();
        let fresh = store.create();
        store.sessions.get_mut(&stale).unwrap().touched_at = Utc::now() - Duration::hours(1);

        assert_eq!(store.purge_expired(), 1);
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn purge_while_sessions_are_created_concurrently() {
        let store = std::sync::Arc::new(SessionStore::new(Duration::minutes(5)));
        let stale = store.create();
        store.sessions.get_mut(&stale).unwrap().touched_at = Utc::now() - Duration::hours(1);

        let creator = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..20_000 {
                    store.create();
                }
            })
        };
        let mut purged = 0;
        for _ in 0..2_000 {
            purged += store.purge_expired();
        }
        creator.join().unwrap();

        assert_eq!(purged, 1);
        assert_eq!(store.len(), 20_000);
    }

    #[test]
    fn rotate_moves_session_to_new_id() {
        let store = SessionStore::new(Duration::minutes(5));
        let old = store.create();
        store.update(&old, |s| s.tokens = Some(tokens())).unwrap();

        let new = store.rotate(&old).unwrap();

        assert_ne!(old, new);
        assert!(store.get(&old).is_none());
        assert_eq!(store.get(&new).unwrap().access_token(), Some("at"));
        assert!(store.rotate(&old).is_none());
    }

    #[test]
    fn remove_destroys_session() {
        let store = SessionStore::new(Duration::minutes(5));
        let id = store.create();
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
    }
}
