//! Session records shared across connections.
//!
//! The store is the only state sessions have in common. It is injected into
//! the service as `Arc<dyn SessionStore>`; [`InMemorySessionStore`] is the
//! default implementation.

use crate::pipeline::ResponseMode;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Storage of session records, keyed by client id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, client_id: &str) -> Option<Session>;

    async fn get_by_id(&self, id: Uuid) -> Option<Session>;

    /// Inserts or replaces the record for `session.client_id`.
    async fn put(&self, session: Session);

    async fn remove(&self, client_id: &str) -> Option<Session>;

    async fn list(&self) -> Vec<Session>;

    /// Drops detached records older than the store's TTL. Returns how many
    /// were removed.
    async fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

pub struct InMemorySessionStore {
    ttl: chrono::Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, client_id: &str) -> Option<Session> {
        self.sessions.read().await.get(client_id).cloned()
    }

    async fn get_by_id(&self, id: Uuid) -> Option<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.id == id)
            .cloned()
    }

    async fn put(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.client_id.clone(), session);
    }

    async fn remove(&self, client_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(client_id)
    }

    async fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl, now));
        before - sessions.len()
    }
}

/// Attaches a connection to the client's retained session, or creates a new
/// one. The flag is `true` when an existing session was resumed.
pub async fn resume_or_create(
    store: &dyn SessionStore,
    client_id: &str,
    mode: ResponseMode,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> (Session, bool) {
    if let Some(mut session) = store.get(client_id).await {
        if !session.is_expired(ttl, now) {
            if session.attached {
                debug!(%client_id, session_id = %session.id, "Session is already attached, taking it over");
            }
            session.attach(mode, now);
            store.put(session.clone()).await;
            info!(%client_id, session_id = %session.id, "Resumed existing session");
            return (session, true);
        }
    }

    let session = Session::new(client_id, mode, now);
    store.put(session.clone()).await;
    info!(%client_id, session_id = %session.id, "Created new session");
    (session, false)
}

/// Marks the client's session as no longer served by a connection.
///
/// `attachment_id` is the id the connection received when it attached. A
/// connection that has since been superseded leaves the record alone.
pub async fn detach(
    store: &dyn SessionStore,
    client_id: &str,
    attachment_id: Uuid,
    now: DateTime<Utc>,
) {
    let Some(mut session) = store.get(client_id).await else {
        return;
    };
    if session.attachment_id != attachment_id {
        debug!(%client_id, session_id = %session.id, "Record was taken over, not detaching");
        return;
    }
    session.detach(now);
    store.put(session).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_in_memory_put_get_list_remove() {
        let store = InMemorySessionStore::new(Duration::seconds(60));
        let t0 = Utc::now();
        let a = Session::new("a", ResponseMode::Text, t0);
        let b = Session::new("b", ResponseMode::Audio, t0 + Duration::seconds(1));
        store.put(a.clone()).await;
        store.put(b.clone()).await;

        assert_eq!(store.get("a").await, Some(a.clone()));
        assert_eq!(store.get_by_id(b.id).await, Some(b.clone()));
        assert_eq!(store.get_by_id(Uuid::new_v4()).await, None);
        assert_eq!(store.list().await, vec![a.clone(), b.clone()]);

        assert_eq!(store.remove("a").await, Some(a));
        assert_eq!(store.get("a").await, None);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_only_expired_detached() {
        let store = InMemorySessionStore::new(Duration::seconds(60));
        let t0 = Utc::now();

        let attached = Session::new("attached", ResponseMode::Text, t0);
        let mut stale = Session::new("stale", ResponseMode::Text, t0);
        stale.detach(t0);
        let mut recent = Session::new("recent", ResponseMode::Text, t0);
        recent.detach(t0 + Duration::seconds(50));

        store.put(attached).await;
        store.put(stale).await;
        store.put(recent).await;

        assert_eq!(store.evict_expired(t0 + Duration::seconds(61)).await, 1);
        assert!(store.get("stale").await.is_none());
        assert!(store.get("recent").await.is_some());
        assert!(store.get("attached").await.is_some());
    }

    #[tokio::test]
    async fn test_resume_retained_session() {
        let store = InMemorySessionStore::new(Duration::seconds(60));
        let t0 = Utc::now();

        let (first, resumed) =
            resume_or_create(&store, "user-1", ResponseMode::Text, Duration::seconds(60), t0).await;
        assert!(!resumed);

        detach(&store, "user-1", first.attachment_id, t0 + Duration::seconds(5)).await;
        assert!(!store.get("user-1").await.unwrap().attached);

        let (second, resumed) = resume_or_create(
            &store,
            "user-1",
            ResponseMode::Audio,
            Duration::seconds(60),
            t0 + Duration::seconds(30),
        )
        .await;
        assert!(resumed);
        assert_eq!(second.id, first.id);
        assert_eq!(second.mode, ResponseMode::Audio);
        assert!(second.attached);
    }

    #[tokio::test]
    async fn test_expired_record_is_replaced() {
        let t0 = Utc::now();
        let mut old = Session::new("user-1", ResponseMode::Text, t0);
        old.detach(t0);
        let old_id = old.id;

        let mut store = MockSessionStore::new();
        store
            .expect_get()
            .with(eq("user-1"))
            .times(1)
            .return_once(move |_| Some(old));
        store
            .expect_put()
            .withf(move |s| s.client_id == "user-1" && s.id != old_id && s.attached)
            .times(1)
            .return_const(());

        let (session, resumed) = resume_or_create(
            &store,
            "user-1",
            ResponseMode::Text,
            Duration::seconds(60),
            t0 + Duration::seconds(120),
        )
        .await;
        assert!(!resumed);
        assert_ne!(session.id, old_id);
    }

    #[tokio::test]
    async fn test_detach_unknown_client_is_noop() {
        let mut store = MockSessionStore::new();
        store.expect_get().return_once(|_| None);
        store.expect_put().never();
        detach(&store, "ghost", Uuid::new_v4(), Utc::now()).await;
    }

    #[tokio::test]
    async fn test_superseded_connection_does_not_detach() {
        let store = InMemorySessionStore::new(Duration::seconds(60));
        let ttl = Duration::seconds(60);
        let t0 = Utc::now();

        let (first, _) = resume_or_create(&store, "dup", ResponseMode::Text, ttl, t0).await;
        let (second, resumed) =
            resume_or_create(&store, "dup", ResponseMode::Text, ttl, t0 + Duration::seconds(1)).await;
        assert!(resumed);
        assert_eq!(second.id, first.id);

        detach(&store, "dup", first.attachment_id, t0 + Duration::seconds(2)).await;
        assert!(store.get("dup").await.unwrap().attached);

        detach(&store, "dup", second.attachment_id, t0 + Duration::seconds(3)).await;
        assert!(!store.get("dup").await.unwrap().attached);
    }
}
