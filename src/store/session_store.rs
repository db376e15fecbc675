use crate::model::{generate_id, Id, Principal};
use crate::store::traits::SessionStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache entry for a logged-in principal
#[derive(Clone, Debug)]
struct SessionEntry {
    principal: Principal,
    last_accessed: Instant,
}

/// In-memory session store with sliding TTL
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    /// Session entries keyed by token
    entries: Arc<RwLock<HashMap<Id, SessionEntry>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, principal: Principal) -> Id {
        let token = generate_id();
        let mut entries = self.entries.write().await;
        entries.insert(
            token.clone(),
            SessionEntry {
                principal,
                last_accessed: Instant::now(),
            },
        );
        token
    }

    async fn get(&self, token: &str) -> Option<Principal> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(token)?;
        if entry.last_accessed.elapsed() > self.ttl {
            entries.remove(token);
            return None;
        }
        // Sliding expiry
        entry.last_accessed = Instant::now();
        Some(entry.principal.clone())
    }

    async fn invalidate(&self, token: &str) -> bool {
        self.entries.write().await.remove(token).is_some()
    }

    async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_accessed.elapsed() <= self.ttl);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[tokio::test]
    async fn test_session_basic_operations() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let token = store.create(Principal::new("admin", Role::Admin)).await;

        let principal = store.get(&token).await;
        assert_eq!(principal, Some(Principal::new("admin", Role::Admin)));

        assert!(store.invalidate(&token).await);
        assert!(store.get(&token).await.is_none());
        assert!(!store.invalidate(&token).await);
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let store = InMemorySessionStore::new(Duration::from_millis(20));
        let token = store.create(Principal::new("user", Role::User)).await;
        let other = store.create(Principal::new("admin", Role::Admin)).await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get(&token).await.is_none());
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get(&other).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_access_extends_session() {
        let store = InMemorySessionStore::new(Duration::from_millis(150));
        let token = store.create(Principal::new("user", Role::User)).await;

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert!(store.get(&token).await.is_some());
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get(&token).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_tokens_are_distinct() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let a = store.create(Principal::new("user", Role::User)).await;
        let b = store.create(Principal::new("user", Role::User)).await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }
}
