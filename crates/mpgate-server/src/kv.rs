//! Shared key-value store used for access tokens and their refresh locks.
//!
//! Production deployments put several gateway processes in front of one
//! store; [`MemoryKvStore`] is the single-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::GatewayError;

/// String store with per-key expiry. Expired keys behave exactly like
/// absent ones.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// `ttl: None` stores without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), GatewayError>;

    /// Remaining lifetime. `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, GatewayError>;

    /// Set only if absent. Returns whether this call stored the value.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, GatewayError>;

    async fn del(&self, key: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process [`KvStore`] with lazy expiry.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Lookups already ignore them; this only
    /// reclaims memory.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Purged expired kv entries");
        }
    }
}

/// A TTL too large to represent never expires.
fn expiry(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), GatewayError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.and_then(|d| expiry(Instant::now(), d)),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, GatewayError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, GatewayError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expiry(now, ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), GatewayError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(kv.ttl("a").await.unwrap(), None);

        kv.del("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_ttl_does_not_panic() {
        let kv = MemoryKvStore::new();
        kv.set("a", "1", Some(Duration::MAX)).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        assert!(kv.set_nx("b", "1", Duration::MAX).await.unwrap());
        assert!(!kv.set_nx("b", "2", Duration::MAX).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_hides_value() {
        let kv = MemoryKvStore::new();
        kv.set("a", "1", Some(Duration::from_secs(10))).await.unwrap();
        let ttl = kv.ttl("a").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(10) && ttl > Duration::from_secs(9));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert_eq!(kv.ttl("a").await.unwrap(), None);

        kv.purge_expired().await;
        assert!(kv.entries.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_nx_respects_live_and_expired_keys() {
        let kv = MemoryKvStore::new();
        assert!(kv.set_nx("lock", "1", Duration::from_secs(10)).await.unwrap());
        assert!(!kv.set_nx("lock", "2", Duration::from_secs(10)).await.unwrap());
        assert_eq!(kv.get("lock").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(kv.set_nx("lock", "3", Duration::from_secs(10)).await.unwrap());
    }
}
