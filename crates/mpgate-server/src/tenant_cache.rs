//! Bounded least-recently-used cache of per-tenant objects.
//!
//! Misses are filled by a factory while the cache lock is held, so at most
//! one construction runs per cache at a time and concurrent requests for
//! the same missing tenant wait for the first one instead of duplicating it.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::GatewayError;

type Factory<T> = Box<dyn Fn(String) -> BoxFuture<'static, Result<T, GatewayError>> + Send + Sync>;

struct Inner<T> {
    entries: HashMap<String, T>,
    /// Front is least recently used.
    recency: VecDeque<String>,
}

impl<T> Inner<T> {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }
}

pub struct TenantCache<T> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<T>>,
    factory: Factory<T>,
}

impl<T: Clone + Send + 'static> TenantCache<T> {
    /// `capacity` is clamped to at least one entry.
    pub fn new<F, Fut>(name: &'static str, capacity: usize, factory: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        Self {
            name,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
            }),
            factory: Box::new(move |key| factory(key).boxed()),
        }
    }

    /// Cached value for `tenant_id`, constructing it on a miss. A failed
    /// construction leaves the cache untouched.
    pub async fn get(&self, tenant_id: &str) -> Result<T, GatewayError> {
        let mut inner = self.inner.lock().await;

        if let Some(value) = inner.entries.get(tenant_id).cloned() {
            inner.touch(tenant_id);
            return Ok(value);
        }

        debug!(cache = self.name, tenant = %tenant_id, "cache miss, constructing");
        let value = (self.factory)(tenant_id.to_string()).await?;

        if inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner.recency.pop_front() {
                inner.entries.remove(&evicted);
                debug!(cache = self.name, tenant = %evicted, "evicted least recently used");
            }
        }
        inner.entries.insert(tenant_id.to_string(), value.clone());
        inner.recency.push_back(tenant_id.to_string());

        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    #[cfg(test)]
    async fn keys_by_recency(&self) -> Vec<String> {
        self.inner.lock().await.recency.iter().cloned().collect()
    }
}
