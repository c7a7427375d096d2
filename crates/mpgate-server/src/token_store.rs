//! Per-tenant access-token cache in the shared key-value store.
//!
//! Refreshes are single-flight across every gateway process sharing the
//! store: a refresher must first win a `set_nx` lock that expires on its
//! own, so a crashed holder only delays others by the lock TTL. Losers
//! either walk away (background refresh) or poll for the winner's token.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use mpgate_shared::constants::{
    MAX_TOKEN_TTL, REFRESH_LOCK_TTL, REFRESH_POLL_ATTEMPTS, REFRESH_POLL_INTERVAL,
    TOKEN_LOW_WATER_MARK,
};
use mpgate_shared::types::TenantCredentials;

use crate::error::GatewayError;
use crate::kv::KvStore;
use crate::platform::TokenIssuer;

#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
    issuer: Arc<dyn TokenIssuer>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            kv,
            issuer,
            poll_interval: REFRESH_POLL_INTERVAL,
            poll_attempts: REFRESH_POLL_ATTEMPTS,
        }
    }

    #[cfg(test)]
    fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Current token, refreshing synchronously when none is stored. A token
    /// close to expiry is still returned, with a refresh started in the
    /// background.
    pub async fn get_token(&self, tenant: &TenantCredentials) -> Result<String, GatewayError> {
        let key = tenant.access_token_key();

        let Some(token) = self.read_token(&key).await? else {
            debug!(tenant = %tenant.tenant_id, "no stored access token, refreshing");
            return self.refresh(tenant, true).await?.ok_or_else(|| {
                GatewayError::Credential(format!("no token obtained for {}", tenant.tenant_id))
            });
        };

        if let Some(ttl) = self.kv.ttl(&key).await? {
            if ttl < TOKEN_LOW_WATER_MARK {
                debug!(tenant = %tenant.tenant_id, ttl_secs = ttl.as_secs(), "token near expiry");
                self.spawn_background_refresh(tenant.clone());
            }
        }

        Ok(token)
    }

    fn spawn_background_refresh(&self, tenant: TenantCredentials) {
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.refresh(&tenant, false).await {
                warn!(tenant = %tenant.tenant_id, error = %e, "background token refresh failed");
            }
        });
    }

    /// Single-flight refresh.
    ///
    /// Returns the new token when this call won the lock. When another
    /// refresher holds it, returns `Ok(None)` if `wait` is false, otherwise
    /// polls for that refresher's token and fails with
    /// [`GatewayError::Credential`] once the polls run out.
    pub async fn refresh(
        &self,
        tenant: &TenantCredentials,
        wait: bool,
    ) -> Result<Option<String>, GatewayError> {
        let lock_key = tenant.access_token_lock_key();

        if self.kv.set_nx(&lock_key, "1", REFRESH_LOCK_TTL).await? {
            let issued = self.issue_and_store(tenant).await;
            if let Err(e) = self.kv.del(&lock_key).await {
                warn!(tenant = %tenant.tenant_id, error = %e, "failed to release refresh lock");
            }
            return issued.map(Some);
        }

        if !wait {
            debug!(tenant = %tenant.tenant_id, "refresh already in progress elsewhere");
            return Ok(None);
        }

        let key = tenant.access_token_key();
        for _ in 0..self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(token) = self.read_token(&key).await? {
                return Ok(Some(token));
            }
        }

        Err(GatewayError::Credential(format!(
            "timed out waiting for token refresh of {}",
            tenant.tenant_id
        )))
    }

    /// Drop the stored token and refresh synchronously. Used after the
    /// platform rejects a token, so waiters do not pick the stale one back up.
    pub async fn force_refresh(&self, tenant: &TenantCredentials) -> Result<String, GatewayError> {
        self.kv.del(&tenant.access_token_key()).await?;
        self.refresh(tenant, true).await?.ok_or_else(|| {
            GatewayError::Credential(format!("no token obtained for {}", tenant.tenant_id))
        })
    }

    async fn issue_and_store(&self, tenant: &TenantCredentials) -> Result<String, GatewayError> {
        let issued = self
            .issuer
            .issue(&tenant.api_key, &tenant.api_secret)
            .await?;
        let expires_in = issued.expires_in.min(MAX_TOKEN_TTL);
        self.kv
            .set(&tenant.access_token_key(), &issued.value, Some(expires_in))
            .await?;
        info!(
            tenant = %tenant.tenant_id,
            expires_in = expires_in.as_secs(),
            "access token refreshed"
        );
        Ok(issued.value)
    }

    async fn read_token(&self, key: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.kv.get(key).await?.filter(|t| !t.is_empty()))
    }
}
