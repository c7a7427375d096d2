//! Read side of the tenant configuration consumed by the gateway.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mpgate_shared::types::{ReplyCategory, TenantCredentials};
use mpgate_store::{AutoReplyRule, Database, StoreError};

use crate::error::GatewayError;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `None` when the tenant is unknown.
    async fn tenant_credentials(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantCredentials>, GatewayError>;

    async fn feature_enabled(
        &self,
        tenant_id: &str,
        category: ReplyCategory,
    ) -> Result<bool, GatewayError>;

    /// Rules in insertion order.
    async fn rules(
        &self,
        tenant_id: &str,
        category: ReplyCategory,
    ) -> Result<Vec<AutoReplyRule>, GatewayError>;
}

/// [`ConfigStore`] over the SQLite database. Queries run on the blocking
/// pool. A tenant configured through the environment shadows any database
/// row with the same id; its flags and rules still come from the database.
#[derive(Clone)]
pub struct SqliteConfigStore {
    db: Arc<Mutex<Database>>,
    default_tenant: Option<TenantCredentials>,
}

impl SqliteConfigStore {
    pub fn new(db: Database, default_tenant: Option<TenantCredentials>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            default_tenant,
        }
    }

    async fn with_db<R, F>(&self, f: F) -> Result<R, GatewayError>
    where
        R: Send + 'static,
        F: FnOnce(&Database) -> Result<R, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| GatewayError::Internal("database mutex poisoned".into()))?;
            f(&guard).map_err(GatewayError::from)
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn tenant_credentials(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantCredentials>, GatewayError> {
        if let Some(tenant) = self
            .default_tenant
            .as_ref()
            .filter(|t| t.tenant_id == tenant_id)
        {
            return Ok(Some(tenant.clone()));
        }

        let id = tenant_id.to_string();
        self.with_db(move |db| match db.get_tenant(&id) {
            Ok(tenant) => Ok(Some(tenant.credentials())),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn feature_enabled(
        &self,
        tenant_id: &str,
        category: ReplyCategory,
    ) -> Result<bool, GatewayError> {
        let id = tenant_id.to_string();
        self.with_db(move |db| db.feature_enabled(&id, category))
            .await
    }

    async fn rules(
        &self,
        tenant_id: &str,
        category: ReplyCategory,
    ) -> Result<Vec<AutoReplyRule>, GatewayError> {
        let id = tenant_id.to_string();
        self.with_db(move |db| db.list_rules(&id, category)).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mpgate_shared::protocol::{EventMessage, InboundMessage};
    use mpgate_store::Tenant;

    use super::*;
    use crate::resolver::tests::{header, text};
    use crate::resolver::AutoReplyResolver;

    fn env_tenant() -> TenantCredentials {
        TenantCredentials {
            tenant_id: "wxenv".into(),
            token: "envtok".into(),
            encoding_aes_key: String::new(),
            api_key: "wxenv".into(),
            api_secret: "envsec".into(),
        }
    }

    fn seeded() -> SqliteConfigStore {
        let db = Database::open_in_memory().unwrap();
        for id in ["wx1", "wxenv"] {
            db.upsert_tenant(&Tenant {
                tenant_id: id.into(),
                name: String::new(),
                api_key: id.into(),
                api_secret: "dbsec".into(),
                token: "dbtok".into(),
                encoding_aes_key: String::new(),
                created_at: Utc::now(),
            })
            .unwrap();
        }
        db.set_feature_enabled("wxenv", ReplyCategory::Subscribe, true)
            .unwrap();
        db.insert_rule(&AutoReplyRule::new("wx1", ReplyCategory::Keyword, "{}"))
            .unwrap();
        SqliteConfigStore::new(db, Some(env_tenant()))
    }

    #[tokio::test]
    async fn test_tenant_lookup() {
        let store = seeded();
        let creds = store.tenant_credentials("wx1").await.unwrap().unwrap();
        assert_eq!(creds.token, "dbtok");
        assert!(store.tenant_credentials("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_environment_tenant_shadows_database() {
        let store = seeded();
        let creds = store.tenant_credentials("wxenv").await.unwrap().unwrap();
        assert_eq!(creds.token, "envtok");
        assert!(store
            .feature_enabled("wxenv", ReplyCategory::Subscribe)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_environment_tenant_on_empty_database() {
        let store = SqliteConfigStore::new(Database::open_in_memory().unwrap(), Some(env_tenant()));

        let creds = store.tenant_credentials("wxenv").await.unwrap().unwrap();
        assert_eq!(creds.api_secret, "envsec");
        for category in ReplyCategory::ALL {
            assert!(!store.feature_enabled("wxenv", category).await.unwrap());
            assert!(store.rules("wxenv", category).await.unwrap().is_empty());
        }
        assert!(store.tenant_credentials("wx1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_environment_tenant_without_rules_gets_no_reply() {
        let store = Arc::new(SqliteConfigStore::new(
            Database::open_in_memory().unwrap(),
            Some(env_tenant()),
        ));
        let resolver = AutoReplyResolver::new(store);

        let subscribe = InboundMessage::Event(EventMessage {
            header: header(),
            event: "subscribe".into(),
            event_key: String::new(),
            ticket: String::new(),
        });
        assert!(resolver.resolve("wxenv", &subscribe).await.unwrap().is_empty());
        assert!(resolver.resolve("wxenv", &text("hello")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rules_and_flags_pass_through() {
        let store = seeded();
        assert_eq!(store.rules("wx1", ReplyCategory::Keyword).await.unwrap().len(), 1);
        assert!(store.rules("wx1", ReplyCategory::Subscribe).await.unwrap().is_empty());
        assert!(!store
            .feature_enabled("wx1", ReplyCategory::Keyword)
            .await
            .unwrap());
    }
}
