use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-tenant key material. Supplied by the configuration store or the
/// environment and never mutated by the gateway.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantCredentials {
    pub tenant_id: String,
    /// Shared secret mixed into webhook signatures.
    pub token: String,
    /// Base64 AES key without its trailing `=`.
    pub encoding_aes_key: String,
    pub api_key: String,
    pub api_secret: String,
}

impl TenantCredentials {
    /// Shared-store key of this tenant's access token.
    pub fn access_token_key(&self) -> String {
        format!("{}{}", self.tenant_id, crate::constants::ACCESS_TOKEN_KEY_SUFFIX)
    }

    /// Shared-store key of this tenant's refresh lock.
    pub fn access_token_lock_key(&self) -> String {
        format!("{}{}", self.tenant_id, crate::constants::ACCESS_TOKEN_LOCK_SUFFIX)
    }
}

// Secrets stay out of logs.
impl fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

/// A platform access token as issued, with its declared lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Duration,
}

/// Auto-reply classification of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    Subscribe,
    Keyword,
    #[serde(rename = "message")]
    GenericMessage,
    MenuClick,
}

impl ReplyCategory {
    pub const ALL: [ReplyCategory; 4] = [
        ReplyCategory::Subscribe,
        ReplyCategory::Keyword,
        ReplyCategory::GenericMessage,
        ReplyCategory::MenuClick,
    ];

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyCategory::Subscribe => "subscribe",
            ReplyCategory::Keyword => "keyword",
            ReplyCategory::GenericMessage => "message",
            ReplyCategory::MenuClick => "menu_click",
        }
    }
}

impl fmt::Display for ReplyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReplyCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown reply category: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_str_roundtrip() {
        for category in ReplyCategory::ALL {
            assert_eq!(category.as_str().parse::<ReplyCategory>().unwrap(), category);
        }
        assert!("menuClick".parse::<ReplyCategory>().is_err());
    }

    #[test]
    fn test_store_keys_are_tenant_scoped() {
        let creds = TenantCredentials {
            tenant_id: "wx1".into(),
            token: "t".into(),
            encoding_aes_key: String::new(),
            api_key: "wx1".into(),
            api_secret: "s".into(),
        };
        assert_eq!(creds.access_token_key(), "wx1:access_token");
        assert_eq!(creds.access_token_lock_key(), "wx1:access_token_lock");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = TenantCredentials {
            tenant_id: "wx1".into(),
            token: "sig-secret".into(),
            encoding_aes_key: "aes-secret".into(),
            api_key: "wx1".into(),
            api_secret: "api-secret".into(),
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("secret"));
    }
}
