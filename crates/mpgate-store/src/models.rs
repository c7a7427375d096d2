//! Configuration documents persisted in the SQLite store.
//!
//! Rule payloads are kept as the raw JSON strings the admin layer wrote;
//! the typed views are parsed on demand so one malformed rule never blocks
//! loading its siblings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mpgate_shared::reply::ReplyPayload;
use mpgate_shared::types::{ReplyCategory, TenantCredentials};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

/// One tenant account and its platform key material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    /// Platform application id; also the tenant key in URLs.
    pub tenant_id: String,
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Webhook signing token.
    pub token: String,
    /// Base64 AES key without trailing `=`. Empty when the tenant does not
    /// use encrypted callbacks.
    pub encoding_aes_key: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn credentials(&self) -> TenantCredentials {
        TenantCredentials {
            tenant_id: self.tenant_id.clone(),
            token: self.token.clone(),
            encoding_aes_key: self.encoding_aes_key.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Auto-reply rule
// ---------------------------------------------------------------------------

/// A single keyword-match definition inside `keywords_def`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordDef {
    pub keyword: String,
    #[serde(default)]
    pub exact: bool,
}

impl KeywordDef {
    pub fn matches(&self, text: &str) -> bool {
        if self.exact {
            text == self.keyword
        } else {
            text.contains(self.keyword.as_str())
        }
    }
}

/// A stored auto-reply rule document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoReplyRule {
    /// Row id; assigned by the store, ignored on insert.
    pub id: i64,
    pub tenant_id: String,
    pub category: ReplyCategory,
    pub rule_title: String,
    /// Published payload. A [`ReplyPayload`] object, or for
    /// [`ReplyCategory::MenuClick`] an object keyed by menu button key.
    pub reply_data: String,
    /// JSON list of [`KeywordDef`]; only meaningful for keyword rules.
    pub keywords_def: String,
    /// Id of the matching document on the platform side, if any.
    pub ext_id: String,
    /// Unpublished edits. Never read by the reply path.
    pub draft_data: String,
    pub created_at: DateTime<Utc>,
}

impl AutoReplyRule {
    pub fn new(tenant_id: &str, category: ReplyCategory, reply_data: impl Into<String>) -> Self {
        Self {
            id: 0,
            tenant_id: tenant_id.to_string(),
            category,
            rule_title: String::new(),
            reply_data: reply_data.into(),
            keywords_def: String::new(),
            ext_id: String::new(),
            draft_data: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_keywords(mut self, keywords_def: impl Into<String>) -> Self {
        self.keywords_def = keywords_def.into();
        self
    }

    pub fn payload(&self) -> Result<ReplyPayload> {
        Ok(serde_json::from_str(&self.reply_data)?)
    }

    /// Payload of one button of a menu-click rule. Only that button's
    /// entry is parsed, so a bad entry silences its own button alone.
    pub fn menu_payload(&self, key: &str) -> Result<Option<ReplyPayload>> {
        let mut menu: HashMap<String, serde_json::Value> = serde_json::from_str(&self.reply_data)?;
        match menu.remove(key) {
            Some(entry) => Ok(Some(serde_json::from_value(entry)?)),
            None => Ok(None),
        }
    }

    /// An empty definition string means no keywords.
    pub fn keyword_defs(&self) -> Result<Vec<KeywordDef>> {
        if self.keywords_def.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.keywords_def)?)
    }
}
