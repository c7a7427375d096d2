//! Webhook pipeline: authenticate, decrypt, decode, resolve, reply.
//!
//! The platform accepts at most one inline (passive) reply per callback and
//! only for some message kinds. The first resolved message goes inline when
//! it can; everything else is pushed through the API.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use mpgate_shared::constants::ENCRYPT_TYPE_AES;
use mpgate_shared::crypto;
use mpgate_shared::error::CodecError;
use mpgate_shared::protocol::{self, ContentFormat, InboundMessage};
use mpgate_shared::reply::ReplyMessage;
use mpgate_shared::types::TenantCredentials;

use crate::config::ServerConfig;
use crate::config_store::ConfigStore;
use crate::error::GatewayError;
use crate::platform::PlatformClient;
use crate::resolver::AutoReplyResolver;
use crate::tenant_cache::TenantCache;
use crate::token_store::CredentialStore;

/// Query string of a webhook call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub nonce: String,
    pub echostr: Option<String>,
    pub encrypt_type: Option<String>,
    pub msg_signature: Option<String>,
}

impl WebhookQuery {
    fn is_encrypted(&self) -> bool {
        self.encrypt_type.as_deref() == Some(ENCRYPT_TYPE_AES)
    }
}

/// Successful outcome of a webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookResponse {
    /// Handshake: the `echostr` bytes verbatim.
    Echo(String),
    /// Inline reply document.
    Reply { body: String, format: ContentFormat },
    /// Nothing to reply inline.
    Ack,
}

/// Per-tenant verification and decryption state.
pub struct TenantHandler {
    credentials: TenantCredentials,
}

impl TenantHandler {
    pub fn new(credentials: TenantCredentials) -> Self {
        Self { credentials }
    }

    fn verify(&self, query: &WebhookQuery) -> Result<(), GatewayError> {
        let parts = [
            self.credentials.token.as_str(),
            query.timestamp.as_str(),
            query.nonce.as_str(),
        ];
        if crypto::verify_signature(&query.signature, &parts) {
            Ok(())
        } else {
            Err(GatewayError::Authentication)
        }
    }

    /// Plaintext message body. Encrypted bodies are unwrapped, checked
    /// against `msg_signature` and decrypted.
    fn open(
        &self,
        query: &WebhookQuery,
        body: &[u8],
        format: ContentFormat,
    ) -> Result<Vec<u8>, GatewayError> {
        if !query.is_encrypted() {
            return Ok(body.to_vec());
        }

        let envelope = protocol::decode_envelope(body, format)?;
        let msg_signature = query
            .msg_signature
            .as_deref()
            .ok_or(GatewayError::Authentication)?;
        let parts = [
            self.credentials.token.as_str(),
            query.timestamp.as_str(),
            query.nonce.as_str(),
            envelope.encrypt.as_str(),
        ];
        if !crypto::verify_signature(msg_signature, &parts) {
            return Err(GatewayError::Authentication);
        }

        Ok(crypto::decrypt(
            &self.credentials.encoding_aes_key,
            &envelope.encrypt,
        )?)
    }
}

pub struct ProtocolGateway {
    handlers: TenantCache<Arc<TenantHandler>>,
    clients: TenantCache<Arc<PlatformClient>>,
    resolver: AutoReplyResolver,
}

impl ProtocolGateway {
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn ConfigStore>,
        credentials: CredentialStore,
        http: reqwest::Client,
    ) -> Self {
        let handler_store = store.clone();
        let handlers = TenantCache::new("handlers", config.handler_cache_capacity, move |tenant_id| {
            let store = handler_store.clone();
            async move {
                let creds = lookup_credentials(store.as_ref(), &tenant_id).await?;
                Ok(Arc::new(TenantHandler::new(creds)))
            }
        });

        let client_store = store.clone();
        let base_url = config.platform_base_url.clone();
        let clients = TenantCache::new("clients", config.client_cache_capacity, move |tenant_id| {
            let store = client_store.clone();
            let credentials = credentials.clone();
            let http = http.clone();
            let base_url = base_url.clone();
            async move {
                let creds = lookup_credentials(store.as_ref(), &tenant_id).await?;
                Ok(Arc::new(PlatformClient::new(creds, credentials, http, base_url)))
            }
        });

        Self {
            handlers,
            clients,
            resolver: AutoReplyResolver::new(store),
        }
    }

    /// Number of tenants with a cached protocol handler.
    pub async fn cached_tenants(&self) -> usize {
        self.handlers.len().await
    }

    /// GET handshake.
    pub async fn verify(
        &self,
        tenant_id: &str,
        query: &WebhookQuery,
    ) -> Result<WebhookResponse, GatewayError> {
        let handler = self.handlers.get(tenant_id).await?;
        handler.verify(query)?;
        debug!(tenant = %tenant_id, "handshake verified");
        Ok(WebhookResponse::Echo(query.echostr.clone().unwrap_or_default()))
    }

    /// POST callback.
    pub async fn handle(
        &self,
        tenant_id: &str,
        query: &WebhookQuery,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookResponse, GatewayError> {
        let handler = self.handlers.get(tenant_id).await?;
        let format = ContentFormat::from_content_type(content_type);

        handler.verify(query)?;
        let plaintext = handler.open(query, body, format)?;

        let Some(message) = protocol::decode_message(&plaintext, format)? else {
            debug!(tenant = %tenant_id, "unrecognised message type, acknowledging");
            return Ok(WebhookResponse::Ack);
        };
        debug!(tenant = %tenant_id, kind = message.kind().as_str(), "decoded message");

        let replies = self.resolver.resolve(tenant_id, &message).await?;
        self.dispatch(tenant_id, &message, replies, format).await
    }

    async fn dispatch(
        &self,
        tenant_id: &str,
        message: &InboundMessage,
        replies: Vec<ReplyMessage>,
        format: ContentFormat,
    ) -> Result<WebhookResponse, GatewayError> {
        let mut replies = replies.into_iter();
        let mut inline = None;
        let mut pushes = Vec::new();

        if let Some(first) = replies.next() {
            if first.kind().is_passive_capable() {
                inline = Some(first);
            } else {
                pushes.push(first);
            }
        }
        pushes.extend(replies);

        if !pushes.is_empty() {
            self.push_all(tenant_id, message.from_user(), &pushes, inline.is_none())
                .await;
        }

        let Some(reply) = inline else {
            return Ok(WebhookResponse::Ack);
        };

        let created = chrono::Utc::now().timestamp();
        let encoded = reply.encode_passive(message.from_user(), message.to_user(), created, format);
        Ok(inline_response(tenant_id, encoded, format))
    }

    /// Best effort: each failure is logged and the remaining messages are
    /// still attempted.
    async fn push_all(
        &self,
        tenant_id: &str,
        to_user: &str,
        messages: &[ReplyMessage],
        show_typing: bool,
    ) {
        let client = match self.clients.get(tenant_id).await {
            Ok(client) => client,
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, dropped = messages.len(), "no platform client, dropping pushes");
                return;
            }
        };

        if show_typing {
            if let Err(e) = client.send_typing(to_user).await {
                debug!(tenant = %client.tenant_id(), error = %e, "typing indicator failed");
            }
        }

        for (idx, message) in messages.iter().enumerate() {
            if let Err(e) = client.send_custom_message(to_user, message).await {
                warn!(
                    tenant = %client.tenant_id(),
                    idx,
                    kind = message.kind().as_str(),
                    token_invalid = e.is_token_invalid(),
                    error = %e,
                    "active push failed"
                );
            }
        }
    }
}

/// An inline reply that cannot be encoded degrades to a plain
/// acknowledgement.
fn inline_response(
    tenant_id: &str,
    encoded: Result<Option<String>, CodecError>,
    format: ContentFormat,
) -> WebhookResponse {
    match encoded {
        Ok(Some(body)) => WebhookResponse::Reply { body, format },
        Ok(None) => WebhookResponse::Ack,
        Err(e) => {
            warn!(tenant = %tenant_id, error = %e, "inline reply encoding failed");
            WebhookResponse::Ack
        }
    }
}

async fn lookup_credentials(
    store: &dyn ConfigStore,
    tenant_id: &str,
) -> Result<TenantCredentials, GatewayError> {
    store
        .tenant_credentials(tenant_id)
        .await?
        .ok_or_else(|| GatewayError::ConfigurationMissing(tenant_id.to_string()))
}
