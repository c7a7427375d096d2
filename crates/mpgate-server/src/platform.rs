//! Outbound calls to the messaging platform's HTTP API.
//!
//! [`HttpTokenIssuer`] exchanges a tenant's key pair for an access token;
//! [`PlatformClient`] performs authenticated calls on behalf of one tenant,
//! drawing tokens from the shared [`CredentialStore`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use mpgate_shared::constants::{API_UNAUTHORIZED_CODE, TOKEN_INVALID_CODES};
use mpgate_shared::reply::ReplyMessage;
use mpgate_shared::types::{AccessToken, TenantCredentials};

use crate::config::ServerConfig;
use crate::error::GatewayError;
use crate::token_store::CredentialStore;

/// HTTP client shared by every tenant, honouring the configured proxy and
/// timeout.
pub fn build_http_client(config: &ServerConfig) -> Result<reqwest::Client, GatewayError> {
    let mut builder = reqwest::Client::builder().timeout(config.platform_timeout);
    if let Some(proxy) = &config.platform_proxy {
        tracing::info!(proxy = %proxy, "routing platform traffic through proxy");
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| GatewayError::Internal(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Token issuance
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, api_key: &str, api_secret: &str) -> Result<AccessToken, GatewayError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// `GET /cgi-bin/token` issuer.
#[derive(Debug, Clone)]
pub struct HttpTokenIssuer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenIssuer {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, api_key: &str, api_secret: &str) -> Result<AccessToken, GatewayError> {
        let response = self
            .http
            .get(format!("{}/cgi-bin/token", self.base_url))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", api_key),
                ("secret", api_secret),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        if body.errcode != 0 || body.access_token.is_empty() {
            return Err(GatewayError::Credential(format!(
                "token issuance rejected for {api_key}: {} {}",
                body.errcode, body.errmsg
            )));
        }

        debug!(api_key, expires_in = body.expires_in, "access token issued");
        Ok(AccessToken {
            value: body.access_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}

// ---------------------------------------------------------------------------
// Authenticated API client
// ---------------------------------------------------------------------------

/// API client bound to one tenant.
pub struct PlatformClient {
    tenant: TenantCredentials,
    credentials: CredentialStore,
    http: reqwest::Client,
    base_url: String,
}

impl PlatformClient {
    pub fn new(
        tenant: TenantCredentials,
        credentials: CredentialStore,
        http: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            tenant,
            credentials,
            http,
            base_url: base_url.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant.tenant_id
    }

    /// POST `body` to `path` with the current access token attached.
    ///
    /// A token-invalid error code forces a credential refresh before the
    /// error is returned. The call itself is not retried; callers that know
    /// the call is idempotent may retry once on
    /// [`GatewayError::is_token_invalid`].
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let token = self.credentials.get_token(&self.tenant).await?;

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .query(&[("access_token", token.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("{path} returned {status}")));
        }

        let body: Value = response.json().await?;
        self.check_errcode(path, body).await
    }

    async fn check_errcode(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let code = body.get("errcode").and_then(Value::as_i64).unwrap_or(0);
        if code == 0 {
            return Ok(body);
        }

        let errmsg = body
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or_default();
        warn!(tenant = %self.tenant.tenant_id, path, code, errmsg, "platform call failed");

        let message = if TOKEN_INVALID_CODES.contains(&code) {
            self.credentials.force_refresh(&self.tenant).await?;
            format!("access token rejected - {errmsg}")
        } else if code == API_UNAUTHORIZED_CODE {
            format!("API not authorised for this account - {errmsg}")
        } else {
            errmsg.to_string()
        };

        Err(GatewayError::PlatformApi { code, message })
    }

    /// Active push of one message to `to_user`.
    pub async fn send_custom_message(
        &self,
        to_user: &str,
        message: &ReplyMessage,
    ) -> Result<(), GatewayError> {
        let mut body = message.push_body();
        if let Value::Object(map) = &mut body {
            map.insert("touser".into(), Value::String(to_user.to_string()));
        }
        self.post_json("/cgi-bin/message/custom/send", &body)
            .await
            .map(|_| ())
    }

    /// Show the "typing" indicator to `to_user`.
    pub async fn send_typing(&self, to_user: &str) -> Result<(), GatewayError> {
        let body = json!({ "touser": to_user, "command": "Typing" });
        self.post_json("/cgi-bin/message/custom/typing", &body)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::kv::{KvStore, MemoryKvStore};

    pub(crate) fn tenant() -> TenantCredentials {
        TenantCredentials {
            tenant_id: "wx1".into(),
            token: "tok".into(),
            encoding_aes_key: String::new(),
            api_key: "wx1".into(),
            api_secret: "sec".into(),
        }
    }

    pub(crate) async fn mount_token_endpoint(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/cgi-bin/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": token, "expires_in": 7200 })),
            )
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer, kv: Arc<MemoryKvStore>) -> PlatformClient {
        let http = reqwest::Client::new();
        let issuer = Arc::new(HttpTokenIssuer::new(http.clone(), server.uri()));
        let credentials = CredentialStore::new(kv, issuer);
        PlatformClient::new(tenant(), credentials, http, server.uri())
    }

    #[tokio::test]
    async fn test_issuer_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/token"))
            .and(query_param("grant_type", "client_credential"))
            .and(query_param("appid", "wx1"))
            .and(query_param("secret", "sec"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "AT", "expires_in": 7200 })),
            )
            .mount(&server)
            .await;

        let issuer = HttpTokenIssuer::new(reqwest::Client::new(), server.uri());
        let token = issuer.issue("wx1", "sec").await.unwrap();
        assert_eq!(token.value, "AT");
        assert_eq!(token.expires_in, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_issuer_rejection_is_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "errcode": 40125, "errmsg": "invalid appsecret" })),
            )
            .mount(&server)
            .await;

        let issuer = HttpTokenIssuer::new(reqwest::Client::new(), server.uri());
        let err = issuer.issue("wx1", "bad").await.unwrap_err();
        assert!(matches!(err, GatewayError::Credential(_)));
    }

    #[tokio::test]
    async fn test_send_custom_message_body() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "AT").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/custom/send"))
            .and(query_param("access_token", "AT"))
            .and(body_partial_json(json!({
                "touser": "o_user",
                "msgtype": "text",
                "text": { "content": "hello" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errcode": 0, "errmsg": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryKvStore::new()));
        client
            .send_custom_message(
                "o_user",
                &ReplyMessage::Text {
                    content: "hello".into(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_typing() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "AT").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/custom/typing"))
            .and(body_partial_json(json!({ "touser": "o_user", "command": "Typing" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errcode": 0 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryKvStore::new()));
        client.send_typing("o_user").await.unwrap();
    }

    #[tokio::test]
    async fn test_token_invalid_forces_refresh_without_retry() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "FRESH").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/custom/send"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "errcode": 40001, "errmsg": "invalid credential" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let kv = Arc::new(MemoryKvStore::new());
        kv.set("wx1:access_token", "STALE", Some(Duration::from_secs(7000)))
            .await
            .unwrap();

        let client = client_for(&server, kv.clone());
        let err = client
            .send_custom_message("o_user", &ReplyMessage::Text { content: "x".into() })
            .await
            .unwrap_err();

        assert!(err.is_token_invalid());
        assert_eq!(kv.get("wx1:access_token").await.unwrap().as_deref(), Some("FRESH"));
    }

    #[tokio::test]
    async fn test_other_codes_surface_unchanged() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "AT").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/custom/send"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "errcode": 48001, "errmsg": "api unauthorized" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryKvStore::new()));
        let err = client
            .send_custom_message("o_user", &ReplyMessage::Text { content: "x".into() })
            .await
            .unwrap_err();
        match err {
            GatewayError::PlatformApi { code, message } => {
                assert_eq!(code, 48001);
                assert!(message.contains("not authorised"));
                assert!(message.contains("api unauthorized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "AT").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/custom/send"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryKvStore::new()));
        let err = client
            .send_custom_message("o_user", &ReplyMessage::Text { content: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
