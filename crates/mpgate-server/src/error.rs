use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use mpgate_shared::error::{CodecError, CryptoError};
use mpgate_store::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Signature verification failed")]
    Authentication,

    #[error("Malformed request: {0}")]
    Format(String),

    #[error("Decryption failed: {0}")]
    Decryption(#[from] CryptoError),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Platform API error {code}: {message}")]
    PlatformApi { code: i64, message: String },

    #[error("No configuration for tenant {0}")]
    ConfigurationMissing(String),

    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CodecError> for GatewayError {
    fn from(e: CodecError) -> Self {
        GatewayError::Format(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

impl GatewayError {
    /// Application-level code carried in the acknowledgement body.
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::ConfigurationMissing(_) => 404,
            GatewayError::PlatformApi { code, .. } => *code,
            _ => 1,
        }
    }

    /// Message safe to put on the wire. Internal detail is only logged.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Authentication => "signature mismatch",
            GatewayError::Format(_) => "malformed request",
            GatewayError::Decryption(_) => "decryption failed",
            GatewayError::Credential(_) => "credential unavailable",
            GatewayError::PlatformApi { .. } => "platform call failed",
            GatewayError::ConfigurationMissing(_) => "unknown tenant",
            GatewayError::Store(_)
            | GatewayError::Transport(_)
            | GatewayError::Internal(_) => "internal error",
        }
    }

    /// Whether the error means the access token was rejected by the platform.
    pub fn is_token_invalid(&self) -> bool {
        matches!(
            self,
            GatewayError::PlatformApi { code, .. }
                if mpgate_shared::constants::TOKEN_INVALID_CODES.contains(code)
        )
    }
}

// The platform retries anything that is not a 200, so failures are always
// reported in the body.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "webhook request failed");

        let body = serde_json::json!({
            "code": self.code(),
            "message": self.public_message(),
        });

        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[tokio::test]
    async fn test_failure_is_http_200_without_detail() {
        let err = GatewayError::Store(StoreError::Migration("secret table name".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], 1);
        assert_eq!(value["message"], "internal error");
        assert!(!String::from_utf8_lossy(&body).contains("secret"));
    }

    #[test]
    fn test_codes() {
        assert_eq!(GatewayError::ConfigurationMissing("wx".into()).code(), 404);
        let api = GatewayError::PlatformApi {
            code: 40001,
            message: "invalid credential".into(),
        };
        assert_eq!(api.code(), 40001);
        assert!(api.is_token_invalid());
        assert!(!GatewayError::PlatformApi {
            code: 45015,
            message: String::new()
        }
        .is_token_invalid());
    }
}
