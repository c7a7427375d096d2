use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use mpgate_shared::constants::ACK_BODY;

use crate::error::GatewayError;
use crate::gateway::{ProtocolGateway, WebhookQuery, WebhookResponse};

/// Webhook bodies are small documents; anything larger is not a callback.
const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ProtocolGateway>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/gateway/{tenant_id}/handler",
            get(webhook_verify).post(webhook_handle),
        )
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    cached_tenants: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cached_tenants: state.gateway.cached_tenants().await,
    })
}

async fn webhook_verify(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<WebhookQuery>,
) -> Result<WebhookResponse, GatewayError> {
    state.gateway.verify(&tenant_id, &query).await
}

async fn webhook_handle(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<WebhookResponse, GatewayError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    state
        .gateway
        .handle(&tenant_id, &query, content_type, &body)
        .await
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        match self {
            WebhookResponse::Echo(echo) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                echo,
            )
                .into_response(),
            WebhookResponse::Reply { body, format } => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, format.mime())],
                body,
            )
                .into_response(),
            WebhookResponse::Ack => (StatusCode::OK, ACK_BODY).into_response(),
        }
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use mpgate_shared::crypto;

    use super::*;
    use crate::gateway::tests::{gateway, seeded_db, signed_query, text_xml, AES_KEY, TOKEN};

    fn router() -> Router {
        build_router(AppState {
            gateway: Arc::new(gateway(seeded_db(), "http://127.0.0.1:9")),
        })
    }

    fn query_string(query: &WebhookQuery) -> String {
        let mut qs = format!(
            "signature={}&timestamp={}&nonce={}",
            query.signature, query.timestamp, query.nonce
        );
        if let Some(echo) = &query.echostr {
            qs.push_str(&format!("&echostr={echo}"));
        }
        if let Some(kind) = &query.encrypt_type {
            qs.push_str(&format!("&encrypt_type={kind}"));
        }
        if let Some(sig) = &query.msg_signature {
            qs.push_str(&format!("&msg_signature={sig}"));
        }
        qs
    }

    async fn read_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cached_tenants"], 0);
    }

    #[tokio::test]
    async fn test_handshake_echoes() {
        let mut query = signed_query("1700000000", "abc");
        query.echostr = Some("5837397749".into());

        let response = router()
            .oneshot(
                Request::get(format!("/gateway/wx1/handler?{}", query_string(&query)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "5837397749");
    }

    #[tokio::test]
    async fn test_failure_is_json_with_status_ok() {
        let mut query = signed_query("1700000000", "abc");
        query.signature = "0".repeat(40);

        let response = router()
            .oneshot(
                Request::get(format!("/gateway/wx1/handler?{}", query_string(&query)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["code"], 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_reports_404_code() {
        let query = signed_query("1", "2");
        let response = router()
            .oneshot(
                Request::post(format!("/gateway/ghost/handler?{}", query_string(&query)))
                    .header(header::CONTENT_TYPE, "text/xml")
                    .body(Body::from(text_xml("hello")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["code"], 404);
        assert!(!body["message"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_encrypted_post_gets_xml_reply() {
        let encrypted = crypto::encrypt(text_xml("hello").as_bytes(), AES_KEY, "wx1").unwrap();
        let envelope = format!("<xml><ToUserName>gh_tenant</ToUserName><Encrypt>{encrypted}</Encrypt></xml>");

        let mut query = signed_query("1700000000", "n1");
        query.encrypt_type = Some("aes".into());
        query.msg_signature = Some(crypto::compute_signature(&[
            TOKEN,
            "1700000000",
            "n1",
            &encrypted,
        ]));

        let response = router()
            .oneshot(
                Request::post(format!("/gateway/wx1/handler?{}", query_string(&query)))
                    .header(header::CONTENT_TYPE, "text/xml")
                    .body(Body::from(envelope))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );
        let body = read_body(response).await;
        assert!(body.contains("<MsgType>text</MsgType>"));
        assert!(body.contains("<Content>hello back</Content>"));
    }

    #[tokio::test]
    async fn test_no_reply_acknowledges() {
        let query = signed_query("1", "2");
        let response = router()
            .oneshot(
                Request::post(format!("/gateway/wx1/handler?{}", query_string(&query)))
                    .header(header::CONTENT_TYPE, "text/xml")
                    .body(Body::from(text_xml("nothing matches this")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "success");
    }
}
