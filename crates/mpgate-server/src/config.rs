//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the gateway can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mpgate_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_PLATFORM_BASE_URL, DEFAULT_TENANT_CACHE_CAPACITY,
};
use mpgate_shared::types::TenantCredentials;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file holding tenants and auto-reply rules.
    /// Env: `DATABASE_PATH`
    /// Default: `./mpgate.db`
    pub database_path: PathBuf,

    /// Env: `HANDLER_CACHE_CAPACITY`
    pub handler_cache_capacity: usize,

    /// Env: `CLIENT_CACHE_CAPACITY`
    pub client_cache_capacity: usize,

    /// Env: `PLATFORM_BASE_URL`
    pub platform_base_url: String,

    /// Outbound proxy for platform traffic.
    /// Env: `WA_PROXY`
    pub platform_proxy: Option<String>,

    /// Env: `PLATFORM_TIMEOUT_SECS`
    /// Default: 10 seconds.
    pub platform_timeout: Duration,

    /// Tenant configured entirely from `MP_APPID`, `MP_APPSECRET`,
    /// `MP_TOKEN` and `MP_AESKEY`. Set only when `MP_APPID` is present.
    pub default_tenant: Option<TenantCredentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./mpgate.db"),
            handler_cache_capacity: DEFAULT_TENANT_CACHE_CAPACITY,
            client_cache_capacity: DEFAULT_TENANT_CACHE_CAPACITY,
            platform_base_url: DEFAULT_PLATFORM_BASE_URL.to_string(),
            platform_proxy: None,
            platform_timeout: Duration::from_secs(10),
            default_tenant: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(n) = parse_capacity(var("HANDLER_CACHE_CAPACITY"), "HANDLER_CACHE_CAPACITY") {
            config.handler_cache_capacity = n;
        }
        if let Some(n) = parse_capacity(var("CLIENT_CACHE_CAPACITY"), "CLIENT_CACHE_CAPACITY") {
            config.client_cache_capacity = n;
        }

        if let Some(url) = var("PLATFORM_BASE_URL") {
            config.platform_base_url = url.trim_end_matches('/').to_string();
        }

        config.platform_proxy = var("WA_PROXY").filter(|p| !p.is_empty());

        if let Some(val) = var("PLATFORM_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.platform_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid PLATFORM_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(app_id) = var("MP_APPID").filter(|v| !v.is_empty()) {
            config.default_tenant = Some(TenantCredentials {
                api_key: app_id.clone(),
                tenant_id: app_id,
                api_secret: var("MP_APPSECRET").unwrap_or_default(),
                token: var("MP_TOKEN").unwrap_or_default(),
                encoding_aes_key: var("MP_AESKEY").unwrap_or_default(),
            });
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_capacity(value: Option<String>, name: &str) -> Option<usize> {
    let value = value?;
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var = name, value = %value, "Invalid cache capacity, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.handler_cache_capacity, 2);
        assert!(config.default_tenant.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("HANDLER_CACHE_CAPACITY", "16"),
            ("PLATFORM_BASE_URL", "http://localhost:1234/"),
            ("WA_PROXY", "http://proxy:3128"),
            ("PLATFORM_TIMEOUT_SECS", "3"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.handler_cache_capacity, 16);
        assert_eq!(config.client_cache_capacity, 2);
        assert_eq!(config.platform_base_url, "http://localhost:1234");
        assert_eq!(config.platform_proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.platform_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_map(&[
            ("HTTP_ADDR", "not an addr"),
            ("CLIENT_CACHE_CAPACITY", "0"),
            ("PLATFORM_TIMEOUT_SECS", "soon"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.client_cache_capacity, 2);
        assert_eq!(config.platform_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_default_tenant_from_env() {
        let config = from_map(&[
            ("MP_APPID", "wxenv"),
            ("MP_APPSECRET", "sec"),
            ("MP_TOKEN", "tok"),
        ]);
        let tenant = config.default_tenant.unwrap();
        assert_eq!(tenant.tenant_id, "wxenv");
        assert_eq!(tenant.api_key, "wxenv");
        assert_eq!(tenant.token, "tok");
        assert!(tenant.encoding_aes_key.is_empty());
    }
}
