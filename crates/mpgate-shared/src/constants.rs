use std::time::Duration;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Decoded length of a tenant's encoding key (AES-256)
pub const AES_KEY_SIZE: usize = 32;

/// Largest PKCS#7 pad value accepted on decrypt. The platform pads to
/// 32-byte multiples even though the cipher block is 16.
pub const MAX_PAD: usize = 32;

/// Random prefix in the decrypted plaintext layout
pub const RANDOM_PREFIX_SIZE: usize = 16;

/// Big-endian content length following the random prefix
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Query value of `encrypt_type` that marks an encrypted body
pub const ENCRYPT_TYPE_AES: &str = "aes";

/// Content-type fragment that selects the XML wire format
pub const XML_CONTENT_TYPE_MARKER: &str = "text/xml";

/// Acknowledgement body the platform treats as "handled, do not retry"
pub const ACK_BODY: &str = "success";

/// Suffix of the shared-store key holding a tenant's access token
pub const ACCESS_TOKEN_KEY_SUFFIX: &str = ":access_token";

/// Suffix of the shared-store key used as the refresh lock
pub const ACCESS_TOKEN_LOCK_SUFFIX: &str = ":access_token_lock";

/// Remaining token lifetime below which a background refresh starts
pub const TOKEN_LOW_WATER_MARK: Duration = Duration::from_secs(300);

/// Upper bound on a stored token's lifetime, whatever the platform declares
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry of the refresh lock, so a crashed holder cannot block forever
pub const REFRESH_LOCK_TTL: Duration = Duration::from_secs(10);

/// Delay between polls while another process refreshes the token
pub const REFRESH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls before a waiting refresh gives up (~5s total)
pub const REFRESH_POLL_ATTEMPTS: u32 = 10;

/// Default capacity of the per-tenant object caches
pub const DEFAULT_TENANT_CACHE_CAPACITY: usize = 2;

/// Platform API root
pub const DEFAULT_PLATFORM_BASE_URL: &str = "https://api.weixin.qq.com";

/// Platform error codes meaning the access token is invalid or expired
pub const TOKEN_INVALID_CODES: [i64; 3] = [40001, 40014, 42001];

/// Platform error code for an API the account is not authorised to use
pub const API_UNAUTHORIZED_CODE: i64 = 48001;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
