//! v001 -- Initial schema creation.
//!
//! Creates `tenants`, `feature_flags` and `auto_replies`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Tenants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS tenants (
    tenant_id        TEXT PRIMARY KEY NOT NULL,   -- platform app id
    name             TEXT NOT NULL DEFAULT '',
    api_key          TEXT NOT NULL,
    api_secret       TEXT NOT NULL,
    token            TEXT NOT NULL,               -- webhook signing token
    encoding_aes_key TEXT NOT NULL DEFAULT '',
    created_at       TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Feature flags (one row per tenant and reply category)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS feature_flags (
    tenant_id TEXT NOT NULL,
    category  TEXT NOT NULL,
    enabled   INTEGER NOT NULL DEFAULT 0,         -- boolean 0/1

    PRIMARY KEY (tenant_id, category)
);

-- ----------------------------------------------------------------
-- Auto-reply rules
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS auto_replies (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id    TEXT NOT NULL,
    category     TEXT NOT NULL,
    rule_title   TEXT NOT NULL DEFAULT '',
    reply_data   TEXT NOT NULL DEFAULT '',        -- published JSON payload
    keywords_def TEXT NOT NULL DEFAULT '',        -- JSON [{keyword, exact}]
    ext_id       TEXT NOT NULL DEFAULT '',
    draft_data   TEXT NOT NULL DEFAULT '',
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_auto_replies_tenant_category
    ON auto_replies(tenant_id, category, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
