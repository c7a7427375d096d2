use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use mpgate_shared::types::ReplyCategory;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Tenant;

impl Database {
    /// Insert a tenant or replace the key material of an existing one.
    /// `created_at` of an existing row is preserved.
    pub fn upsert_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tenants
                 (tenant_id, name, api_key, api_secret, token, encoding_aes_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id) DO UPDATE SET
                 name = excluded.name,
                 api_key = excluded.api_key,
                 api_secret = excluded.api_secret,
                 token = excluded.token,
                 encoding_aes_key = excluded.encoding_aes_key",
            params![
                tenant.tenant_id,
                tenant.name,
                tenant.api_key,
                tenant.api_secret,
                tenant.token,
                tenant.encoding_aes_key,
                tenant.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.conn()
            .query_row(
                "SELECT tenant_id, name, api_key, api_secret, token, encoding_aes_key, created_at
                 FROM tenants WHERE tenant_id = ?1",
                params![tenant_id],
                row_to_tenant,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn set_feature_enabled(
        &self,
        tenant_id: &str,
        category: ReplyCategory,
        enabled: bool,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO feature_flags (tenant_id, category, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, category) DO UPDATE SET enabled = excluded.enabled",
            params![tenant_id, category.as_str(), enabled],
        )?;
        Ok(())
    }

    /// A missing flag row reads as disabled.
    pub fn feature_enabled(&self, tenant_id: &str, category: ReplyCategory) -> Result<bool> {
        let enabled: Option<bool> = self
            .conn()
            .query_row(
                "SELECT enabled FROM feature_flags WHERE tenant_id = ?1 AND category = ?2",
                params![tenant_id, category.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled.unwrap_or(false))
    }
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    let created_str: String = row.get(6)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Tenant {
        tenant_id: row.get(0)?,
        name: row.get(1)?,
        api_key: row.get(2)?,
        api_secret: row.get(3)?,
        token: row.get(4)?,
        encoding_aes_key: row.get(5)?,
        created_at,
    })
}
