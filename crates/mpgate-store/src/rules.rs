use chrono::{DateTime, Utc};
use rusqlite::params;

use mpgate_shared::types::ReplyCategory;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::AutoReplyRule;

const RULE_COLUMNS: &str =
    "id, tenant_id, category, rule_title, reply_data, keywords_def, ext_id, draft_data, created_at";

impl Database {
    /// Store a rule and return its assigned id. `rule.id` is ignored.
    pub fn insert_rule(&self, rule: &AutoReplyRule) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO auto_replies
                 (tenant_id, category, rule_title, reply_data, keywords_def, ext_id, draft_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rule.tenant_id,
                rule.category.as_str(),
                rule.rule_title,
                rule.reply_data,
                rule.keywords_def,
                rule.ext_id,
                rule.draft_data,
                rule.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Rules of one tenant and category in insertion order.
    pub fn list_rules(&self, tenant_id: &str, category: ReplyCategory) -> Result<Vec<AutoReplyRule>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM auto_replies
             WHERE tenant_id = ?1 AND category = ?2
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![tenant_id, category.as_str()], row_to_rule)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_rule(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM auto_replies WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutoReplyRule> {
    let category_str: String = row.get(2)?;
    let created_str: String = row.get(8)?;

    let category = category_str.parse::<ReplyCategory>().map_err(|e| {
        conversion_error(
            2,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(8, e))?;

    Ok(AutoReplyRule {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        category,
        rule_title: row.get(3)?,
        reply_data: row.get(4)?,
        keywords_def: row.get(5)?,
        ext_id: row.get(6)?,
        draft_data: row.get(7)?,
        created_at,
    })
}
