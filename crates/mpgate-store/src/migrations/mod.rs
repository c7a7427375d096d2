//! Schema migrations, tracked with `PRAGMA user_version`.
//!
//! Every open of a [`crate::Database`] applies whatever steps in
//! [`MIGRATIONS`] are newer than the file's recorded version, in order.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered `(version, name, up)` steps. Append only.
const MIGRATIONS: &[(u32, &str, Step)] = &[(1, "v001_initial", v001_initial::up)];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = MIGRATIONS.last().map(|(v, _, _)| *v).unwrap_or(0);

    tracing::debug!(
        current_version = current,
        target_version = target,
        "checking database migrations"
    );

    for (version, name, up) in MIGRATIONS {
        if current >= *version {
            continue;
        }
        tracing::info!(migration = name, "applying migration");
        up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}
