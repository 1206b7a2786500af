//! Database migration system.
//!
//! Schema version stored in `PRAGMA user_version`. Migrations are forward-only.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Schema steps, each tagged with the version it produces.
const STEPS: &[(u32, &str)] = &[(1, schema::SCHEMA_V1)];

/// Apply every step newer than the database's `user_version`, each in its
/// own transaction.
pub fn run(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    let mut reached = current;
    for &(version, sql) in STEPS.iter().filter(|(version, _)| *version > current) {
        tracing::info!(from = reached, to = version, "applying schema migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        reached = version;
    }

    if reached != SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "no migration path from v{reached} to v{SCHEMA_VERSION}"
        )));
    }
    Ok(())
}
