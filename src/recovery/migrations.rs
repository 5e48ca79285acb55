use anyhow::{bail, Context, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_V1: &str = include_str!("schemas/schema_v1.sql");

/// Creates the key/value table on a fresh database and stamps `user_version`.
///
/// Databases already at the current version are left alone; newer ones are
/// refused rather than written with an older layout.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read recovery store version")?;

    match found {
        SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn
                .transaction()
                .context("failed to open schema transaction")?;
            tx.execute_batch(SCHEMA_V1)
                .context("failed to create recovery tables")?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("failed to stamp recovery store version")?;
            tx.commit().context("failed to commit recovery schema")
        }
        other => bail!(
            "recovery store version {other} is not supported (expected {SCHEMA_VERSION})"
        ),
    }
}
