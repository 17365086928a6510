//! Schema versioning via `PRAGMA user_version`.
//!
//! Migrations are embedded in the binary and applied in order on startup,
//! each inside its own transaction.

use rusqlite::Connection;
use thiserror::Error;

use super::schema;

/// A database migration.
pub struct Migration {
    /// Version number (sequential, starting from 1).
    pub version: i32,
    pub description: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

/// All migrations in order. Append new ones to the end.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "users and user_payments",
    up: schema::create_schema,
}];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration {version} failed: {message}")]
    MigrationFailed { version: i32, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub fn get_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn set_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

/// Bring the database up to the latest schema version.
pub fn init_db(conn: &mut Connection) -> Result<(), MigrationError> {
    let current_version = get_version(conn)?;

    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        tracing::debug!("Database at version {} (up to date)", current_version);
        return Ok(());
    }

    tracing::info!(
        "Database at version {}, {} migration(s) pending",
        current_version,
        pending.len()
    );

    for migration in pending {
        tracing::info!(
            "Running migration {}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.transaction()?;
        if let Err(e) = (migration.up)(&tx) {
            // Dropping the transaction rolls it back
            tracing::error!("Migration {} failed: {}", migration.version, e);
            return Err(MigrationError::MigrationFailed {
                version: migration.version,
                message: e.to_string(),
            });
        }
        set_version(&tx, migration.version)?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();

        let latest = MIGRATIONS.last().unwrap().version;
        assert_eq!(get_version(&conn).unwrap(), latest);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'user_payments')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        init_db(&mut conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), MIGRATIONS.last().unwrap().version);
    }
}
