//! Database connection pool management.
//!
//! Connection pooling for SQLite using r2d2. Handles pool initialization,
//! connection customization, and running migrations at boot.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use streambox_core::{Error, Result};

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Initialize a new database pool backed by the given file path.
///
/// Creates the database file if missing, enables foreign key constraints on
/// every connection, and runs pending migrations. Migration failures abort
/// startup.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    build_pool(manager)
}

/// Initialize an in-memory database pool for testing.
///
/// A single shared connection keeps the in-memory database alive and gives
/// the "single logical writer" serialization the data model expects.
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create in-memory pool: {e}")))?;

    run_boot_migrations(&pool)?;
    Ok(pool)
}

fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {e}")))?;

    run_boot_migrations(&pool)?;
    Ok(pool)
}

fn run_boot_migrations(pool: &DbPool) -> Result<()> {
    let conn = pool
        .get()
        .map_err(|e| Error::database(format!("Failed to get connection for migrations: {e}")))?;
    migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {e}")))?;
    Ok(())
}

/// Get a connection from the pool, converting the r2d2 error into ours.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_memory_pool_runs_migrations() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='media_items'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn foreign_keys_enabled() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn pool_persists_data_between_connections() {
        let pool = init_memory_pool().unwrap();

        {
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO users (username, password_hash, is_admin, created_at)
                 VALUES (?, ?, 0, datetime('now'))",
                rusqlite::params!["tester", "hash"],
            )
            .unwrap();
        }

        let conn = get_conn(&pool).unwrap();
        let username: String = conn
            .query_row(
                "SELECT username FROM users WHERE username = ?",
                ["tester"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(username, "tester");
    }
}
