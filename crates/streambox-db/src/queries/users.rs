//! User CRUD operations.

use chrono::Utc;
use rusqlite::Connection;
use streambox_core::{Error, Result, UserId};

use super::db_err;
use crate::models::User;

const COLS: &str = "id, username, password_hash, is_admin, created_at";

/// Create a new user and return it.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    is_admin: bool,
) -> Result<User> {
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO users (username, password_hash, is_admin, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![username, password_hash, is_admin as i32, created_at],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::Conflict(format!("Username '{username}' already exists"))
        } else {
            db_err(e)
        }
    })?;

    let id = UserId::new(conn.last_insert_rowid());
    Ok(User {
        id,
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        is_admin,
        created_at,
    })
}

/// Get a user by primary key.
pub fn get_user_by_id(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], User::from_row) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Get a user by username.
pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE username = ?1");
    match conn.query_row(&q, [username], User::from_row) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// List all users, oldest first.
pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let q = format!("SELECT {COLS} FROM users ORDER BY id");
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([], User::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Count registered users.
pub fn count_users(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(db_err)
}

/// Delete a user by ID. Returns true if a row was deleted.
pub fn delete_user(conn: &Connection, id: UserId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM users WHERE id = ?1", [id.as_i64()])
        .map_err(db_err)?;
    Ok(n > 0)
}
