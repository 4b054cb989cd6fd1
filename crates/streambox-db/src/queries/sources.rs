//! Media source CRUD operations.
//!
//! Sources are soft-disabled rather than deleted while media items still
//! reference them; `delete_source` refuses in that case.

use chrono::Utc;
use rusqlite::Connection;
use streambox_core::{Error, Result, SourceId, SourceKind};

use super::db_err;
use crate::models::Source;

const COLS: &str = "id, name, protocol, host, port, username, credential, \
                    base_path, domain, enabled, created_at";

/// Parameters for creating or updating a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub protocol: SourceKind,
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Already-encrypted credential blob.
    pub credential: Option<String>,
    pub base_path: Option<String>,
    pub domain: Option<String>,
}

/// Create a new source and return it.
pub fn create_source(conn: &Connection, new: &NewSource) -> Result<Source> {
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO sources (name, protocol, host, port, username, credential,
                              base_path, domain, enabled, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
        rusqlite::params![
            new.name,
            new.protocol.as_str(),
            new.host,
            new.port.map(|p| p as i64),
            new.username,
            new.credential,
            new.base_path,
            new.domain,
            created_at,
        ],
    )
    .map_err(db_err)?;

    let id = SourceId::new(conn.last_insert_rowid());
    get_source(conn, id).map(|opt| opt.expect("just inserted"))
}

/// Get a source by primary key.
pub fn get_source(conn: &Connection, id: SourceId) -> Result<Option<Source>> {
    let q = format!("SELECT {COLS} FROM sources WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], Source::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// List all sources, oldest first.
pub fn list_sources(conn: &Connection) -> Result<Vec<Source>> {
    let q = format!("SELECT {COLS} FROM sources ORDER BY id");
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([], Source::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Update an existing source in place.
pub fn update_source(conn: &Connection, id: SourceId, new: &NewSource) -> Result<Source> {
    let n = conn
        .execute(
            "UPDATE sources SET name = ?1, protocol = ?2, host = ?3, port = ?4,
                                username = ?5, credential = ?6, base_path = ?7,
                                domain = ?8
             WHERE id = ?9",
            rusqlite::params![
                new.name,
                new.protocol.as_str(),
                new.host,
                new.port.map(|p| p as i64),
                new.username,
                new.credential,
                new.base_path,
                new.domain,
                id.as_i64(),
            ],
        )
        .map_err(db_err)?;

    if n == 0 {
        return Err(Error::not_found("source", id));
    }
    get_source(conn, id).map(|opt| opt.expect("just updated"))
}

/// Enable or disable a source.
pub fn set_enabled(conn: &Connection, id: SourceId, enabled: bool) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE sources SET enabled = ?1 WHERE id = ?2",
            rusqlite::params![enabled as i32, id.as_i64()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Delete a source. Sources still referenced by media items are soft-disabled
/// instead, and `Conflict` is returned so the caller can tell the operator.
pub fn delete_source(conn: &Connection, id: SourceId) -> Result<bool> {
    let referencing: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM media_items WHERE source_id = ?1",
            [id.as_i64()],
            |row| row.get(0),
        )
        .map_err(db_err)?;

    if referencing > 0 {
        set_enabled(conn, id, false)?;
        return Err(Error::Conflict(format!(
            "source {id} is referenced by {referencing} media items; disabled instead"
        )));
    }

    let n = conn
        .execute("DELETE FROM sources WHERE id = ?1", [id.as_i64()])
        .map_err(db_err)?;
    Ok(n > 0)
}
