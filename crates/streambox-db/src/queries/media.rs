//! Media item operations: inserts from the indexer, metadata updates from
//! the enricher, lookups for the streamer, and admin deletes.

use chrono::Utc;
use rusqlite::Connection;
use streambox_core::{Error, MediaItemId, MediaKind, Result, SourceId, SourceKind};

use super::db_err;
use crate::models::MediaItem;

const COLS: &str = "id, kind, title, year, duration_secs, file_path, file_size, \
                    source_kind, source_id, provider_id, poster_url, backdrop_url, \
                    overview, rating, genres, cast_list, quality, added_at, updated_at";

/// Parameters for inserting a media item from a scan.
#[derive(Debug, Clone)]
pub struct NewMediaItem {
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    pub file_path: String,
    pub file_size: i64,
    pub source_kind: SourceKind,
    pub source_id: Option<SourceId>,
    pub quality: Option<String>,
}

/// Insert a media item. A `(source_kind, source_id, file_path)` collision maps
/// to `Conflict` so the indexer can treat it as "already indexed".
pub fn insert_media_item(conn: &Connection, new: &NewMediaItem) -> Result<MediaItem> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO media_items (kind, title, year, file_path, file_size,
                                  source_kind, source_id, quality, added_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        rusqlite::params![
            new.kind.as_str(),
            new.title,
            new.year,
            new.file_path,
            new.file_size,
            new.source_kind.as_str(),
            new.source_id.map(|s| s.as_i64()),
            new.quality,
            now,
        ],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::Conflict(format!("'{}' is already indexed", new.file_path))
        } else {
            db_err(e)
        }
    })?;

    let id = MediaItemId::new(conn.last_insert_rowid());
    get_media_item(conn, id).map(|opt| opt.expect("just inserted"))
}

/// Get a media item by primary key.
pub fn get_media_item(conn: &Connection, id: MediaItemId) -> Result<Option<MediaItem>> {
    let q = format!("SELECT {COLS} FROM media_items WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], MediaItem::from_row) {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// All file paths already indexed for a given source location, used by the
/// indexer for its batch existence check.
pub fn list_known_paths(
    conn: &Connection,
    source_kind: SourceKind,
    source_id: Option<SourceId>,
) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT file_path FROM media_items
             WHERE source_kind = ?1 AND COALESCE(source_id, 0) = ?2",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map(
            rusqlite::params![source_kind.as_str(), source_id.map_or(0, |s| s.as_i64())],
            |row| row.get(0),
        )
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// List all movies, alphabetical.
pub fn list_movies(conn: &Connection) -> Result<Vec<MediaItem>> {
    let q = format!("SELECT {COLS} FROM media_items WHERE kind = 'movie' ORDER BY title");
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([], MediaItem::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Search the library by title.
///
/// Ranking: exact-prefix matches first, then by rating, then by year, all
/// descending.
pub fn search(
    conn: &Connection,
    query: &str,
    kind: Option<MediaKind>,
    limit: i64,
) -> Result<Vec<MediaItem>> {
    let contains = format!("%{}%", escape_like(query));
    let prefix = format!("{}%", escape_like(query));

    let kind_clause = match kind {
        Some(_) => "AND kind = ?4",
        None => "",
    };
    let q = format!(
        "SELECT {COLS} FROM media_items
         WHERE title LIKE ?1 ESCAPE '\\' {kind_clause}
         ORDER BY (title LIKE ?2 ESCAPE '\\') DESC,
                  rating DESC NULLS LAST,
                  year DESC NULLS LAST,
                  title ASC
         LIMIT ?3"
    );

    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = match kind {
        Some(kind) => stmt
            .query_map(
                rusqlite::params![contains, prefix, limit, kind.as_str()],
                MediaItem::from_row,
            )
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>(),
        None => stmt
            .query_map(
                rusqlite::params![contains, prefix, limit],
                MediaItem::from_row,
            )
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>(),
    }
    .map_err(db_err)?;
    Ok(rows)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Store probe results (duration, quality label) for an item.
pub fn update_probe_info(
    conn: &Connection,
    id: MediaItemId,
    duration_secs: Option<f64>,
    quality: Option<&str>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE media_items SET duration_secs = ?1, quality = ?2, updated_at = ?3
         WHERE id = ?4",
        rusqlite::params![duration_secs, quality, now, id.as_i64()],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Fields written by the metadata enricher.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub provider_id: Option<String>,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub rating: Option<f64>,
    pub genres: Option<String>,
    pub cast_list: Option<String>,
    pub year: Option<i32>,
}

/// Apply enrichment results onto an item. `None` fields are left untouched.
pub fn update_enrichment(conn: &Connection, id: MediaItemId, e: &Enrichment) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE media_items SET
             provider_id = COALESCE(?1, provider_id),
             overview = COALESCE(?2, overview),
             poster_url = COALESCE(?3, poster_url),
             backdrop_url = COALESCE(?4, backdrop_url),
             rating = COALESCE(?5, rating),
             genres = COALESCE(?6, genres),
             cast_list = COALESCE(?7, cast_list),
             year = COALESCE(?8, year),
             updated_at = ?9
         WHERE id = ?10",
        rusqlite::params![
            e.provider_id,
            e.overview,
            e.poster_url,
            e.backdrop_url,
            e.rating,
            e.genres,
            e.cast_list,
            e.year,
            now,
            id.as_i64(),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Delete a media item. Cascades to episodes, subtitles, and watch records.
///
/// Deleting a TV show container also deletes the media items of its episodes
/// (the FK cascade alone would only remove the episode rows, stranding their
/// media items).
pub fn delete_media_item(conn: &Connection, id: MediaItemId) -> Result<bool> {
    let episode_items: Vec<i64> = {
        let mut stmt = conn
            .prepare(
                "SELECT e.media_item_id FROM episodes e
                 JOIN tv_shows s ON s.id = e.tv_show_id
                 WHERE s.media_item_id = ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([id.as_i64()], |row| row.get(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows
    };

    for item in episode_items {
        conn.execute("DELETE FROM media_items WHERE id = ?1", [item])
            .map_err(db_err)?;
    }

    let n = conn
        .execute("DELETE FROM media_items WHERE id = ?1", [id.as_i64()])
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Library aggregate statistics.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub movie_count: i64,
    pub show_count: i64,
    pub episode_count: i64,
    pub total_bytes: i64,
}

pub fn library_stats(conn: &Connection) -> Result<LibraryStats> {
    conn.query_row(
        "SELECT
             SUM(CASE WHEN kind = 'movie' THEN 1 ELSE 0 END),
             SUM(CASE WHEN kind = 'tv_show' THEN 1 ELSE 0 END),
             SUM(CASE WHEN kind = 'episode' THEN 1 ELSE 0 END),
             COALESCE(SUM(file_size), 0)
         FROM media_items",
        [],
        |row| {
            Ok(LibraryStats {
                movie_count: row.get::<_, Option<i64>>(0)?.unwrap_or(0),
                show_count: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                episode_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                total_bytes: row.get(3)?,
            })
        },
    )
    .map_err(db_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    pub(crate) fn movie(title: &str, path: &str) -> NewMediaItem {
        NewMediaItem {
            kind: MediaKind::Movie,
            title: title.into(),
            year: Some(1999),
            file_path: path.into(),
            file_size: 1_048_576,
            source_kind: SourceKind::Local,
            source_id: None,
            quality: Some("1080p".into()),
        }
    }

    #[test]
    fn insert_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let m = insert_media_item(&conn, &movie("The Matrix", "/movies/matrix.mp4")).unwrap();
        assert_eq!(m.title, "The Matrix");

        let found = get_media_item(&conn, m.id).unwrap().unwrap();
        assert_eq!(found.file_path, "/movies/matrix.mp4");
    }

    #[test]
    fn duplicate_location_is_conflict() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        insert_media_item(&conn, &movie("A", "/same.mp4")).unwrap();
        let err = insert_media_item(&conn, &movie("B", "/same.mp4")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn known_paths_for_local() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        insert_media_item(&conn, &movie("A", "/a.mp4")).unwrap();
        insert_media_item(&conn, &movie("B", "/b.mp4")).unwrap();

        let paths = list_known_paths(&conn, SourceKind::Local, None).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&"/a.mp4".to_string()));
    }

    #[test]
    fn search_ranks_prefix_first() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut a = movie("The Matrix", "/1.mp4");
        a.quality = None;
        insert_media_item(&conn, &a).unwrap();
        insert_media_item(&conn, &movie("Matrix Reloaded", "/2.mp4")).unwrap();

        let results = search(&conn, "Matrix", None, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Matrix Reloaded");
    }

    #[test]
    fn search_kind_filter() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        insert_media_item(&conn, &movie("Solaris", "/s.mp4")).unwrap();

        let results = search(&conn, "Solaris", Some(MediaKind::Episode), 10).unwrap();
        assert!(results.is_empty());
        let results = search(&conn, "Solaris", Some(MediaKind::Movie), 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn enrichment_preserves_unset_fields() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let m = insert_media_item(&conn, &movie("Alien", "/alien.mp4")).unwrap();

        update_enrichment(
            &conn,
            m.id,
            &Enrichment {
                overview: Some("In space...".into()),
                rating: Some(8.5),
                ..Default::default()
            },
        )
        .unwrap();

        update_enrichment(
            &conn,
            m.id,
            &Enrichment {
                poster_url: Some("http://img/alien.jpg".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let found = get_media_item(&conn, m.id).unwrap().unwrap();
        assert_eq!(found.overview.as_deref(), Some("In space..."));
        assert_eq!(found.poster_url.as_deref(), Some("http://img/alien.jpg"));
        assert_eq!(found.rating, Some(8.5));
    }

    #[test]
    fn stats() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        insert_media_item(&conn, &movie("A", "/a.mp4")).unwrap();
        insert_media_item(&conn, &movie("B", "/b.mp4")).unwrap();

        let stats = library_stats(&conn).unwrap();
        assert_eq!(stats.movie_count, 2);
        assert_eq!(stats.total_bytes, 2 * 1_048_576);
    }
}
