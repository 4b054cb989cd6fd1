//! TV show and episode operations.

use rusqlite::Connection;
use streambox_core::{EpisodeId, Error, MediaItemId, MediaKind, Result, SourceId, SourceKind, TvShowId};

use super::db_err;
use super::media::{insert_media_item, NewMediaItem};
use crate::models::{Episode, TvShow};

const SHOW_COLS: &str = "id, media_item_id, provider_id, title, overview, first_air_date, \
                         season_count, episode_count, status, poster_url, backdrop_url, genres";

const EP_COLS: &str = "id, tv_show_id, season_number, episode_number, media_item_id, \
                       title, overview, air_date, still_url";

/// Find a show by title, or create it (with its container media item).
///
/// The container media item's file path is the show directory, so partial
/// scans can re-find the show by name before any episodes land.
pub fn find_or_create_show(
    conn: &Connection,
    title: &str,
    dir_path: &str,
    source_kind: SourceKind,
    source_id: Option<SourceId>,
) -> Result<TvShow> {
    if let Some(show) = get_show_by_title(conn, title)? {
        return Ok(show);
    }

    let item = insert_media_item(
        conn,
        &NewMediaItem {
            kind: MediaKind::TvShow,
            title: title.to_string(),
            year: None,
            file_path: dir_path.to_string(),
            file_size: 0,
            source_kind,
            source_id,
            quality: None,
        },
    )?;

    conn.execute(
        "INSERT INTO tv_shows (media_item_id, title) VALUES (?1, ?2)",
        rusqlite::params![item.id.as_i64(), title],
    )
    .map_err(db_err)?;

    let id = TvShowId::new(conn.last_insert_rowid());
    get_show(conn, id).map(|opt| opt.expect("just inserted"))
}

/// Get a show by primary key.
pub fn get_show(conn: &Connection, id: TvShowId) -> Result<Option<TvShow>> {
    let q = format!("SELECT {SHOW_COLS} FROM tv_shows WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], TvShow::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Get a show by its exact title.
pub fn get_show_by_title(conn: &Connection, title: &str) -> Result<Option<TvShow>> {
    let q = format!("SELECT {SHOW_COLS} FROM tv_shows WHERE title = ?1");
    match conn.query_row(&q, [title], TvShow::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Get the show owning the given container media item.
pub fn get_show_by_media_item(conn: &Connection, item: MediaItemId) -> Result<Option<TvShow>> {
    let q = format!("SELECT {SHOW_COLS} FROM tv_shows WHERE media_item_id = ?1");
    match conn.query_row(&q, [item.as_i64()], TvShow::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// List all shows, alphabetical.
pub fn list_shows(conn: &Connection) -> Result<Vec<TvShow>> {
    let q = format!("SELECT {SHOW_COLS} FROM tv_shows ORDER BY title");
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([], TvShow::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Fields written by the metadata enricher onto a show.
#[derive(Debug, Clone, Default)]
pub struct ShowEnrichment {
    pub provider_id: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub status: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub genres: Option<String>,
}

/// Apply enrichment results onto a show. `None` fields are left untouched.
pub fn update_show_enrichment(conn: &Connection, id: TvShowId, e: &ShowEnrichment) -> Result<()> {
    conn.execute(
        "UPDATE tv_shows SET
             provider_id = COALESCE(?1, provider_id),
             overview = COALESCE(?2, overview),
             first_air_date = COALESCE(?3, first_air_date),
             status = COALESCE(?4, status),
             poster_url = COALESCE(?5, poster_url),
             backdrop_url = COALESCE(?6, backdrop_url),
             genres = COALESCE(?7, genres)
         WHERE id = ?8",
        rusqlite::params![
            e.provider_id,
            e.overview,
            e.first_air_date,
            e.status,
            e.poster_url,
            e.backdrop_url,
            e.genres,
            id.as_i64(),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Recompute season/episode counts from the episodes table.
pub fn refresh_counts(conn: &Connection, id: TvShowId) -> Result<()> {
    conn.execute(
        "UPDATE tv_shows SET
             season_count = (SELECT COUNT(DISTINCT season_number)
                             FROM episodes WHERE tv_show_id = ?1),
             episode_count = (SELECT COUNT(*)
                              FROM episodes WHERE tv_show_id = ?1)
         WHERE id = ?1",
        [id.as_i64()],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Insert an episode. A `(show, season, episode)` collision maps to
/// `Conflict` so the indexer can treat it as "already indexed".
pub fn insert_episode(
    conn: &Connection,
    show_id: TvShowId,
    season: i32,
    episode: i32,
    media_item_id: MediaItemId,
    title: Option<&str>,
) -> Result<Episode> {
    conn.execute(
        "INSERT INTO episodes (tv_show_id, season_number, episode_number,
                               media_item_id, title)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![show_id.as_i64(), season, episode, media_item_id.as_i64(), title],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::Conflict(format!(
                "episode S{season:02}E{episode:02} already exists for show {show_id}"
            ))
        } else {
            db_err(e)
        }
    })?;

    let id = EpisodeId::new(conn.last_insert_rowid());
    refresh_counts(conn, show_id)?;
    get_episode(conn, id).map(|opt| opt.expect("just inserted"))
}

/// Get an episode by primary key.
pub fn get_episode(conn: &Connection, id: EpisodeId) -> Result<Option<Episode>> {
    let q = format!("SELECT {EP_COLS} FROM episodes WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], Episode::from_row) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Get the episode owning the given media item.
pub fn get_episode_by_media_item(conn: &Connection, item: MediaItemId) -> Result<Option<Episode>> {
    let q = format!("SELECT {EP_COLS} FROM episodes WHERE media_item_id = ?1");
    match conn.query_row(&q, [item.as_i64()], Episode::from_row) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// List a show's episodes in playback order.
pub fn list_episodes_for_show(conn: &Connection, show_id: TvShowId) -> Result<Vec<Episode>> {
    let q = format!(
        "SELECT {EP_COLS} FROM episodes WHERE tv_show_id = ?1
         ORDER BY season_number, episode_number"
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([show_id.as_i64()], Episode::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// The episode after the given one, crossing season boundaries
/// (next-in-season, else first-of-next-season).
pub fn next_episode(conn: &Connection, id: EpisodeId) -> Result<Option<Episode>> {
    let current = get_episode(conn, id)?.ok_or_else(|| Error::not_found("episode", id))?;

    let q = format!(
        "SELECT {EP_COLS} FROM episodes
         WHERE tv_show_id = ?1
           AND (season_number > ?2
                OR (season_number = ?2 AND episode_number > ?3))
         ORDER BY season_number, episode_number
         LIMIT 1"
    );
    match conn.query_row(
        &q,
        rusqlite::params![
            current.tv_show_id.as_i64(),
            current.season_number,
            current.episode_number
        ],
        Episode::from_row,
    ) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// The episode before the given one, crossing season boundaries.
pub fn previous_episode(conn: &Connection, id: EpisodeId) -> Result<Option<Episode>> {
    let current = get_episode(conn, id)?.ok_or_else(|| Error::not_found("episode", id))?;

    let q = format!(
        "SELECT {EP_COLS} FROM episodes
         WHERE tv_show_id = ?1
           AND (season_number < ?2
                OR (season_number = ?2 AND episode_number < ?3))
         ORDER BY season_number DESC, episode_number DESC
         LIMIT 1"
    );
    match conn.query_row(
        &q,
        rusqlite::params![
            current.tv_show_id.as_i64(),
            current.season_number,
            current.episode_number
        ],
        Episode::from_row,
    ) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}
