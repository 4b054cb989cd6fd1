//! Watch-history operations: the per-(user, item) progress state machine.
//!
//! Invariants maintained here:
//! - `progress = position / duration` clamped to [0, 1] when duration > 0
//! - `completed ⇔ progress ≥ 0.95`
//! - at most one row per (user, item); re-watches bump `watch_count`

use chrono::Utc;
use rusqlite::Connection;
use streambox_core::{MediaItemId, Result, UserId};

use super::db_err;
use crate::models::{MediaItem, WatchRecord};

/// Progress at or beyond which an item counts as fully watched.
pub const COMPLETION_THRESHOLD: f64 = 0.95;

const COLS: &str = "user_id, media_item_id, position_secs, duration_secs, progress, \
                    completed, watch_count, last_watched_at, created_at";

/// Qualified form for the joined projections; `duration_secs` and friends
/// collide with media_items columns otherwise.
const W_COLS: &str = "w.user_id, w.media_item_id, w.position_secs, w.duration_secs, \
                      w.progress, w.completed, w.watch_count, w.last_watched_at, w.created_at";

const ITEM_COLS: &str = "m.id, m.kind, m.title, m.year, m.duration_secs, m.file_path, \
                         m.file_size, m.source_kind, m.source_id, m.provider_id, \
                         m.poster_url, m.backdrop_url, m.overview, m.rating, m.genres, \
                         m.cast_list, m.quality, m.added_at, m.updated_at";

fn derive_progress(position_secs: f64, duration_secs: f64) -> (f64, bool) {
    let progress = if duration_secs > 0.0 {
        (position_secs / duration_secs).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (progress, progress >= COMPLETION_THRESHOLD)
}

/// Upsert playback progress for a (user, item) pair.
///
/// `watch_count` bumps only when a completed record restarts from a
/// non-completed position; ordinary mid-stream updates never touch it.
pub fn update_progress(
    conn: &Connection,
    user_id: UserId,
    media_item_id: MediaItemId,
    position_secs: f64,
    duration_secs: f64,
) -> Result<WatchRecord> {
    let (progress, completed) = derive_progress(position_secs, duration_secs);
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO watch_history (user_id, media_item_id, position_secs, duration_secs,
                                    progress, completed, watch_count, last_watched_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
         ON CONFLICT(user_id, media_item_id) DO UPDATE SET
            position_secs = excluded.position_secs,
            duration_secs = excluded.duration_secs,
            progress = excluded.progress,
            completed = excluded.completed,
            watch_count = watch_count +
                (CASE WHEN watch_history.completed = 1 AND excluded.completed = 0
                      THEN 1 ELSE 0 END),
            last_watched_at = excluded.last_watched_at",
        rusqlite::params![
            user_id.as_i64(),
            media_item_id.as_i64(),
            position_secs,
            duration_secs,
            progress,
            completed as i32,
            now,
        ],
    )
    .map_err(db_err)?;

    get_record(conn, user_id, media_item_id).map(|opt| opt.expect("just upserted"))
}

/// Mark an item fully watched: `position = duration`, `progress = 1`.
///
/// Marking an already-completed record watched again counts as a re-watch.
pub fn mark_watched(
    conn: &Connection,
    user_id: UserId,
    media_item_id: MediaItemId,
    duration_secs: f64,
) -> Result<WatchRecord> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO watch_history (user_id, media_item_id, position_secs, duration_secs,
                                    progress, completed, watch_count, last_watched_at, created_at)
         VALUES (?1, ?2, ?3, ?3, 1.0, 1, 1, ?4, ?4)
         ON CONFLICT(user_id, media_item_id) DO UPDATE SET
            position_secs = excluded.position_secs,
            duration_secs = excluded.duration_secs,
            progress = 1.0,
            completed = 1,
            watch_count = watch_count +
                (CASE WHEN watch_history.completed = 1 THEN 1 ELSE 0 END),
            last_watched_at = excluded.last_watched_at",
        rusqlite::params![user_id.as_i64(), media_item_id.as_i64(), duration_secs, now],
    )
    .map_err(db_err)?;

    get_record(conn, user_id, media_item_id).map(|opt| opt.expect("just upserted"))
}

/// Get the watch record for a (user, item) pair.
pub fn get_record(
    conn: &Connection,
    user_id: UserId,
    media_item_id: MediaItemId,
) -> Result<Option<WatchRecord>> {
    let q = format!("SELECT {COLS} FROM watch_history WHERE user_id = ?1 AND media_item_id = ?2");
    match conn.query_row(
        &q,
        rusqlite::params![user_id.as_i64(), media_item_id.as_i64()],
        WatchRecord::from_row,
    ) {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Remove the watch record entirely. Returns true if a row was deleted.
pub fn mark_unwatched(
    conn: &Connection,
    user_id: UserId,
    media_item_id: MediaItemId,
) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM watch_history WHERE user_id = ?1 AND media_item_id = ?2",
            rusqlite::params![user_id.as_i64(), media_item_id.as_i64()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Zero out progress but keep the row (and its watch count).
pub fn reset_progress(
    conn: &Connection,
    user_id: UserId,
    media_item_id: MediaItemId,
) -> Result<Option<WatchRecord>> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE watch_history
             SET position_secs = 0, progress = 0, completed = 0, last_watched_at = ?1
             WHERE user_id = ?2 AND media_item_id = ?3",
            rusqlite::params![now, user_id.as_i64(), media_item_id.as_i64()],
        )
        .map_err(db_err)?;
    if n == 0 {
        return Ok(None);
    }
    get_record(conn, user_id, media_item_id)
}

fn list_with_items(
    conn: &Connection,
    user_id: UserId,
    extra_where: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<(WatchRecord, MediaItem)>> {
    let q = format!(
        "SELECT {W_COLS}, {ITEM_COLS}
         FROM watch_history w
         JOIN media_items m ON m.id = w.media_item_id
         WHERE w.user_id = ?1 {extra_where}
         ORDER BY w.last_watched_at DESC
         LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map(
            rusqlite::params![user_id.as_i64(), limit, offset],
            |row| {
                let record = WatchRecord::from_row(row)?;
                // Item columns start after the 9 watch columns; rebuild a
                // shifted view by index.
                let item = MediaItem {
                    id: streambox_core::MediaItemId::new(row.get(9)?),
                    kind: row.get::<_, String>(10)?.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            10,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    title: row.get(11)?,
                    year: row.get(12)?,
                    duration_secs: row.get(13)?,
                    file_path: row.get(14)?,
                    file_size: row.get(15)?,
                    source_kind: row.get::<_, String>(16)?.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            16,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    source_id: row
                        .get::<_, Option<i64>>(17)?
                        .map(streambox_core::SourceId::new),
                    provider_id: row.get(18)?,
                    poster_url: row.get(19)?,
                    backdrop_url: row.get(20)?,
                    overview: row.get(21)?,
                    rating: row.get(22)?,
                    genres: row.get(23)?,
                    cast_list: row.get(24)?,
                    quality: row.get(25)?,
                    added_at: row.get(26)?,
                    updated_at: row.get(27)?,
                };
                Ok((record, item))
            },
        )
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// In-progress, non-completed rows, most recent first ("Continue Watching").
pub fn continue_watching(
    conn: &Connection,
    user_id: UserId,
    limit: i64,
) -> Result<Vec<(WatchRecord, MediaItem)>> {
    list_with_items(
        conn,
        user_id,
        "AND w.completed = 0 AND w.progress > 0",
        limit,
        0,
    )
}

/// Most recently watched rows regardless of completion.
pub fn recently_watched(
    conn: &Connection,
    user_id: UserId,
    limit: i64,
) -> Result<Vec<(WatchRecord, MediaItem)>> {
    list_with_items(conn, user_id, "", limit, 0)
}

/// Full watch history, paged.
pub fn history(
    conn: &Connection,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> Result<Vec<(WatchRecord, MediaItem)>> {
    list_with_items(conn, user_id, "", limit, offset)
}

/// Aggregate watch statistics for a user.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStats {
    pub total_items: i64,
    pub completed_items: i64,
    pub in_progress_items: i64,
    pub total_watched_secs: f64,
}

pub fn stats(conn: &Connection, user_id: UserId) -> Result<WatchStats> {
    conn.query_row(
        "SELECT
             COUNT(*),
             SUM(CASE WHEN completed = 1 THEN 1 ELSE 0 END),
             SUM(CASE WHEN completed = 0 AND progress > 0 THEN 1 ELSE 0 END),
             COALESCE(SUM(position_secs + (watch_count - 1) * duration_secs), 0)
         FROM watch_history WHERE user_id = ?1",
        [user_id.as_i64()],
        |row| {
            Ok(WatchStats {
                total_items: row.get(0)?,
                completed_items: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                in_progress_items: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                total_watched_secs: row.get(3)?,
            })
        },
    )
    .map_err(db_err)
}
