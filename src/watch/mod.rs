//! Watch-progress tracking service.
//!
//! A thin service over the `watch_history` queries. Writes for one
//! (user, item) pair are serialized by SQLite's single-writer transaction,
//! so concurrent updates from the same session cannot regress progress
//! interleaved at the row level.

use streambox_core::{Error, MediaItemId, Result, UserId};
use streambox_db::models::{MediaItem, WatchRecord};
use streambox_db::pool::DbPool;
use streambox_db::queries;

pub struct WatchTracker {
    db: DbPool,
}

impl WatchTracker {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Upsert progress from a playback heartbeat.
    pub fn update(
        &self,
        user_id: UserId,
        media_id: MediaItemId,
        current_secs: f64,
        duration_secs: f64,
    ) -> Result<WatchRecord> {
        if current_secs < 0.0 || duration_secs < 0.0 {
            return Err(Error::Validation("playback times must be non-negative".into()));
        }
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::update_progress(&conn, user_id, media_id, current_secs, duration_secs)
    }

    /// Mark fully watched, using the item's stored duration when known.
    pub fn mark_watched(&self, user_id: UserId, media_id: MediaItemId) -> Result<WatchRecord> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        let item = queries::media::get_media_item(&conn, media_id)?
            .ok_or_else(|| Error::not_found("media item", media_id))?;
        let duration = item.duration_secs.unwrap_or(0.0);
        queries::watch::mark_watched(&conn, user_id, media_id, duration)
    }

    pub fn mark_unwatched(&self, user_id: UserId, media_id: MediaItemId) -> Result<bool> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::mark_unwatched(&conn, user_id, media_id)
    }

    pub fn reset(&self, user_id: UserId, media_id: MediaItemId) -> Result<Option<WatchRecord>> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::reset_progress(&conn, user_id, media_id)
    }

    pub fn get(&self, user_id: UserId, media_id: MediaItemId) -> Result<Option<WatchRecord>> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::get_record(&conn, user_id, media_id)
    }

    pub fn continue_watching(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<(WatchRecord, MediaItem)>> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::continue_watching(&conn, user_id, limit)
    }

    pub fn recently_watched(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<(WatchRecord, MediaItem)>> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::recently_watched(&conn, user_id, limit)
    }

    pub fn history(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<(WatchRecord, MediaItem)>> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::history(&conn, user_id, limit, offset)
    }

    pub fn stats(&self, user_id: UserId) -> Result<queries::watch::WatchStats> {
        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::watch::stats(&conn, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streambox_core::{MediaKind, SourceKind};
    use streambox_db::pool::init_memory_pool;

    fn tracker_with_item() -> (WatchTracker, UserId, MediaItemId) {
        let db = init_memory_pool().unwrap();
        let conn = db.get().unwrap();
        let user = queries::users::create_user(&conn, "u", "h", false).unwrap();
        let item = queries::media::insert_media_item(
            &conn,
            &queries::media::NewMediaItem {
                kind: MediaKind::Movie,
                title: "T".into(),
                year: None,
                file_path: "/t.mp4".into(),
                file_size: 1,
                source_kind: SourceKind::Local,
                source_id: None,
                quality: None,
            },
        )
        .unwrap();
        queries::media::update_probe_info(&conn, item.id, Some(3600.0), None).unwrap();
        drop(conn);
        (WatchTracker::new(db), user.id, item.id)
    }

    #[test]
    fn update_then_get_roundtrip() {
        let (tracker, uid, mid) = tracker_with_item();
        let written = tracker.update(uid, mid, 1200.0, 3600.0).unwrap();
        let read = tracker.get(uid, mid).unwrap().unwrap();
        assert_eq!(written.position_secs, read.position_secs);
        assert!((read.progress - 1.0 / 3.0).abs() < 1e-9);
        assert!(!read.completed);
    }

    #[test]
    fn negative_times_are_invalid() {
        let (tracker, uid, mid) = tracker_with_item();
        assert!(tracker.update(uid, mid, -1.0, 100.0).is_err());
        assert!(tracker.update(uid, mid, 1.0, -100.0).is_err());
    }

    #[test]
    fn mark_watched_uses_item_duration() {
        let (tracker, uid, mid) = tracker_with_item();
        let record = tracker.mark_watched(uid, mid).unwrap();
        assert_eq!(record.duration_secs, 3600.0);
        assert_eq!(record.progress, 1.0);
        assert!(record.completed);
    }

    #[test]
    fn mark_watched_unknown_item_is_not_found() {
        let (tracker, uid, _) = tracker_with_item();
        let err = tracker.mark_watched(uid, MediaItemId::new(999)).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn unwatch_then_get_is_none() {
        let (tracker, uid, mid) = tracker_with_item();
        tracker.mark_watched(uid, mid).unwrap();
        assert!(tracker.mark_unwatched(uid, mid).unwrap());
        assert!(tracker.get(uid, mid).unwrap().is_none());
    }
}
