//! Subtitle sidecar operations.

use rusqlite::Connection;
use streambox_core::{MediaItemId, Result, SubtitleFormat, SubtitleId};

use super::db_err;
use crate::models::Subtitle;

const COLS: &str = "id, media_item_id, language, label, file_path, format, is_default";

/// Attach a subtitle file to a media item.
///
/// The first subtitle per item becomes the default unless `is_default` is
/// explicitly set on a later one.
pub fn insert_subtitle(
    conn: &Connection,
    media_item_id: MediaItemId,
    language: &str,
    label: &str,
    file_path: &str,
    format: SubtitleFormat,
    is_default: bool,
) -> Result<Subtitle> {
    let existing: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM subtitles WHERE media_item_id = ?1",
            [media_item_id.as_i64()],
            |row| row.get(0),
        )
        .map_err(db_err)?;

    let default_flag = is_default || existing == 0;
    if is_default && existing > 0 {
        conn.execute(
            "UPDATE subtitles SET is_default = 0 WHERE media_item_id = ?1",
            [media_item_id.as_i64()],
        )
        .map_err(db_err)?;
    }

    conn.execute(
        "INSERT INTO subtitles (media_item_id, language, label, file_path, format, is_default)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            media_item_id.as_i64(),
            language,
            label,
            file_path,
            format.as_str(),
            default_flag as i32,
        ],
    )
    .map_err(db_err)?;

    let id = SubtitleId::new(conn.last_insert_rowid());
    get_subtitle(conn, id).map(|opt| opt.expect("just inserted"))
}

/// Get a subtitle by primary key.
pub fn get_subtitle(conn: &Connection, id: SubtitleId) -> Result<Option<Subtitle>> {
    let q = format!("SELECT {COLS} FROM subtitles WHERE id = ?1");
    match conn.query_row(&q, [id.as_i64()], Subtitle::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// List subtitles for a media item, defaults first.
pub fn list_for_media(conn: &Connection, media_item_id: MediaItemId) -> Result<Vec<Subtitle>> {
    let q = format!(
        "SELECT {COLS} FROM subtitles WHERE media_item_id = ?1
         ORDER BY is_default DESC, language"
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([media_item_id.as_i64()], Subtitle::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use streambox_core::{MediaKind, SourceKind};

    fn seed_item(conn: &Connection) -> MediaItemId {
        super::super::media::insert_media_item(
            conn,
            &super::super::media::NewMediaItem {
                kind: MediaKind::Movie,
                title: "T".into(),
                year: None,
                file_path: "/m.mp4".into(),
                file_size: 1,
                source_kind: SourceKind::Local,
                source_id: None,
                quality: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn first_subtitle_is_default() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let item = seed_item(&conn);

        let en =
            insert_subtitle(&conn, item, "en", "English", "/m.en.srt", SubtitleFormat::Srt, false)
                .unwrap();
        assert!(en.is_default);

        let fr =
            insert_subtitle(&conn, item, "fr", "French", "/m.fr.srt", SubtitleFormat::Srt, false)
                .unwrap();
        assert!(!fr.is_default);
    }

    #[test]
    fn explicit_default_takes_over() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let item = seed_item(&conn);

        insert_subtitle(&conn, item, "en", "English", "/m.en.srt", SubtitleFormat::Srt, false)
            .unwrap();
        let de =
            insert_subtitle(&conn, item, "de", "German", "/m.de.ass", SubtitleFormat::Ass, true)
                .unwrap();
        assert!(de.is_default);

        let subs = list_for_media(&conn, item).unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].language, "de");
        assert_eq!(subs.iter().filter(|s| s.is_default).count(), 1);
    }

    #[test]
    fn cascade_delete_with_media_item() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let item = seed_item(&conn);
        insert_subtitle(&conn, item, "en", "English", "/m.en.srt", SubtitleFormat::Srt, false)
            .unwrap();

        super::super::media::delete_media_item(&conn, item).unwrap();
        assert!(list_for_media(&conn, item).unwrap().is_empty());
    }
}
