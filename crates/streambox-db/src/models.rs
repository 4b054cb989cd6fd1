//! Row models for every table, each with a `from_row` constructor.
//!
//! Column order in `from_row` matches the `COLS` constant of the owning
//! query module; the two must change together.

use rusqlite::Row;
use serde::Serialize;

use streambox_core::{
    EpisodeId, MediaItemId, MediaKind, SourceId, SourceKind, SubtitleFormat, SubtitleId, TvShowId,
    UserId,
};

/// Parse a TEXT column into an enum via `FromStr`, surfacing bad values as a
/// conversion failure instead of a panic.
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl User {
    /// Columns: id, username, password_hash, is_admin, created_at
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: UserId::new(row.get(0)?),
            username: row.get(1)?,
            password_hash: row.get(2)?,
            is_admin: row.get::<_, i64>(3)? != 0,
            created_at: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub protocol: SourceKind,
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Encrypted credential blob; never serialized to clients.
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    pub base_path: Option<String>,
    pub domain: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

impl Source {
    /// Columns: id, name, protocol, host, port, username, credential,
    /// base_path, domain, enabled, created_at
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: SourceId::new(row.get(0)?),
            name: row.get(1)?,
            protocol: parse_col(row, 2)?,
            host: row.get(3)?,
            port: row.get::<_, Option<i64>>(4)?.map(|p| p as u16),
            username: row.get(5)?,
            credential: row.get(6)?,
            base_path: row.get(7)?,
            domain: row.get(8)?,
            enabled: row.get::<_, i64>(9)? != 0,
            created_at: row.get(10)?,
        })
    }
}

// ---------------------------------------------------------------------------
// MediaItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: MediaItemId,
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    pub duration_secs: Option<f64>,
    pub file_path: String,
    pub file_size: i64,
    pub source_kind: SourceKind,
    pub source_id: Option<SourceId>,
    pub provider_id: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub overview: Option<String>,
    pub rating: Option<f64>,
    pub genres: Option<String>,
    pub cast_list: Option<String>,
    pub quality: Option<String>,
    pub added_at: String,
    pub updated_at: String,
}

impl MediaItem {
    /// Columns: id, kind, title, year, duration_secs, file_path, file_size,
    /// source_kind, source_id, provider_id, poster_url, backdrop_url,
    /// overview, rating, genres, cast_list, quality, added_at, updated_at
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: MediaItemId::new(row.get(0)?),
            kind: parse_col(row, 1)?,
            title: row.get(2)?,
            year: row.get(3)?,
            duration_secs: row.get(4)?,
            file_path: row.get(5)?,
            file_size: row.get(6)?,
            source_kind: parse_col(row, 7)?,
            source_id: row.get::<_, Option<i64>>(8)?.map(SourceId::new),
            provider_id: row.get(9)?,
            poster_url: row.get(10)?,
            backdrop_url: row.get(11)?,
            overview: row.get(12)?,
            rating: row.get(13)?,
            genres: row.get(14)?,
            cast_list: row.get(15)?,
            quality: row.get(16)?,
            added_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

// ---------------------------------------------------------------------------
// TvShow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TvShow {
    pub id: TvShowId,
    pub media_item_id: MediaItemId,
    pub provider_id: Option<String>,
    pub title: String,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub season_count: i32,
    pub episode_count: i32,
    pub status: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub genres: Option<String>,
}

impl TvShow {
    /// Columns: id, media_item_id, provider_id, title, overview,
    /// first_air_date, season_count, episode_count, status, poster_url,
    /// backdrop_url, genres
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: TvShowId::new(row.get(0)?),
            media_item_id: MediaItemId::new(row.get(1)?),
            provider_id: row.get(2)?,
            title: row.get(3)?,
            overview: row.get(4)?,
            first_air_date: row.get(5)?,
            season_count: row.get(6)?,
            episode_count: row.get(7)?,
            status: row.get(8)?,
            poster_url: row.get(9)?,
            backdrop_url: row.get(10)?,
            genres: row.get(11)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: EpisodeId,
    pub tv_show_id: TvShowId,
    pub season_number: i32,
    pub episode_number: i32,
    pub media_item_id: MediaItemId,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub still_url: Option<String>,
}

impl Episode {
    /// Columns: id, tv_show_id, season_number, episode_number, media_item_id,
    /// title, overview, air_date, still_url
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EpisodeId::new(row.get(0)?),
            tv_show_id: TvShowId::new(row.get(1)?),
            season_number: row.get(2)?,
            episode_number: row.get(3)?,
            media_item_id: MediaItemId::new(row.get(4)?),
            title: row.get(5)?,
            overview: row.get(6)?,
            air_date: row.get(7)?,
            still_url: row.get(8)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Subtitle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtitle {
    pub id: SubtitleId,
    pub media_item_id: MediaItemId,
    pub language: String,
    pub label: String,
    pub file_path: String,
    pub format: SubtitleFormat,
    pub is_default: bool,
}

impl Subtitle {
    /// Columns: id, media_item_id, language, label, file_path, format,
    /// is_default
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: SubtitleId::new(row.get(0)?),
            media_item_id: MediaItemId::new(row.get(1)?),
            language: row.get(2)?,
            label: row.get(3)?,
            file_path: row.get(4)?,
            format: parse_col(row, 5)?,
            is_default: row.get::<_, i64>(6)? != 0,
        })
    }
}

// ---------------------------------------------------------------------------
// WatchRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRecord {
    pub user_id: UserId,
    pub media_item_id: MediaItemId,
    pub position_secs: f64,
    pub duration_secs: f64,
    /// Fraction in [0, 1].
    pub progress: f64,
    pub completed: bool,
    pub watch_count: i32,
    pub last_watched_at: String,
    pub created_at: String,
}

impl WatchRecord {
    /// Columns: user_id, media_item_id, position_secs, duration_secs,
    /// progress, completed, watch_count, last_watched_at, created_at
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: UserId::new(row.get(0)?),
            media_item_id: MediaItemId::new(row.get(1)?),
            position_secs: row.get(2)?,
            duration_secs: row.get(3)?,
            progress: row.get(4)?,
            completed: row.get::<_, i64>(5)? != 0,
            watch_count: row.get(6)?,
            last_watched_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
