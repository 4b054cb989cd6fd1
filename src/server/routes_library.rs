//! Library route handlers: browsing, search, and scans.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use streambox_core::{EpisodeId, Error, MediaItemId, MediaKind, TvShowId};
use streambox_db::models::Episode;
use streambox_db::queries;

use super::context::AppContext;
use super::error::AppError;
use crate::indexer::ScanTarget;
use crate::sources::local::LocalClient;

/// GET /api/library/movies
pub async fn list_movies(State(ctx): State<AppContext>) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let movies = queries::media::list_movies(&conn)?;
    Ok(Json(json!({ "count": movies.len(), "movies": movies })))
}

/// GET /api/library/tvshows
pub async fn list_tvshows(State(ctx): State<AppContext>) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let shows = queries::tv::list_shows(&conn)?;
    Ok(Json(json!({ "count": shows.len(), "tvShows": shows })))
}

/// GET /api/library/tvshow/:id — show detail with episodes grouped by season.
pub async fn get_tvshow(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let show_id = TvShowId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let show = queries::tv::get_show(&conn, show_id)?
        .ok_or_else(|| Error::not_found("tv show", show_id))?;
    let episodes = queries::tv::list_episodes_for_show(&conn, show_id)?;

    // Group into seasons; episodes arrive in (season, episode) order.
    let mut seasons: Vec<serde_json::Value> = Vec::new();
    let mut current: Option<(i32, Vec<Episode>)> = None;
    for episode in episodes {
        match current.as_mut() {
            Some((season, list)) if *season == episode.season_number => list.push(episode),
            _ => {
                if let Some((season, list)) = current.take() {
                    seasons.push(json!({ "seasonNumber": season, "episodes": list }));
                }
                current = Some((episode.season_number, vec![episode]));
            }
        }
    }
    if let Some((season, list)) = current {
        seasons.push(json!({ "seasonNumber": season, "episodes": list }));
    }

    Ok(Json(json!({ "show": show, "seasons": seasons })))
}

/// GET /api/library/episode/:id/next
pub async fn next_episode(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let episode = queries::tv::next_episode(&conn, EpisodeId::new(id))?
        .ok_or_else(|| Error::not_found("next episode after", id))?;
    Ok(Json(episode))
}

/// GET /api/library/episode/:id/previous
pub async fn previous_episode(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let episode = queries::tv::previous_episode(&conn, EpisodeId::new(id))?
        .ok_or_else(|| Error::not_found("previous episode before", id))?;
    Ok(Json(episode))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/library/search?q=&type=&limit=
pub async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    if params.q.trim().is_empty() {
        return Err(Error::Validation("query must not be empty".into()).into());
    }
    let kind = match params.kind.as_deref() {
        None | Some("") | Some("all") => None,
        Some("tvshow") => Some(MediaKind::TvShow),
        Some(other) => Some(other.parse::<MediaKind>()?),
    };
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let results = queries::media::search(&conn, params.q.trim(), kind, limit)?;
    Ok(Json(json!({ "results": results })))
}

/// GET /api/library/item/:id
pub async fn get_item(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let item_id = MediaItemId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let item = queries::media::get_media_item(&conn, item_id)?
        .ok_or_else(|| Error::not_found("media item", item_id))?;

    // Attach the episode/show context when this item is part of a series.
    let episode = queries::tv::get_episode_by_media_item(&conn, item_id)?;
    let show = queries::tv::get_show_by_media_item(&conn, item_id)?;
    let subtitles = queries::subtitles::list_for_media(&conn, item_id)?;

    Ok(Json(json!({
        "item": item,
        "episode": episode,
        "show": show,
        "subtitles": subtitles,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub path: String,
}

/// POST /api/library/scan — start a local directory scan.
///
/// Returns 409 when a scan is already running.
pub async fn start_scan(
    State(ctx): State<AppContext>,
    Json(payload): Json<ScanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let path = payload.path.trim();
    if path.is_empty() {
        return Err(Error::Validation("path must not be empty".into()).into());
    }

    // Anchor the client at the filesystem root so stored paths stay
    // absolute and stable across scans of different directories.
    let target = ScanTarget {
        client: std::sync::Arc::new(LocalClient::new("/")),
        source_kind: streambox_core::SourceKind::Local,
        source_id: None,
        root: path.trim_start_matches('/').to_string(),
    };

    ctx.indexer.try_start(target)?;
    tracing::info!(path, "Scan started");

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": format!("scan of '{path}' started"),
            "progress": ctx.indexer.progress(),
        })),
    ))
}

/// GET /api/library/scan/progress
pub async fn scan_progress(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.indexer.progress())
}
