//! Subtitle route handlers: listing per media item and serving files.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use streambox_core::{Error, MediaItemId, SubtitleId};
use streambox_db::queries;

use super::context::AppContext;
use super::error::AppError;

/// GET /api/subtitles/media/:id — subtitles attached to a media item.
pub async fn list_for_media(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let subtitles = queries::subtitles::list_for_media(&conn, MediaItemId::new(id))?;
    Ok(Json(json!({ "count": subtitles.len(), "subtitles": subtitles })))
}

/// GET /api/subtitles/:id — serve the subtitle file with its format's MIME.
pub async fn serve_subtitle(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subtitle_id = SubtitleId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let subtitle = queries::subtitles::get_subtitle(&conn, subtitle_id)?
        .ok_or_else(|| Error::not_found("subtitle", subtitle_id))?;
    drop(conn);

    let path = std::path::Path::new("/").join(subtitle.file_path.trim_start_matches('/'));
    let content = tokio::fs::read(&path)
        .await
        .map_err(|_| Error::not_found("subtitle file", &subtitle.file_path))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, subtitle.format.mime())],
        content,
    ))
}
