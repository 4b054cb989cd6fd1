//! Watch-progress route handlers.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use streambox_core::{Error, MediaItemId};

use super::auth::AuthUser;
use super::context::AppContext;
use super::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub media_item_id: i64,
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn rows_to_json(
    rows: Vec<(streambox_db::models::WatchRecord, streambox_db::models::MediaItem)>,
) -> Vec<serde_json::Value> {
    rows.into_iter()
        .map(|(record, item)| json!({ "record": record, "item": item }))
        .collect()
}

/// POST /api/metadata/watch/progress
pub async fn update_progress(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = ctx.watch.update(
        user.id,
        MediaItemId::new(payload.media_item_id),
        payload.current_time,
        payload.duration,
    )?;
    Ok(Json(record))
}

/// GET /api/watch/progress/:id
pub async fn get_progress(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let record = ctx
        .watch
        .get(user.id, MediaItemId::new(id))?
        .ok_or_else(|| Error::not_found("watch record", id))?;
    Ok(Json(record))
}

/// POST /api/watch/mark-watched/:id
pub async fn mark_watched(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let record = ctx.watch.mark_watched(user.id, MediaItemId::new(id))?;
    Ok(Json(record))
}

/// DELETE /api/watch/mark-unwatched/:id
pub async fn mark_unwatched(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let removed = ctx.watch.mark_unwatched(user.id, MediaItemId::new(id))?;
    if removed {
        Ok(Json(json!({ "message": "watch record removed" })))
    } else {
        Err(Error::not_found("watch record", id).into())
    }
}

/// POST /api/watch/reset/:id
pub async fn reset_progress(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let record = ctx
        .watch
        .reset(user.id, MediaItemId::new(id))?
        .ok_or_else(|| Error::not_found("watch record", id))?;
    Ok(Json(record))
}

/// GET /api/watch/continue-watching?limit=
pub async fn continue_watching(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let rows = ctx.watch.continue_watching(user.id, limit)?;
    Ok(Json(json!({ "items": rows_to_json(rows) })))
}

/// GET /api/watch/recently-watched?limit=
pub async fn recently_watched(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let rows = ctx.watch.recently_watched(user.id, limit)?;
    Ok(Json(json!({ "items": rows_to_json(rows) })))
}

/// GET /api/watch/history?limit=&offset=
pub async fn history(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    let rows = ctx.watch.history(user.id, limit, offset)?;
    Ok(Json(json!({
        "limit": limit,
        "offset": offset,
        "items": rows_to_json(rows),
    })))
}

/// GET /api/watch/stats
pub async fn stats(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(ctx.watch.stats(user.id)?))
}
