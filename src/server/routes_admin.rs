//! Admin route handlers. Every handler re-checks the admin flag that the
//! auth middleware fetched fresh from the store.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;

use streambox_core::{Error, MediaItemId, UserId};
use streambox_db::queries;

use super::auth::{require_admin, AuthUser};
use super::context::AppContext;
use super::error::AppError;

/// GET /api/admin/users
pub async fn list_users(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&user)?;
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let users = queries::users::list_users(&conn)?;
    Ok(Json(json!({ "count": users.len(), "users": users })))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&user)?;
    let target = UserId::new(id);
    if target == user.id {
        return Err(Error::Validation("cannot delete your own account".into()).into());
    }

    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    if queries::users::delete_user(&conn, target)? {
        tracing::info!(user_id = %target, by = %user.username, "User deleted");
        Ok(Json(json!({ "message": "user deleted" })))
    } else {
        Err(Error::not_found("user", target).into())
    }
}

/// DELETE /api/admin/media/:id — cascades to episodes, subtitles, watch
/// records, and cached artifacts.
pub async fn delete_media(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&user)?;
    let media_id = MediaItemId::new(id);

    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let deleted = queries::media::delete_media_item(&conn, media_id)?;
    drop(conn);

    if !deleted {
        return Err(Error::not_found("media item", media_id).into());
    }

    ctx.cache.clear_media(media_id)?;
    tracing::info!(media_id = %media_id, by = %user.username, "Media item deleted");
    Ok(Json(json!({ "message": "media item deleted" })))
}

/// GET /api/admin/stats
pub async fn library_stats(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&user)?;
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let stats = queries::media::library_stats(&conn)?;
    Ok(Json(stats))
}

/// GET /api/admin/dashboard
pub async fn dashboard(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&user)?;

    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let library = queries::media::library_stats(&conn)?;
    let user_count = queries::users::count_users(&conn)?;
    let source_count = queries::sources::list_sources(&conn)?.len();
    drop(conn);

    let cache_mgr = ctx.cache.clone();
    let cache = tokio::task::spawn_blocking(move || cache_mgr.stats())
        .await
        .map_err(|e| Error::Internal(format!("cache stats task panicked: {e}")))?;

    Ok(Json(json!({
        "library": library,
        "users": user_count,
        "sources": source_count,
        "cache": cache,
        "scan": ctx.indexer.progress(),
        "transcoderAvailable": ctx.transcoder.available(),
    })))
}
