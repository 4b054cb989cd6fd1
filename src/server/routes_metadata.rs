//! Manual metadata enrichment endpoint.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use streambox_core::{Error, MediaItemId, MediaKind};
use streambox_db::queries;

use super::context::AppContext;
use super::error::AppError;

/// POST /api/metadata/enrich/:id — re-run enrichment for one item
/// (or its show, for TV containers).
pub async fn enrich_item(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let enricher = ctx
        .enricher
        .as_ref()
        .ok_or_else(|| Error::Validation("metadata enrichment is not configured".into()))?;

    let media_id = MediaItemId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let item = queries::media::get_media_item(&conn, media_id)?
        .ok_or_else(|| Error::not_found("media item", media_id))?;
    let show = queries::tv::get_show_by_media_item(&conn, media_id)?;
    drop(conn);

    let fetched = match (item.kind, show) {
        (MediaKind::TvShow, Some(show)) => enricher.enrich_show(show.id).await?,
        _ => enricher.enrich_media(media_id).await?,
    };

    Ok(Json(json!({
        "mediaItemId": media_id,
        "fetched": fetched,
    })))
}
