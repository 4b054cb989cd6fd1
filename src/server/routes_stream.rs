//! Streaming route handlers: probe info, byte-range delivery, realtime
//! transcodes, and HLS.
//!
//! Direct mode serves web-native containers as ranged bytes; everything
//! else transparently falls back to a realtime fragmented-MP4 transcode
//! whose encoder dies with the connection.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use streambox_core::{Error, MediaItemId, QualityLabel, SourceKind};
use streambox_db::models::MediaItem;
use streambox_db::queries;

use super::context::AppContext;
use super::error::AppError;
use crate::probe;
use crate::transcode::profile_for;

/// Extensions servable as raw ranges.
const WEB_NATIVE_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "mov"];

fn load_item(ctx: &AppContext, id: i64) -> Result<MediaItem, Error> {
    let item_id = MediaItemId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    queries::media::get_media_item(&conn, item_id)?
        .ok_or_else(|| Error::not_found("media item", item_id))
}

/// Absolute filesystem path for a local item. Remote items cannot feed the
/// encoder; they stream through their protocol client instead.
fn resolve_local_path(ctx: &AppContext, item: &MediaItem) -> Result<PathBuf, Error> {
    if item.source_kind != SourceKind::Local {
        return Err(Error::Validation(format!(
            "item {} lives on a {} source; only direct streaming is available",
            item.id, item.source_kind
        )));
    }
    match item.source_id {
        Some(source_id) => {
            let conn = streambox_db::pool::get_conn(&ctx.db)?;
            let source = queries::sources::get_source(&conn, source_id)?
                .ok_or_else(|| Error::not_found("source", source_id))?;
            let base = source.base_path.unwrap_or_else(|| "/".into());
            Ok(PathBuf::from(base).join(item.file_path.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from("/").join(item.file_path.trim_start_matches('/'))),
    }
}

fn extension_of(path: &str) -> String {
    path.rsplit('.').next().unwrap_or("").to_lowercase()
}

fn is_web_native_ext(ext: &str) -> bool {
    WEB_NATIVE_EXTENSIONS.contains(&ext)
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" => "video/mp2t",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

/// Parse a `Range: bytes=START-END` header value.
fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let bytes_prefix = value.strip_prefix("bytes=")?;
    let mut parts = bytes_prefix.splitn(2, '-');
    let start_str = parts.next()?.trim();
    let end_str = parts.next()?.trim();

    let start: u64 = start_str.parse().ok()?;
    let end: Option<u64> = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some((start, end))
}

/// Fallback realtime profile: the item's own quality capped at 1080p, or
/// 720p when the label is unknown or has no encoder rung.
fn realtime_label(item: &MediaItem) -> QualityLabel {
    item.quality
        .as_deref()
        .and_then(|q| q.parse::<QualityLabel>().ok())
        .map(|label| label.min(QualityLabel::Q1080))
        .filter(|label| profile_for(*label).is_ok())
        .unwrap_or(QualityLabel::Q720)
}

/// Wrap an encoder stdout so dropping the HTTP body cancels the job.
fn body_with_cancel(
    stdout: tokio::process::ChildStdout,
    cancel: CancellationToken,
) -> Body {
    struct CancelOnDrop(CancellationToken);
    impl Drop for CancelOnDrop {
        fn drop(&mut self) {
            self.0.cancel();
        }
    }

    let guard = CancelOnDrop(cancel);
    let stream = ReaderStream::new(stdout).map(move |chunk| {
        let _ = &guard;
        chunk
    });
    Body::from_stream(stream)
}

// ---------------------------------------------------------------------------
// Probe endpoints
// ---------------------------------------------------------------------------

/// GET /api/stream/:id/info
pub async fn stream_info(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let item = load_item(&ctx, id)?;
    let path = resolve_local_path(&ctx, &item)?;
    let info = probe::probe_file(&ctx.encoders, &path).await?;

    // Opportunistically persist what the probe learned.
    if let Ok(conn) = streambox_db::pool::get_conn(&ctx.db) {
        let _ = queries::media::update_probe_info(
            &conn,
            item.id,
            info.duration_secs,
            Some(info.quality_label.as_str()),
        );
    }

    Ok(Json(info))
}

/// GET /api/stream/:id/qualities
pub async fn stream_qualities(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let item = load_item(&ctx, id)?;
    let path = resolve_local_path(&ctx, &item)?;
    let info = probe::probe_file(&ctx.encoders, &path).await?;

    Ok(Json(json!({
        "current": info.quality_label,
        "needsTranscoding": info.needs_transcoding(),
        "qualities": info.ladder(),
    })))
}

// ---------------------------------------------------------------------------
// Direct / transcoded delivery
// ---------------------------------------------------------------------------

/// GET /api/stream/:id/direct
pub async fn direct_stream(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let item = load_item(&ctx, id)?;
    let ext = extension_of(&item.file_path);

    if !is_web_native_ext(&ext) {
        // Transparent realtime transcode for e.g. Matroska.
        return realtime_response(&ctx, &item, realtime_label(&item));
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header);

    match item.source_kind {
        SourceKind::Local => {
            let path = resolve_local_path(&ctx, &item)?;
            serve_local_range(&path, &ext, range).await
        }
        _ => serve_remote_range(&ctx, &item, &ext, range).await,
    }
}

async fn serve_local_range(
    path: &std::path::Path,
    ext: &str,
    range: Option<(u64, Option<u64>)>,
) -> Result<Response, AppError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::not_found("file", path.display()))?;
    let size = meta.len();
    let mime = mime_for_extension(ext);

    match range {
        Some((start, end_opt)) => {
            if start >= size {
                return Ok(range_not_satisfiable(size));
            }
            let end = end_opt.unwrap_or(size - 1).min(size - 1);
            if start > end {
                return Ok(range_not_satisfiable(size));
            }
            let length = end - start + 1;

            let mut file = tokio::fs::File::open(path)
                .await
                .map_err(|_| Error::not_found("file", path.display()))?;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| Error::Internal(format!("seek failed: {e}")))?;
            let body = Body::from_stream(ReaderStream::new(file.take(length)));

            Ok(Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
                .header(header::CONTENT_LENGTH, length)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .expect("static response"))
        }
        None => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|_| Error::not_found("file", path.display()))?;
            let body = Body::from_stream(ReaderStream::new(file));

            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, size)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .expect("static response"))
        }
    }
}

async fn serve_remote_range(
    ctx: &AppContext,
    item: &MediaItem,
    ext: &str,
    range: Option<(u64, Option<u64>)>,
) -> Result<Response, AppError> {
    let source_id = item
        .source_id
        .ok_or_else(|| Error::Validation("remote item has no source".into()))?;
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let source = queries::sources::get_source(&conn, source_id)?
        .ok_or_else(|| Error::not_found("source", source_id))?;
    drop(conn);

    let client = ctx.clients.get_or_create(&source)?;
    let size = item.file_size.max(0) as u64;
    let mime = mime_for_extension(ext);

    match range {
        Some((start, end_opt)) => {
            if size > 0 && start >= size {
                return Ok(range_not_satisfiable(size));
            }
            let end = end_opt.unwrap_or(size.saturating_sub(1)).min(size.saturating_sub(1));
            let length = end - start + 1;

            let reader = client.open_range(&item.file_path, start, Some(end)).await?;
            let body = Body::from_stream(ReaderStream::new(reader));

            Ok(Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
                .header(header::CONTENT_LENGTH, length)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .expect("static response"))
        }
        None => {
            let reader = client.open_range(&item.file_path, 0, None).await?;
            let body = Body::from_stream(ReaderStream::new(reader));

            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, size)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .expect("static response"))
        }
    }
}

fn range_not_satisfiable(size: u64) -> Response {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, format!("bytes */{size}"))
        .body(Body::empty())
        .expect("static response")
}

fn realtime_response(
    ctx: &AppContext,
    item: &MediaItem,
    label: QualityLabel,
) -> Result<Response, AppError> {
    let path = resolve_local_path(ctx, item)?;
    let profile = profile_for(label)?;
    let cancel = CancellationToken::new();
    let stdout = ctx
        .transcoder
        .stream_transcode(&path, &profile, cancel.clone())?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .body(body_with_cancel(stdout, cancel))
        .expect("static response"))
}

#[derive(Debug, Deserialize)]
pub struct TranscodeParams {
    pub quality: Option<String>,
}

/// GET /api/stream/:id/transcode?quality=
pub async fn transcode_stream(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    axum::extract::Query(params): axum::extract::Query<TranscodeParams>,
) -> Result<Response, AppError> {
    let item = load_item(&ctx, id)?;
    let label = match params.quality.as_deref() {
        Some(q) => q.parse::<QualityLabel>()?,
        None => realtime_label(&item),
    };
    realtime_response(&ctx, &item, label)
}

#[derive(Debug, Deserialize)]
pub struct PretranscodeRequest {
    pub quality: String,
}

/// POST /api/stream/:id/pretranscode — kick off a cached transcode.
pub async fn pretranscode(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(payload): Json<PretranscodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let item = load_item(&ctx, id)?;
    let label = payload.quality.parse::<QualityLabel>()?;
    profile_for(label)?;
    let input = resolve_local_path(&ctx, &item)?;

    let transcoder = ctx.transcoder.clone();
    let media_id = item.id;
    tokio::spawn(async move {
        match transcoder.transcode_quality(&input, media_id, label).await {
            Ok(output) => {
                tracing::info!(media_id = %media_id, output = %output.display(), "Pretranscode complete")
            }
            Err(e) => tracing::warn!(media_id = %media_id, "Pretranscode failed: {e}"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": format!("transcode to {label} started"),
            "mediaItemId": item.id,
        })),
    ))
}

// ---------------------------------------------------------------------------
// HLS
// ---------------------------------------------------------------------------

/// GET /api/stream/:id/hls/manifest.m3u8
///
/// 200 with the master playlist when cached; otherwise kicks off variant
/// generation and answers 202 so the client can poll.
pub async fn hls_manifest(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let item = load_item(&ctx, id)?;
    let manifest = ctx.cache.hls_manifest_path(item.id);

    if tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
        ctx.cache.touch(&manifest);
        let content = tokio::fs::read_to_string(&manifest)
            .await
            .map_err(|e| Error::Internal(format!("manifest read failed: {e}")))?;
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
            content,
        )
            .into_response());
    }

    let input = resolve_local_path(&ctx, &item)?;
    let label = realtime_label(&item);
    let transcoder = ctx.transcoder.clone();
    let media_id = item.id;
    tokio::spawn(async move {
        if let Err(e) = transcoder.generate_hls(&input, media_id, label).await {
            tracing::warn!(media_id = %media_id, "HLS generation failed: {e}");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "processing",
            "message": "HLS stream is being prepared; poll again shortly",
        })),
    )
        .into_response())
}

/// One safe file name inside an HLS tree: a `.ts` segment or a variant
/// playlist, with no traversal tricks.
fn is_safe_hls_file(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains('\\')
        && (name.ends_with(".ts") || name == "playlist.m3u8")
}

/// GET /api/stream/:id/hls/*path
///
/// Serves variant playlists (`<label>/playlist.m3u8`) and media segments
/// (`<label>/segment000.ts`, or flat `segment000.ts`) out of the HLS tree.
/// 404 until the generator has written the file.
pub async fn hls_file(
    State(ctx): State<AppContext>,
    Path((id, path)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    // Reject traversal before touching the filesystem: at most one variant
    // directory (a known quality label) and one safe file name.
    let components: Vec<&str> = path.split('/').collect();
    let valid = match components.as_slice() {
        [file] => is_safe_hls_file(file),
        [label, file] => label.parse::<QualityLabel>().is_ok() && is_safe_hls_file(file),
        _ => false,
    };
    if !valid {
        return Err(Error::Validation("invalid segment path".into()).into());
    }

    let item = load_item(&ctx, id)?;
    let full = ctx.cache.hls_dir(item.id).join(&path);
    let data: Bytes = tokio::fs::read(&full)
        .await
        .map_err(|_| Error::not_found("segment", &path))?
        .into();
    ctx.cache.touch(&full);

    let content_type = if path.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else {
        "video/mp2t"
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        data,
    )
        .into_response())
}
