//! Network source route handlers: CRUD, connection tests, browsing, and
//! UPnP discovery.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use streambox_core::{Error, SourceId, SourceKind};
use streambox_db::queries;

use super::context::AppContext;
use super::error::AppError;
use crate::sources::secrets;
use crate::sources::upnp::UpnpClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRequest {
    pub name: String,
    pub protocol: SourceKind,
    #[serde(default)]
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Plaintext password; encrypted before it reaches the store.
    pub password: Option<String>,
    pub base_path: Option<String>,
    pub domain: Option<String>,
}

impl SourceRequest {
    fn into_new_source(self, secret: &str) -> Result<queries::sources::NewSource, Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("source name must not be empty".into()));
        }
        if self.protocol != SourceKind::Local && self.host.trim().is_empty() {
            return Err(Error::Validation(format!(
                "{} sources require a host",
                self.protocol
            )));
        }

        let credential = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| secrets::encrypt_credential(secret, p))
            .transpose()?;

        Ok(queries::sources::NewSource {
            name: self.name.trim().to_string(),
            protocol: self.protocol,
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username,
            credential,
            base_path: self.base_path,
            domain: self.domain,
        })
    }
}

/// GET /api/network/sources
pub async fn list_sources(State(ctx): State<AppContext>) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let sources = queries::sources::list_sources(&conn)?;
    Ok(Json(json!({ "count": sources.len(), "sources": sources })))
}

/// POST /api/network/sources
pub async fn create_source(
    State(ctx): State<AppContext>,
    Json(payload): Json<SourceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new = payload.into_new_source(&ctx.config.auth.secret)?;
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let source = queries::sources::create_source(&conn, &new)?;
    tracing::info!(source_id = %source.id, protocol = %source.protocol, "Source created");
    Ok((StatusCode::CREATED, Json(source)))
}

/// PUT /api/network/sources/:id
pub async fn update_source(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(payload): Json<SourceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let source_id = SourceId::new(id);
    let new = payload.into_new_source(&ctx.config.auth.secret)?;
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let source = queries::sources::update_source(&conn, source_id, &new)?;
    drop(conn);

    // The cached client now speaks with stale parameters; drop it.
    ctx.clients.evict(source_id);
    Ok(Json(source))
}

/// DELETE /api/network/sources/:id
pub async fn delete_source(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let source_id = SourceId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let deleted = queries::sources::delete_source(&conn, source_id)?;
    drop(conn);

    ctx.clients.evict(source_id);
    if deleted {
        Ok(Json(json!({ "message": "source deleted" })))
    } else {
        Err(Error::not_found("source", source_id).into())
    }
}

/// POST /api/network/sources/:id/test
pub async fn test_source(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let source_id = SourceId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let source = queries::sources::get_source(&conn, source_id)?
        .ok_or_else(|| Error::not_found("source", source_id))?;
    drop(conn);

    // A transient client keeps the test free of side effects on the cache.
    let client = ctx.clients.build_client(&source)?;
    let (ok, message) = client.test_connection().await;
    Ok(Json(json!({ "ok": ok, "message": message })))
}

#[derive(Debug, Deserialize)]
pub struct BrowseParams {
    #[serde(default)]
    pub path: String,
}

/// GET /api/network/sources/:id/browse?path=
pub async fn browse_source(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Query(params): Query<BrowseParams>,
) -> Result<impl IntoResponse, AppError> {
    let source_id = SourceId::new(id);
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let source = queries::sources::get_source(&conn, source_id)?
        .ok_or_else(|| Error::not_found("source", source_id))?;
    drop(conn);

    if !source.enabled {
        return Err(Error::Validation(format!("source {source_id} is disabled")).into());
    }

    let client = ctx.clients.get_or_create(&source)?;
    if !client.capabilities().browse {
        return Err(Error::Validation(format!(
            "{} sources cannot be browsed",
            source.protocol
        ))
        .into());
    }

    let entries = client.list(&params.path).await?;
    Ok(Json(json!({ "path": params.path, "entries": entries })))
}

#[derive(Debug, Deserialize)]
pub struct DiscoverParams {
    /// Seconds to wait for SSDP responders.
    pub timeout: Option<u64>,
}

/// POST /api/network/discover?timeout=
pub async fn discover(
    State(_ctx): State<AppContext>,
    Query(params): Query<DiscoverParams>,
) -> Result<impl IntoResponse, AppError> {
    let timeout = Duration::from_secs(params.timeout.unwrap_or(5).clamp(1, 30));
    let client = UpnpClient::new();
    let devices = client.discover(timeout).await?;

    // Fetch descriptions concurrently; unreachable devices stay bare.
    let mut detailed = Vec::with_capacity(devices.len());
    for device in devices {
        let info = client.device_info(&device).await.ok();
        detailed.push(json!({ "device": device, "info": info }));
    }

    Ok(Json(json!({ "count": detailed.len(), "devices": detailed })))
}
