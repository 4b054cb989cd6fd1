//! Axum router construction: route groups, auth middleware, CORS, tracing.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::auth_middleware;
use super::context::AppContext;
use super::{
    routes_admin, routes_auth, routes_library, routes_metadata, routes_sources, routes_stream,
    routes_subtitles, routes_watch,
};

/// Build the complete application router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Open endpoints: registration and login only.
    let open_routes = Router::new()
        .route("/auth/register", post(routes_auth::register))
        .route("/auth/login", post(routes_auth::login));

    // Everything else re-validates the bearer credential per request.
    let protected_routes = Router::new()
        .route("/auth/verify", get(routes_auth::verify))
        // Library
        .route("/library/movies", get(routes_library::list_movies))
        .route("/library/tvshows", get(routes_library::list_tvshows))
        .route("/library/tvshow/{id}", get(routes_library::get_tvshow))
        .route(
            "/library/episode/{id}/next",
            get(routes_library::next_episode),
        )
        .route(
            "/library/episode/{id}/previous",
            get(routes_library::previous_episode),
        )
        .route("/library/search", get(routes_library::search))
        .route("/library/item/{id}", get(routes_library::get_item))
        .route("/library/scan", post(routes_library::start_scan))
        .route("/library/scan/progress", get(routes_library::scan_progress))
        // Streaming
        .route("/stream/{id}/info", get(routes_stream::stream_info))
        .route("/stream/{id}/qualities", get(routes_stream::stream_qualities))
        .route("/stream/{id}/direct", get(routes_stream::direct_stream))
        .route("/stream/{id}/transcode", get(routes_stream::transcode_stream))
        .route("/stream/{id}/pretranscode", post(routes_stream::pretranscode))
        .route(
            "/stream/{id}/hls/manifest.m3u8",
            get(routes_stream::hls_manifest),
        )
        .route("/stream/{id}/hls/{*path}", get(routes_stream::hls_file))
        // Subtitles
        .route("/subtitles/media/{id}", get(routes_subtitles::list_for_media))
        .route("/subtitles/{id}", get(routes_subtitles::serve_subtitle))
        // Network sources
        .route("/network/sources", get(routes_sources::list_sources))
        .route("/network/sources", post(routes_sources::create_source))
        .route("/network/sources/{id}", put(routes_sources::update_source))
        .route(
            "/network/sources/{id}",
            delete(routes_sources::delete_source),
        )
        .route("/network/sources/{id}/test", post(routes_sources::test_source))
        .route(
            "/network/sources/{id}/browse",
            get(routes_sources::browse_source),
        )
        .route("/network/discover", post(routes_sources::discover))
        // Watch progress. The writer lives under /metadata/ (historical API
        // surface); the readers live under /watch/.
        .route(
            "/metadata/watch/progress",
            post(routes_watch::update_progress),
        )
        .route("/watch/progress/{id}", get(routes_watch::get_progress))
        .route("/watch/mark-watched/{id}", post(routes_watch::mark_watched))
        .route(
            "/watch/mark-unwatched/{id}",
            delete(routes_watch::mark_unwatched),
        )
        .route(
            "/watch/continue-watching",
            get(routes_watch::continue_watching),
        )
        .route(
            "/watch/recently-watched",
            get(routes_watch::recently_watched),
        )
        .route("/watch/history", get(routes_watch::history))
        .route("/watch/stats", get(routes_watch::stats))
        .route("/watch/reset/{id}", post(routes_watch::reset_progress))
        // Metadata
        .route("/metadata/enrich/{id}", post(routes_metadata::enrich_item))
        // Admin
        .route("/admin/users", get(routes_admin::list_users))
        .route("/admin/users/{id}", delete(routes_admin::delete_user))
        .route("/admin/media/{id}", delete(routes_admin::delete_media))
        .route("/admin/stats", get(routes_admin::library_stats))
        .route("/admin/dashboard", get(routes_admin::dashboard))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let api = open_routes.merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// GET /health — unauthenticated liveness probe.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
