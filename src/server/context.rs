//! Shared application context.
//!
//! [`AppContext`] is the composition root's output: every process-wide
//! observable (scan progress, transcoder job table, cache stats, client
//! pool) lives behind an `Arc` here and is injected into handlers via Axum
//! state. No module-level globals.

use std::sync::Arc;

use streambox_core::config::Config;
use streambox_db::pool::DbPool;

use crate::cache::CacheManager;
use crate::indexer::Indexer;
use crate::metadata::Enricher;
use crate::sources::ClientPool;
use crate::tools::Encoders;
use crate::transcode::Transcoder;
use crate::watch::WatchTracker;

/// Cheaply cloneable handle to all shared services.
#[derive(Clone)]
pub struct AppContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub indexer: Arc<Indexer>,
    pub transcoder: Arc<Transcoder>,
    pub cache: Arc<CacheManager>,
    pub clients: Arc<ClientPool>,
    pub encoders: Encoders,
    pub watch: Arc<WatchTracker>,
    /// Present when auto-enrichment is configured.
    pub enricher: Option<Arc<Enricher>>,
}

impl AppContext {
    /// Build the full context from configuration and an initialized pool.
    pub fn build(config: Config, db: DbPool) -> Self {
        let config = Arc::new(config);
        let encoders = Encoders::discover(&config.transcode);
        let cache = Arc::new(CacheManager::from_config(&config.cache));
        let transcoder = Arc::new(Transcoder::new(
            encoders.clone(),
            cache.clone(),
            config.transcode.segment_duration_secs,
        ));
        let enricher = Enricher::from_config(&config.metadata, db.clone());
        let indexer = Arc::new(Indexer::new(
            db.clone(),
            config.library.video_extensions.clone(),
            enricher.clone(),
        ));
        let clients = Arc::new(ClientPool::new(config.auth.secret.clone()));
        let watch = Arc::new(WatchTracker::new(db.clone()));

        Self {
            db,
            config,
            indexer,
            transcoder,
            cache,
            clients,
            encoders,
            watch,
            enricher,
        }
    }
}
