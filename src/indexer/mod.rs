//! Library indexer: walks a source, classifies files, and upserts entities.
//!
//! At most one scan runs per process; a second start attempt fails with
//! `Conflict` rather than queueing. Progress is a shared snapshot readable
//! by any concurrent observer. Per-file failures are recorded into the
//! progress and never abort the scan; a directory-listing failure abandons
//! only that subtree.

pub mod parse;
pub mod subtitles;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use streambox_core::{Error, MediaKind, Result, SourceId, SourceKind};
use streambox_db::pool::DbPool;
use streambox_db::queries;

use crate::metadata::Enricher;
use crate::sources::{ProtocolClient, RemoteEntry};

/// One failed path captured during a scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanError {
    pub path: String,
    pub message: String,
}

/// Live scan snapshot, readable while a scan runs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub running: bool,
    pub total_files: u64,
    pub scanned_files: u64,
    pub added_files: u64,
    pub metadata_fetched: u64,
    pub errors: Vec<ScanError>,
}

struct ScanState {
    running: AtomicBool,
    progress: RwLock<ScanProgress>,
}

/// The indexer. One instance lives in the composition root; clones share
/// the same scan slot and progress.
#[derive(Clone)]
pub struct Indexer {
    db: DbPool,
    video_extensions: Vec<String>,
    enricher: Option<Arc<Enricher>>,
    state: Arc<ScanState>,
}

/// What to scan: a protocol client plus its stored identity.
pub struct ScanTarget {
    pub client: Arc<dyn ProtocolClient>,
    pub source_kind: SourceKind,
    pub source_id: Option<SourceId>,
    pub root: String,
}

impl Indexer {
    pub fn new(
        db: DbPool,
        video_extensions: Vec<String>,
        enricher: Option<Arc<Enricher>>,
    ) -> Self {
        Self {
            db,
            video_extensions: video_extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            enricher,
            state: Arc::new(ScanState {
                running: AtomicBool::new(false),
                progress: RwLock::new(ScanProgress::default()),
            }),
        }
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> ScanProgress {
        self.state.progress.read().clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Claim the single scan slot and spawn the scan in the background.
    /// Fails with `Conflict` when a scan is already running.
    pub fn try_start(&self, target: ScanTarget) -> Result<()> {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Conflict("a scan is already running".into()));
        }

        *self.state.progress.write() = ScanProgress {
            running: true,
            ..ScanProgress::default()
        };

        let indexer = self.clone();
        tokio::spawn(async move {
            let root = target.root.clone();
            indexer.run_scan(target).await;
            indexer.state.running.store(false, Ordering::SeqCst);
            indexer.state.progress.write().running = false;
            tracing::info!(root = %root, "Scan finished");
        });
        Ok(())
    }

    /// Run a scan to completion on the current task. Used directly by tests;
    /// the API goes through [`Indexer::try_start`].
    pub async fn scan_blocking(&self, target: ScanTarget) -> Result<ScanProgress> {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Conflict("a scan is already running".into()));
        }
        *self.state.progress.write() = ScanProgress {
            running: true,
            ..ScanProgress::default()
        };

        self.run_scan(target).await;
        self.state.running.store(false, Ordering::SeqCst);
        let mut progress = self.state.progress.write();
        progress.running = false;
        Ok(progress.clone())
    }

    fn record_error(&self, path: &str, message: String) {
        tracing::warn!(path, message = %message, "Scan error");
        self.state.progress.write().errors.push(ScanError {
            path: path.to_string(),
            message,
        });
    }

    fn is_video(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .map(|(_, ext)| self.video_extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    async fn run_scan(&self, target: ScanTarget) {
        // Phase 1: depth-first walk collecting video files and keeping each
        // directory's full listing around for sidecar discovery.
        let mut pending_dirs = vec![target.root.clone()];
        let mut videos: Vec<(String, RemoteEntry)> = Vec::new();
        let mut dir_files: HashMap<String, Vec<RemoteEntry>> = HashMap::new();

        while let Some(dir) = pending_dirs.pop() {
            match target.client.list(&dir).await {
                Ok(entries) => {
                    let mut files = Vec::new();
                    for entry in entries {
                        if entry.is_dir {
                            pending_dirs.push(entry.path.clone());
                        } else {
                            files.push(entry);
                        }
                    }
                    for file in &files {
                        if self.is_video(&file.name) {
                            videos.push((dir.clone(), file.clone()));
                        }
                    }
                    dir_files.insert(dir, files);
                }
                Err(e) => {
                    // Abandons only this subtree; siblings continue.
                    self.record_error(&dir, e.to_string());
                }
            }
        }

        self.state.progress.write().total_files = videos.len() as u64;

        // Batch existence check so re-scans are cheap and idempotent.
        let known: HashSet<String> = match streambox_db::pool::get_conn(&self.db)
            .and_then(|conn| {
                queries::media::list_known_paths(&conn, target.source_kind, target.source_id)
            }) {
            Ok(paths) => paths.into_iter().collect(),
            Err(e) => {
                self.record_error(&target.root, format!("loading known paths: {e}"));
                HashSet::new()
            }
        };

        // Phase 2: classify and upsert each video file.
        for (dir, entry) in videos {
            self.state.progress.write().scanned_files += 1;

            if known.contains(&entry.path) {
                continue;
            }

            match self.ingest_file(&target, &dir, &entry, &dir_files).await {
                Ok(()) => {
                    self.state.progress.write().added_files += 1;
                }
                Err(Error::Conflict(_)) => {
                    // Raced with itself or a previous partial scan: already
                    // indexed, not an error.
                }
                Err(e) => self.record_error(&entry.path, e.to_string()),
            }
        }
    }

    async fn ingest_file(
        &self,
        target: &ScanTarget,
        dir: &str,
        entry: &RemoteEntry,
        dir_files: &HashMap<String, Vec<RemoteEntry>>,
    ) -> Result<()> {
        // Prefer listing sizes; stat only when the protocol withheld them.
        let size = match entry.size {
            Some(s) => s,
            None => target
                .client
                .stat(&entry.path)
                .await?
                .size
                .unwrap_or(0),
        };

        let stem = entry
            .name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&entry.name);

        let episode_info = episode_context(&entry.path, stem);

        let media_id = match episode_info {
            Some((show_title, show_dir, numbers)) => {
                let conn = streambox_db::pool::get_conn(&self.db)?;

                let existing_show = queries::tv::get_show_by_title(&conn, &show_title)?;
                let show = queries::tv::find_or_create_show(
                    &conn,
                    &show_title,
                    &show_dir,
                    target.source_kind,
                    target.source_id,
                )?;
                let newly_created = existing_show.is_none();

                let item = queries::media::insert_media_item(
                    &conn,
                    &queries::media::NewMediaItem {
                        kind: MediaKind::Episode,
                        title: format!(
                            "{} S{:02}E{:02}",
                            show_title, numbers.season, numbers.episode
                        ),
                        year: None,
                        file_path: entry.path.clone(),
                        file_size: size as i64,
                        source_kind: target.source_kind,
                        source_id: target.source_id,
                        quality: parse::quality_from_tokens(stem).map(str::to_string),
                    },
                )?;

                let episode_title = parse::episode_title(stem);
                if let Err(e) = queries::tv::insert_episode(
                    &conn,
                    show.id,
                    numbers.season as i32,
                    numbers.episode as i32,
                    item.id,
                    Some(&episode_title),
                ) {
                    // Duplicate (season, episode), e.g. a second copy at a
                    // different quality. Do not leave the orphan item behind.
                    let _ = queries::media::delete_media_item(&conn, item.id);
                    return Err(e);
                }
                drop(conn);

                if newly_created {
                    self.dispatch_show_enrichment(show.id);
                }
                item.id
            }
            None => {
                let (title, year) = parse::movie_title(stem);
                let conn = streambox_db::pool::get_conn(&self.db)?;
                let item = queries::media::insert_media_item(
                    &conn,
                    &queries::media::NewMediaItem {
                        kind: MediaKind::Movie,
                        title: if title.is_empty() { stem.to_string() } else { title },
                        year,
                        file_path: entry.path.clone(),
                        file_size: size as i64,
                        source_kind: target.source_kind,
                        source_id: target.source_id,
                        quality: parse::quality_from_tokens(stem).map(str::to_string),
                    },
                )?;
                drop(conn);

                self.dispatch_media_enrichment(item.id);
                item.id
            }
        };

        // Sidecar subtitles from the same directory.
        if let Some(files) = dir_files.get(dir) {
            let conn = streambox_db::pool::get_conn(&self.db)?;
            for file in files {
                if let Some(sidecar) = subtitles::match_sidecar(stem, &file.name) {
                    if let Err(e) = queries::subtitles::insert_subtitle(
                        &conn,
                        media_id,
                        &sidecar.language,
                        &sidecar.label,
                        &file.path,
                        sidecar.format,
                        false,
                    ) {
                        tracing::warn!(path = %file.path, "Subtitle attach failed: {e}");
                    }
                }
            }
        }

        tracing::debug!(path = %entry.path, "Indexed file");
        Ok(())
    }

    fn dispatch_media_enrichment(&self, media_id: streambox_core::MediaItemId) {
        let Some(enricher) = self.enricher.clone() else {
            return;
        };
        let state = self.state.clone();
        tokio::spawn(async move {
            match enricher.enrich_media(media_id).await {
                Ok(true) => state.progress.write().metadata_fetched += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!(media_id = %media_id, "Enrichment failed: {e}"),
            }
        });
    }

    fn dispatch_show_enrichment(&self, show_id: streambox_core::TvShowId) {
        let Some(enricher) = self.enricher.clone() else {
            return;
        };
        let state = self.state.clone();
        tokio::spawn(async move {
            match enricher.enrich_show(show_id).await {
                Ok(true) => state.progress.write().metadata_fetched += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!(show_id = %show_id, "Enrichment failed: {e}"),
            }
        });
    }
}

/// Episode context for a path: `(show title, show directory, numbers)`.
///
/// A file is an episode when it sits under a `tv-shows` segment **and** its
/// name carries season/episode numbers; everything else is a movie.
fn episode_context(path: &str, stem: &str) -> Option<(String, String, parse::EpisodeNumbers)> {
    let numbers = parse::episode_numbers(stem)?;

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let tv_idx = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("tv-shows"))?;
    let show_dir_name = segments.get(tv_idx + 1)?;

    // A file directly under tv-shows/ has no show directory.
    if tv_idx + 1 == segments.len() - 1 {
        return None;
    }

    let show_title = parse::show_name(show_dir_name);
    let show_dir = segments[..=tv_idx + 1].join("/");
    Some((show_title, show_dir, numbers))
}
