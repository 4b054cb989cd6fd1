//! Transcode artifact cache.
//!
//! Tracks a single root directory holding flat `<media_id>_<label>.mp4`
//! transcodes and `hls_<media_id>/` segment trees. Enforces a size cap by
//! LRU (mtime as the access proxy; readers and writers `touch` on access)
//! and a TTL sweep. Paths currently being written are registered in an
//! in-flight set and are never deleted by either sweep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use streambox_core::{MediaItemId, QualityLabel, Result};

/// Aggregate cache statistics, recomputed lazily on request.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Manages the artifact directory: layout, stats, and eviction policies.
pub struct CacheManager {
    root: PathBuf,
    max_bytes: u64,
    ttl: Duration,
    sweep_interval: Duration,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl CacheManager {
    pub fn new(root: PathBuf, max_bytes: u64, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            root,
            max_bytes,
            ttl,
            sweep_interval,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &streambox_core::config::CacheConfig) -> Self {
        Self::new(
            config.root.clone(),
            config.max_bytes,
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.sweep_interval_secs),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cached MP4 transcode for `(media, label)`.
    pub fn mp4_path(&self, media_id: MediaItemId, label: QualityLabel) -> PathBuf {
        self.root.join(format!("{media_id}_{label}.mp4"))
    }

    /// Directory of the HLS tree for a media item.
    pub fn hls_dir(&self, media_id: MediaItemId) -> PathBuf {
        self.root.join(format!("hls_{media_id}"))
    }

    /// Directory of one quality variant inside the HLS tree
    /// (`hls_<id>/<label>/`).
    pub fn hls_label_dir(&self, media_id: MediaItemId, label: QualityLabel) -> PathBuf {
        self.hls_dir(media_id).join(label.as_str())
    }

    /// Path of the top-level HLS manifest for a media item: the master
    /// playlist once variants exist.
    pub fn hls_manifest_path(&self, media_id: MediaItemId) -> PathBuf {
        self.hls_dir(media_id).join("playlist.m3u8")
    }

    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    // -- In-flight tracking -------------------------------------------------

    /// Register a path the encoder is about to write. Sweeps skip it (and,
    /// for directories, everything under it) until unmarked.
    pub fn mark_in_flight(&self, path: &Path) {
        self.in_flight.lock().insert(path.to_path_buf());
    }

    pub fn unmark_in_flight(&self, path: &Path) {
        self.in_flight.lock().remove(path);
    }

    fn is_in_flight(&self, path: &Path) -> bool {
        let guard = self.in_flight.lock();
        guard
            .iter()
            .any(|p| path == p || path.starts_with(p))
    }

    // -- Stats --------------------------------------------------------------

    /// Walk the cache root and total up artifact sizes.
    pub fn stats(&self) -> CacheStats {
        let mut total_bytes = 0u64;
        let mut file_count = 0u64;
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                if let Ok(meta) = entry.metadata() {
                    total_bytes += meta.len();
                    file_count += 1;
                }
            }
        }
        CacheStats {
            total_bytes,
            file_count,
        }
    }

    /// Bump a file's mtime so eviction sees it as recently used.
    pub fn touch(&self, path: &Path) {
        match std::fs::File::open(path) {
            Ok(file) => {
                let _ = file.set_modified(SystemTime::now());
            }
            Err(_) => {
                tracing::debug!(path = %path.display(), "touch on missing cache file");
            }
        }
    }

    // -- Eviction -----------------------------------------------------------

    /// Remove artifacts older than the TTL (by mtime), then clean up empty
    /// directories. In-flight paths survive.
    pub fn sweep_expired(&self) -> u64 {
        let cutoff = SystemTime::now() - self.ttl;
        let mut removed = 0u64;

        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.is_in_flight(path) {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if expired {
                if std::fs::remove_file(path).is_ok() {
                    removed += 1;
                    tracing::debug!(path = %path.display(), "TTL sweep removed artifact");
                }
            }
        }

        self.remove_empty_dirs();
        removed
    }

    /// Delete oldest files by mtime until the total is at or below the cap.
    /// In-flight paths survive even when the cap stays exceeded.
    pub fn enforce_size_cap(&self) -> u64 {
        let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        let mut total: u64 = 0;

        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                total += meta.len();
                files.push((entry.path().to_path_buf(), meta.len(), mtime));
            }
        }

        if total <= self.max_bytes {
            return 0;
        }

        files.sort_by_key(|(_, _, mtime)| *mtime);

        let mut removed = 0u64;
        for (path, size, _) in files {
            if total <= self.max_bytes {
                break;
            }
            if self.is_in_flight(&path) {
                continue;
            }
            if std::fs::remove_file(&path).is_ok() {
                total -= size;
                removed += 1;
                tracing::info!(path = %path.display(), size, "size cap evicted artifact");
            }
        }

        self.remove_empty_dirs();
        removed
    }

    /// Remove every artifact belonging to one media item: its HLS tree and
    /// all `<id>_<label>.mp4` transcodes.
    pub fn clear_media(&self, media_id: MediaItemId) -> Result<()> {
        let hls = self.hls_dir(media_id);
        if hls.exists() {
            std::fs::remove_dir_all(&hls)?;
        }

        let prefix = format!("{media_id}_");
        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(&prefix) && name.ends_with(".mp4") {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }

    fn remove_empty_dirs(&self) {
        // Depth-first so children go before parents; never the root itself.
        let mut dirs: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir() && e.path() != self.root)
            .map(|e| e.path().to_path_buf())
            .collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            if self.is_in_flight(&dir) {
                continue;
            }
            // remove_dir fails on non-empty directories, which is the point.
            let _ = std::fs::remove_dir(&dir);
        }
    }

    /// Periodic maintenance: TTL sweep then size-cap enforcement, every
    /// `sweep_interval`, until cancelled.
    pub async fn maintenance_loop(self: std::sync::Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mgr = self.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        let expired = mgr.sweep_expired();
                        let evicted = mgr.enforce_size_cap();
                        (expired, evicted, mgr.stats())
                    })
                    .await;
                    if let Ok((expired, evicted, stats)) = result {
                        tracing::debug!(
                            expired,
                            evicted,
                            total_bytes = stats.total_bytes,
                            file_count = stats.file_count,
                            "Cache maintenance pass complete"
                        );
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manager(root: &Path, max_bytes: u64, ttl: Duration) -> CacheManager {
        CacheManager::new(root.to_path_buf(), max_bytes, ttl, Duration::from_secs(3600))
    }

    fn write_with_age(path: &Path, size: usize, age: Duration) {
        fs::write(path, vec![0u8; size]).unwrap();
        let mtime = SystemTime::now() - age;
        let f = fs::File::open(path).unwrap();
        f.set_modified(mtime).unwrap();
    }

    #[test]
    fn artifact_paths() {
        let mgr = manager(Path::new("/cache"), 0, Duration::ZERO);
        let id = MediaItemId::new(7);
        assert_eq!(
            mgr.mp4_path(id, QualityLabel::Q720),
            PathBuf::from("/cache/7_720p.mp4")
        );
        assert_eq!(mgr.hls_dir(id), PathBuf::from("/cache/hls_7"));
        assert_eq!(
            mgr.hls_label_dir(id, QualityLabel::Q720),
            PathBuf::from("/cache/hls_7/720p")
        );
        assert_eq!(
            mgr.hls_manifest_path(id),
            PathBuf::from("/cache/hls_7/playlist.m3u8")
        );
    }

    #[test]
    fn stats_totals_files() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1 << 30, Duration::from_secs(3600));
        fs::write(dir.path().join("1_720p.mp4"), vec![0u8; 100]).unwrap();
        fs::create_dir(dir.path().join("hls_2")).unwrap();
        fs::write(dir.path().join("hls_2/segment000.ts"), vec![0u8; 50]).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.total_bytes, 150);
        assert_eq!(stats.file_count, 2);
    }

    #[test]
    fn size_cap_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        const MIB: usize = 1024 * 1024;
        let mgr = manager(dir.path(), 3 * MIB as u64, Duration::from_secs(1 << 20));

        // Four 1 MiB artifacts, a < b < c < d by mtime.
        write_with_age(&dir.path().join("1_480p.mp4"), MIB, Duration::from_secs(400));
        write_with_age(&dir.path().join("2_480p.mp4"), MIB, Duration::from_secs(300));
        write_with_age(&dir.path().join("3_480p.mp4"), MIB, Duration::from_secs(200));
        write_with_age(&dir.path().join("4_480p.mp4"), MIB, Duration::from_secs(100));

        mgr.enforce_size_cap();

        assert!(!dir.path().join("1_480p.mp4").exists(), "oldest must go");
        assert!(dir.path().join("2_480p.mp4").exists());
        assert!(dir.path().join("3_480p.mp4").exists());
        assert!(dir.path().join("4_480p.mp4").exists());
        assert!(mgr.stats().total_bytes <= 3 * MIB as u64);
    }

    #[test]
    fn size_cap_skips_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        const MIB: usize = 1024 * 1024;
        let mgr = manager(dir.path(), MIB as u64, Duration::from_secs(1 << 20));

        let oldest = dir.path().join("1_480p.mp4");
        write_with_age(&oldest, MIB, Duration::from_secs(400));
        write_with_age(&dir.path().join("2_480p.mp4"), MIB, Duration::from_secs(100));

        mgr.mark_in_flight(&oldest);
        mgr.enforce_size_cap();

        assert!(oldest.exists(), "in-flight artifact must survive");
        assert!(!dir.path().join("2_480p.mp4").exists());
    }

    #[test]
    fn ttl_sweep_spares_young_files() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1 << 30, Duration::from_secs(1000));

        write_with_age(&dir.path().join("old.mp4"), 10, Duration::from_secs(2000));
        write_with_age(&dir.path().join("young.mp4"), 10, Duration::from_secs(10));

        let removed = mgr.sweep_expired();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("old.mp4").exists());
        assert!(dir.path().join("young.mp4").exists());
    }

    #[test]
    fn ttl_sweep_removes_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1 << 30, Duration::from_secs(100));

        let hls = dir.path().join("hls_9");
        fs::create_dir(&hls).unwrap();
        write_with_age(&hls.join("segment000.ts"), 10, Duration::from_secs(500));

        mgr.sweep_expired();
        assert!(!hls.exists(), "emptied HLS tree should be removed");
    }

    #[test]
    fn clear_media_removes_tree_and_transcodes() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1 << 30, Duration::from_secs(3600));
        let id = MediaItemId::new(5);

        fs::create_dir(mgr.hls_dir(id)).unwrap();
        fs::write(mgr.hls_dir(id).join("playlist.m3u8"), "x").unwrap();
        fs::write(mgr.mp4_path(id, QualityLabel::Q720), "x").unwrap();
        fs::write(mgr.mp4_path(id, QualityLabel::Q480), "x").unwrap();
        // A neighbor that must survive.
        fs::write(dir.path().join("55_720p.mp4"), "x").unwrap();

        mgr.clear_media(id).unwrap();

        assert!(!mgr.hls_dir(id).exists());
        assert!(!mgr.mp4_path(id, QualityLabel::Q720).exists());
        assert!(!mgr.mp4_path(id, QualityLabel::Q480).exists());
        assert!(dir.path().join("55_720p.mp4").exists());
    }

    #[test]
    fn in_flight_covers_directory_children() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1 << 30, Duration::from_secs(100));

        let hls = dir.path().join("hls_3");
        fs::create_dir(&hls).unwrap();
        write_with_age(&hls.join("segment000.ts"), 10, Duration::from_secs(500));

        mgr.mark_in_flight(&hls);
        mgr.sweep_expired();
        assert!(hls.join("segment000.ts").exists());

        mgr.unmark_in_flight(&hls);
        mgr.sweep_expired();
        assert!(!hls.exists());
    }
}
