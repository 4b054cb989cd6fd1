//! Supervised ffmpeg jobs: file transcodes, realtime fragmented MP4, and
//! HLS segment generation.
//!
//! Every job has a key (the output path for file jobs, `hls:<id>:<label>`
//! for HLS) and at most one running encoder process. Callers racing for the
//! same key all await the single running job's outcome. Realtime jobs are
//! killed when the HTTP client disconnects; file and HLS jobs only by
//! explicit cancel.

pub mod profiles;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use streambox_core::{Error, MediaItemId, QualityLabel, Result};

use crate::cache::CacheManager;
use crate::tools::{Encoders, ToolCommand};
pub use profiles::{profile_for, TranscodeProfile};

/// File jobs get a generous ceiling; a stuck encoder should not hold its
/// job key forever.
const FILE_JOB_TIMEOUT: Duration = Duration::from_secs(4 * 3600);

/// Outcome broadcast to everyone awaiting a job. Errors travel as strings
/// because `watch` requires `Clone`.
type JobOutcome = std::result::Result<PathBuf, String>;

#[derive(Clone)]
struct JobHandle {
    done: watch::Receiver<Option<JobOutcome>>,
    cancel: CancellationToken,
}

enum JobRole {
    Owner(watch::Sender<Option<JobOutcome>>, CancellationToken),
    Waiter(JobHandle),
}

/// The transcoder: owns the job table and the per-media HLS serialization
/// locks. One instance lives in the composition root.
pub struct Transcoder {
    encoders: Encoders,
    cache: Arc<CacheManager>,
    segment_duration_secs: u32,
    jobs: DashMap<String, JobHandle>,
    hls_locks: DashMap<MediaItemId, Arc<tokio::sync::Mutex<()>>>,
}

impl Transcoder {
    pub fn new(encoders: Encoders, cache: Arc<CacheManager>, segment_duration_secs: u32) -> Self {
        Self {
            encoders,
            cache,
            segment_duration_secs,
            jobs: DashMap::new(),
            hls_locks: DashMap::new(),
        }
    }

    pub fn segment_duration_secs(&self) -> u32 {
        self.segment_duration_secs
    }

    /// Whether the encoder binary is present at all.
    pub fn available(&self) -> bool {
        self.encoders.ffmpeg.is_some()
    }

    // -- Job table ----------------------------------------------------------

    fn claim(&self, key: &str) -> JobRole {
        use dashmap::mapref::entry::Entry;
        match self.jobs.entry(key.to_string()) {
            Entry::Occupied(e) => JobRole::Waiter(e.get().clone()),
            Entry::Vacant(v) => {
                let (tx, rx) = watch::channel(None);
                let cancel = CancellationToken::new();
                v.insert(JobHandle {
                    done: rx,
                    cancel: cancel.clone(),
                });
                JobRole::Owner(tx, cancel)
            }
        }
    }

    async fn await_outcome(mut handle: JobHandle) -> Result<PathBuf> {
        loop {
            {
                let value = handle.done.borrow();
                if let Some(outcome) = value.as_ref() {
                    return outcome.clone().map_err(Error::EncodeFailed);
                }
            }
            if handle.done.changed().await.is_err() {
                return Err(Error::EncodeFailed("transcode job vanished".into()));
            }
        }
    }

    fn finish(&self, key: &str, tx: &watch::Sender<Option<JobOutcome>>, outcome: &Result<PathBuf>) {
        let value = match outcome {
            Ok(path) => Ok(path.clone()),
            Err(e) => Err(e.to_string()),
        };
        let _ = tx.send(Some(value));
        self.jobs.remove(key);
    }

    /// Cancel a running job by key. Waiters observe `EncodeFailed`.
    pub fn cancel(&self, key: &str) -> bool {
        match self.jobs.get(key) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    // -- File transcodes ----------------------------------------------------

    /// Transcode into the cached `<media_id>_<label>.mp4` artifact, with a
    /// cache-hit short-circuit. Concurrent callers for the same output all
    /// observe the single job.
    pub async fn transcode_quality(
        &self,
        input: &Path,
        media_id: MediaItemId,
        label: QualityLabel,
    ) -> Result<PathBuf> {
        let profile = profile_for(label)?;
        let output = self.cache.mp4_path(media_id, label);

        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            self.cache.touch(&output);
            return Ok(output);
        }

        let key = output.to_string_lossy().to_string();
        match self.claim(&key) {
            JobRole::Waiter(handle) => Self::await_outcome(handle).await,
            JobRole::Owner(tx, cancel) => {
                self.cache.ensure_root()?;
                self.cache.mark_in_flight(&output);

                let outcome = tokio::select! {
                    r = self.transcode_to_mp4(input, &output, &profile) => r.map(|_| output.clone()),
                    _ = cancel.cancelled() => Err(Error::EncodeFailed("job cancelled".into())),
                };

                if outcome.is_err() {
                    let _ = tokio::fs::remove_file(&output).await;
                }
                self.cache.unmark_in_flight(&output);
                self.finish(&key, &tx, &outcome);
                outcome
            }
        }
    }

    /// One-shot MP4 transcode with fast-start (moov atom at the head).
    pub async fn transcode_to_mp4(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
    ) -> Result<()> {
        let ffmpeg = self.encoders.require_ffmpeg()?;

        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            label = %profile.label,
            "Starting file transcode"
        );

        let mut cmd = ToolCommand::new(ffmpeg.clone());
        cmd.timeout(FILE_JOB_TIMEOUT);
        cmd.args(["-y", "-i"]);
        cmd.arg(input.to_string_lossy());
        cmd.args(["-c:v", "libx264", "-preset", profile.preset]);
        cmd.args(["-b:v", &format!("{}k", profile.video_bitrate_kbps)]);
        cmd.args(["-vf", &format!("scale=-2:{}", profile.height)]);
        cmd.args(["-r", &profile.fps.to_string()]);
        cmd.args(["-c:a", "aac", "-b:a", &format!("{}k", profile.audio_bitrate_kbps)]);
        cmd.args(["-movflags", "+faststart"]);
        cmd.arg(output.to_string_lossy());
        cmd.execute().await?;

        Ok(())
    }

    // -- Realtime streaming -------------------------------------------------

    /// Spawn a realtime fragmented-MP4 encode whose stdout is handed to the
    /// caller for piping into an HTTP response. The returned reader is the
    /// encoder's stdout; cancelling `cancel` (client disconnect) kills the
    /// process and discards the partial output.
    pub fn stream_transcode(
        &self,
        input: &Path,
        profile: &TranscodeProfile,
        cancel: CancellationToken,
    ) -> Result<tokio::process::ChildStdout> {
        let ffmpeg = self.encoders.require_ffmpeg()?;

        let mut cmd = Command::new(ffmpeg);
        cmd.arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-preset", profile.preset])
            .args(["-b:v", &format!("{}k", profile.video_bitrate_kbps)])
            .args(["-vf", &format!("scale=-2:{}", profile.height)])
            .args(["-c:a", "aac", "-b:a", &format!("{}k", profile.audio_bitrate_kbps)])
            .args(["-movflags", "frag_keyframe+empty_moov"])
            .args(["-f", "mp4", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Internal(format!("ffmpeg failed to spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout missing".into()))?;

        tracing::info!(input = %input.display(), label = %profile.label, "Realtime transcode started");

        // Watchdog owns the child: reap it on natural exit, kill it when the
        // client goes away.
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(s) if s.success() => {
                            tracing::debug!("Realtime transcode finished");
                        }
                        Ok(s) => {
                            // Broken pipe on client disconnect lands here too.
                            tracing::debug!(status = %s, "Realtime transcode exited abnormally");
                        }
                        Err(e) => tracing::debug!("Realtime transcode wait error: {e}"),
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    tracing::debug!("Realtime transcode killed on client disconnect");
                }
            }
        });

        Ok(stdout)
    }

    // -- HLS ----------------------------------------------------------------

    /// Generate the HLS variant for `(media, label)` under
    /// `hls_<id>/<label>/`, rebuild the master playlist, and return the
    /// master path. A finished variant short-circuits. Generation and
    /// master rewrites for one media id are serialized so parallel label
    /// jobs cannot race on the shared tree. Not cancelled by client
    /// disconnects.
    pub async fn generate_hls(
        &self,
        input: &Path,
        media_id: MediaItemId,
        label: QualityLabel,
    ) -> Result<PathBuf> {
        let profile = profile_for(label)?;
        let master = self.cache.hls_manifest_path(media_id);
        let variant_dir = self.cache.hls_label_dir(media_id, label);
        let variant_playlist = variant_dir.join("playlist.m3u8");

        if tokio::fs::try_exists(&variant_playlist).await.unwrap_or(false)
            && tokio::fs::try_exists(&master).await.unwrap_or(false)
        {
            self.cache.touch(&variant_playlist);
            self.cache.touch(&master);
            return Ok(master);
        }

        let key = format!("hls:{media_id}:{label}");
        match self.claim(&key) {
            JobRole::Waiter(handle) => Self::await_outcome(handle).await,
            JobRole::Owner(tx, cancel) => {
                let lock = self
                    .hls_locks
                    .entry(media_id)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone();
                let _guard = lock.lock().await;

                let tree = self.cache.hls_dir(media_id);
                self.cache.ensure_root()?;
                self.cache.mark_in_flight(&tree);

                let outcome = tokio::select! {
                    r = self.run_hls_job(input, &variant_dir, &profile) => r,
                    _ = cancel.cancelled() => Err(Error::EncodeFailed("job cancelled".into())),
                };
                let outcome = match outcome {
                    Ok(()) => self.rewrite_master(media_id).map(|_| master.clone()),
                    Err(e) => Err(e),
                };

                if outcome.is_err() {
                    // Only this variant; other labels' trees stay usable.
                    let _ = tokio::fs::remove_dir_all(&variant_dir).await;
                }
                self.cache.unmark_in_flight(&tree);
                self.finish(&key, &tx, &outcome);
                outcome
            }
        }
    }

    /// Rebuild the master playlist from the variant trees present on disk.
    /// Callers must hold the media's HLS lock (or know no job is running).
    pub fn rewrite_master(&self, media_id: MediaItemId) -> Result<()> {
        let root = self.cache.hls_dir(media_id);
        let mut rungs: Vec<(QualityLabel, u32, u32, u32)> = Vec::new();

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Ok(label) = name.to_string_lossy().parse::<QualityLabel>() else {
                continue;
            };
            let Ok(profile) = profile_for(label) else {
                continue;
            };
            if !entry.path().join("playlist.m3u8").exists() {
                continue;
            }
            rungs.push((label, profile.width, profile.height, profile.video_bitrate_kbps));
        }

        if rungs.is_empty() {
            return Err(Error::Internal(format!(
                "no variant playlists under {}",
                root.display()
            )));
        }

        // Highest rung first.
        rungs.sort_by(|a, b| b.2.cmp(&a.2));
        std::fs::write(
            root.join("playlist.m3u8"),
            render_master_playlist(&rungs),
        )?;
        Ok(())
    }

    async fn run_hls_job(
        &self,
        input: &Path,
        dir: &Path,
        profile: &TranscodeProfile,
    ) -> Result<()> {
        let ffmpeg = self.encoders.require_ffmpeg()?;

        tokio::fs::create_dir_all(dir).await?;

        let segment_pattern = dir.join("segment%03d.ts");
        let playlist = dir.join("playlist.m3u8");
        let gop = profile.gop_size(self.segment_duration_secs);

        tracing::info!(
            input = %input.display(),
            dir = %dir.display(),
            label = %profile.label,
            segment_secs = self.segment_duration_secs,
            "Starting HLS generation"
        );

        let mut cmd = ToolCommand::new(ffmpeg.clone());
        cmd.timeout(FILE_JOB_TIMEOUT);
        cmd.args(["-y", "-i"]);
        cmd.arg(input.to_string_lossy());
        cmd.args(["-c:v", "libx264", "-preset", profile.preset]);
        cmd.args(["-b:v", &format!("{}k", profile.video_bitrate_kbps)]);
        cmd.args(["-vf", &format!("scale=-2:{}", profile.height)]);
        cmd.args(["-r", &profile.fps.to_string()]);
        // Constant segment duration: fixed GOP, no scene-cut keyframes.
        cmd.args(["-g", &gop.to_string(), "-sc_threshold", "0"]);
        cmd.args(["-c:a", "aac", "-b:a", &format!("{}k", profile.audio_bitrate_kbps)]);
        cmd.args(["-f", "hls"]);
        cmd.args(["-hls_time", &self.segment_duration_secs.to_string()]);
        cmd.args(["-hls_playlist_type", "vod"]);
        cmd.args(["-hls_list_size", "0"]);
        cmd.args(["-hls_segment_filename", &segment_pattern.to_string_lossy()]);
        cmd.arg(playlist.to_string_lossy());
        cmd.execute().await?;

        Ok(())
    }
}

/// Render an HLS master playlist for adaptive playback across rungs.
pub fn render_master_playlist(
    rungs: &[(QualityLabel, u32, u32, u32)], // (label, width, height, bitrate_kbps)
) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for (label, width, height, bitrate) in rungs {
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}/playlist.m3u8\n",
            bitrate * 1000,
            width,
            height,
            label
        ));
    }
    out
}
