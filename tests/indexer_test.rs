//! End-to-end indexing tests against a real temp directory tree.

mod common;

use std::sync::Arc;

use common::{register_user, TestHarness};
use streambox::indexer::ScanTarget;
use streambox::sources::local::LocalClient;
use streambox_core::SourceKind;
use streambox_db::queries;

/// The §-canonical fixture: one movie, one episode with a sidecar subtitle.
fn build_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let movies = dir.path().join("Movies");
    let show = dir.path().join("tv-shows/Breaking Bad");
    std::fs::create_dir_all(&movies).unwrap();
    std::fs::create_dir_all(&show).unwrap();

    std::fs::write(
        movies.join("The Matrix (1999) 1080p.mp4"),
        vec![0u8; 1024 * 1024],
    )
    .unwrap();
    std::fs::write(
        show.join("Breaking.Bad.S01E02.720p.mkv"),
        vec![0u8; 2 * 1024 * 1024],
    )
    .unwrap();
    std::fs::write(show.join("Breaking.Bad.S01E02.en.srt"), "1\n00:00 --> 00:01\nhi\n")
        .unwrap();

    dir
}

fn scan_target(root: &std::path::Path) -> ScanTarget {
    ScanTarget {
        client: Arc::new(LocalClient::new("/")),
        source_kind: SourceKind::Local,
        source_id: None,
        root: root.to_string_lossy().trim_start_matches('/').to_string(),
    }
}

#[tokio::test]
async fn scan_indexes_movie_episode_and_subtitle() {
    let harness = TestHarness::new();
    let dir = build_fixture();

    let progress = harness
        .ctx
        .indexer
        .scan_blocking(scan_target(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.total_files, 2);
    assert_eq!(progress.scanned_files, 2);
    assert_eq!(progress.added_files, 2);
    assert!(progress.errors.is_empty(), "errors: {:?}", progress.errors);

    let conn = harness.conn();

    // Movie: "The Matrix", 1999, quality from tokens.
    let movies = queries::media::list_movies(&conn).unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].title, "The Matrix");
    assert_eq!(movies[0].year, Some(1999));
    assert_eq!(movies[0].quality.as_deref(), Some("1080p"));
    assert_eq!(movies[0].file_size, 1024 * 1024);

    // Show with one episode (1, 2), empty episode title.
    let shows = queries::tv::list_shows(&conn).unwrap();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0].title, "Breaking Bad");
    assert_eq!(shows[0].season_count, 1);
    assert_eq!(shows[0].episode_count, 1);

    let episodes = queries::tv::list_episodes_for_show(&conn, shows[0].id).unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].season_number, 1);
    assert_eq!(episodes[0].episode_number, 2);
    assert_eq!(episodes[0].title.as_deref(), Some(""));

    // Subtitle: en/English, default, attached to the episode's media item.
    let subtitles = queries::subtitles::list_for_media(&conn, episodes[0].media_item_id).unwrap();
    assert_eq!(subtitles.len(), 1);
    assert_eq!(subtitles[0].language, "en");
    assert_eq!(subtitles[0].label, "English");
    assert!(subtitles[0].is_default);

    // Episode media item carries its size.
    let item = queries::media::get_media_item(&conn, episodes[0].media_item_id)
        .unwrap()
        .unwrap();
    assert_eq!(item.file_size, 2 * 1024 * 1024);
}

#[tokio::test]
async fn second_scan_adds_nothing() {
    let harness = TestHarness::new();
    let dir = build_fixture();

    let first = harness
        .ctx
        .indexer
        .scan_blocking(scan_target(dir.path()))
        .await
        .unwrap();
    assert_eq!(first.added_files, 2);

    let second = harness
        .ctx
        .indexer
        .scan_blocking(scan_target(dir.path()))
        .await
        .unwrap();
    assert_eq!(second.added_files, 0, "rescan must be idempotent");
    assert!(second.errors.is_empty());

    let conn = harness.conn();
    assert_eq!(queries::media::list_movies(&conn).unwrap().len(), 1);
    assert_eq!(queries::tv::list_shows(&conn).unwrap().len(), 1);
}

#[tokio::test]
async fn subtitle_only_directory_adds_nothing() {
    let harness = TestHarness::new();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("orphan.en.srt"), "1\n").unwrap();
    std::fs::write(dir.path().join("readme.txt"), "not media").unwrap();

    let progress = harness
        .ctx
        .indexer
        .scan_blocking(scan_target(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.total_files, 0);
    assert_eq!(progress.added_files, 0);

    let conn = harness.conn();
    let stats = queries::media::library_stats(&conn).unwrap();
    assert_eq!(stats.movie_count + stats.show_count + stats.episode_count, 0);
}

#[tokio::test]
async fn missing_root_records_error_and_completes() {
    let harness = TestHarness::new();

    let target = ScanTarget {
        client: Arc::new(LocalClient::new("/")),
        source_kind: SourceKind::Local,
        source_id: None,
        root: "definitely/not/a/real/path".into(),
    };
    let progress = harness.ctx.indexer.scan_blocking(target).await.unwrap();

    assert_eq!(progress.added_files, 0);
    assert_eq!(progress.errors.len(), 1);
    assert!(!progress.running);
}

/// A client whose directory listing stalls, pinning the scan slot.
struct StallingClient;

#[async_trait::async_trait]
impl streambox::sources::ProtocolClient for StallingClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn capabilities(&self) -> streambox::sources::Capabilities {
        streambox::sources::Capabilities {
            browse: true,
            read: true,
            discover: false,
        }
    }

    async fn connect(&self) -> streambox_core::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn list(
        &self,
        _path: &str,
    ) -> streambox_core::Result<Vec<streambox::sources::RemoteEntry>> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    async fn stat(
        &self,
        path: &str,
    ) -> streambox_core::Result<streambox::sources::RemoteEntry> {
        Err(streambox_core::Error::not_found("file", path))
    }

    async fn open_range(
        &self,
        path: &str,
        _start: u64,
        _end: Option<u64>,
    ) -> streambox_core::Result<streambox::sources::ByteReader> {
        Err(streambox_core::Error::not_found("file", path))
    }

    async fn test_connection(&self) -> (bool, String) {
        (true, "stalling".into())
    }
}

#[tokio::test]
async fn concurrent_scan_is_rejected_with_409() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;

    // Occupy the scan slot with a scan that cannot finish.
    harness
        .ctx
        .indexer
        .try_start(ScanTarget {
            client: Arc::new(StallingClient),
            source_kind: SourceKind::Local,
            source_id: None,
            root: "stalled".into(),
        })
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/library/scan"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "path": "/somewhere/else" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn scan_progress_endpoint_reports_state() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let dir = build_fixture();

    harness
        .ctx
        .indexer
        .scan_blocking(scan_target(dir.path()))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/api/library/scan/progress"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["running"], false);
    assert_eq!(body["addedFiles"], 2);
    assert_eq!(body["totalFiles"], 2);
}
