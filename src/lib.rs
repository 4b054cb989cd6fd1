//! streambox: self-hosted media streaming server.
//!
//! The library crate wires together the persistence layer
//! (`streambox-db`), shared types (`streambox-core`), and the subsystems:
//!
//! - [`sources`] — protocol clients (local, FTP, SMB, UPnP) and their pool
//! - [`indexer`] — recursive library scans with filename classification
//! - [`metadata`] — TMDB enrichment
//! - [`probe`] — ffprobe-based media inspection and the quality ladder
//! - [`transcode`] — supervised ffmpeg jobs (MP4, realtime fMP4, HLS)
//! - [`cache`] — artifact cache with TTL and size-cap eviction
//! - [`watch`] — per-user playback progress tracking
//! - [`server`] — axum HTTP API tying it all together

pub mod cache;
pub mod indexer;
pub mod metadata;
pub mod probe;
pub mod server;
pub mod sources;
pub mod tools;
pub mod transcode;
pub mod watch;
