//! streambox-core: shared types, errors, and configuration.
//!
//! Everything in this crate is dependency-light so that both the database
//! layer and the server can build on it without cycles.

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::{EpisodeId, MediaItemId, SourceId, SubtitleId, TvShowId, UserId};
pub use types::{MediaKind, QualityLabel, SourceKind, SubtitleFormat};
