//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, auth, library, metadata, transcoding, and the
//! artifact cache. Every section defaults sensibly so a completely empty `{}`
//! file is valid. Environment variables (`STREAMBOX_*`) override file values
//! so container deployments need no config file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    pub metadata: MetadataConfig,
    pub transcode: TranscodeConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist, then apply `STREAMBOX_*`
    /// environment overrides.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let mut config = match path {
            None => Self::default(),
            Some(path) => match std::fs::read_to_string(path) {
                Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file {}: {e}", path.display());
                    Self::default()
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!("No config file at {}; using defaults", path.display());
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!("Failed to read config file {}: {e}", path.display());
                    Self::default()
                }
            },
        };
        config.apply_env();
        config
    }

    /// Apply environment-variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(port) = env_parse::<u16>("STREAMBOX_PORT") {
            self.server.port = port;
        }
        if let Ok(host) = std::env::var("STREAMBOX_HOST") {
            self.server.host = host;
        }
        if let Ok(secret) = std::env::var("STREAMBOX_SECRET") {
            self.auth.secret = secret;
        }
        if let Some(days) = env_parse::<u64>("STREAMBOX_TOKEN_EXPIRY_DAYS") {
            self.auth.token_expiry_days = days;
        }
        if let Ok(path) = std::env::var("STREAMBOX_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(root) = std::env::var("STREAMBOX_CACHE_DIR") {
            self.cache.root = PathBuf::from(root);
        }
        if let Some(bytes) = env_parse::<u64>("STREAMBOX_CACHE_MAX_BYTES") {
            self.cache.max_bytes = bytes;
        }
        if let Some(secs) = env_parse::<u64>("STREAMBOX_CACHE_TTL_SECS") {
            self.cache.ttl_secs = secs;
        }
        if let Ok(exts) = std::env::var("STREAMBOX_VIDEO_EXTENSIONS") {
            self.library.video_extensions = exts
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Ok(key) = std::env::var("STREAMBOX_TMDB_API_KEY") {
            self.metadata.tmdb_api_key = Some(key);
        }
        if let Ok(lang) = std::env::var("STREAMBOX_TMDB_LANGUAGE") {
            self.metadata.language = lang;
        }
        if let Some(auto) = env_parse::<bool>("STREAMBOX_AUTO_ENRICH") {
            self.metadata.auto_enrich = auto;
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }
        if self.auth.secret.is_empty() {
            warnings.push(
                "auth.secret is empty; tokens will not survive a restart \
                 (set STREAMBOX_SECRET)"
                    .into(),
            );
        }
        if self.library.video_extensions.is_empty() {
            warnings.push("library.video_extensions is empty; scans will find nothing".into());
        }
        if self.cache.max_bytes == 0 {
            warnings.push("cache.max_bytes is 0; every artifact will be evicted".into());
        }
        if self.metadata.auto_enrich && self.metadata.tmdb_api_key.is_none() {
            warnings.push("metadata.auto_enrich is on but no tmdb_api_key is set".into());
        }

        warnings
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8200,
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Server secret for token signing and credential encryption.
    pub secret: String,
    /// Bearer token lifetime in days.
    pub token_expiry_days: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_expiry_days: 7,
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("streambox.db"),
        }
    }
}

/// Library indexing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Lower-case file extensions considered video files during a scan.
    pub video_extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            video_extensions: ["mp4", "mkv", "avi", "m4v", "webm", "mov", "ts", "wmv", "flv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// External metadata provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub tmdb_api_key: Option<String>,
    pub language: String,
    /// Fetch metadata automatically for newly indexed items.
    pub auto_enrich: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            language: "en-US".into(),
            auto_enrich: true,
        }
    }
}

/// Transcoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Explicit ffmpeg path; falls back to `PATH` lookup.
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe path; falls back to `PATH` lookup.
    pub ffprobe_path: Option<PathBuf>,
    /// HLS segment duration in seconds.
    pub segment_duration_secs: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            segment_duration_secs: 10,
        }
    }
}

/// Artifact cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for transcoded MP4s and HLS trees.
    pub root: PathBuf,
    /// Size cap in bytes (default 10 GiB).
    pub max_bytes: u64,
    /// Maximum artifact age in seconds (default 7 days).
    pub ttl_secs: u64,
    /// Interval between maintenance passes in seconds (default 6 hours).
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("cache"),
            max_bytes: 10 * 1024 * 1024 * 1024,
            ttl_secs: 7 * 24 * 3600,
            sweep_interval_secs: 6 * 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_valid() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.server.port, 8200);
        assert_eq!(config.auth.token_expiry_days, 7);
        assert_eq!(config.cache.max_bytes, 10 * 1024 * 1024 * 1024);
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let config = Config::from_json(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn default_extensions_include_mkv() {
        let config = Config::default();
        assert!(config.library.video_extensions.contains(&"mkv".to_string()));
    }

    #[test]
    fn validate_warns_on_empty_secret() {
        let config = Config::default();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("auth.secret")));
    }

    #[test]
    fn validate_warns_on_enrich_without_key() {
        let mut config = Config::default();
        config.auth.secret = "s".into();
        config.metadata.auto_enrich = true;
        config.metadata.tmdb_api_key = None;
        assert!(config
            .validate()
            .iter()
            .any(|w| w.contains("tmdb_api_key")));
    }
}
