//! Media file inspection via ffprobe.
//!
//! Parses ffprobe's JSON output into [`MediaInfo`] and derives the quality
//! label, the allowed transcode ladder, and whether a file can be served
//! directly to browsers.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use streambox_core::types::{ladder_for_height, LadderRung};
use streambox_core::{Error, QualityLabel, Result};

use crate::tools::{Encoders, ToolCommand};

/// Containers browsers can play natively via `<video>`.
const WEB_NATIVE_CONTAINERS: &[&str] = &["mp4", "m4v", "webm", "mov"];

/// Video codecs browsers can decode without transcoding.
const WEB_NATIVE_CODECS: &[&str] = &["h264", "vp8", "vp9"];

/// Maximum height served directly; anything taller gets downscaled.
const MAX_DIRECT_HEIGHT: u32 = 1080;

// ---------------------------------------------------------------------------
// Probe result types
// ---------------------------------------------------------------------------

/// Everything we know about a media file after probing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub size_bytes: u64,
    pub bitrate: Option<u64>,
    /// Normalized container name (e.g. "mp4", "matroska").
    pub container: String,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
    pub quality_label: QualityLabel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub bitrate: Option<u64>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub bitrate: Option<u64>,
}

impl MediaInfo {
    /// The subset of the output ladder this file can be transcoded into.
    pub fn ladder(&self) -> Vec<LadderRung> {
        let height = self.video.as_ref().map_or(0, |v| v.height);
        ladder_for_height(height)
    }

    /// Whether direct byte-range serving is off the table for this file.
    ///
    /// True when the container is not web-native, the video is taller than
    /// 1080p, or the codec is outside the browser-decodable set.
    pub fn needs_transcoding(&self) -> bool {
        if !is_web_native_container(&self.container) {
            return true;
        }
        match &self.video {
            Some(v) => {
                v.height > MAX_DIRECT_HEIGHT
                    || !WEB_NATIVE_CODECS.contains(&v.codec.to_lowercase().as_str())
            }
            None => false,
        }
    }
}

/// Whether a normalized container name is browser-playable.
pub fn is_web_native_container(container: &str) -> bool {
    WEB_NATIVE_CONTAINERS.contains(&container)
}

/// Normalize an ffprobe `format_name` (a comma list like
/// "mov,mp4,m4a,3gp,3g2,mj2") or a file extension into one container name.
pub fn normalize_container(format_name: &str) -> String {
    let lower = format_name.to_lowercase();
    // "matroska" outranks "webm": ffprobe reports "matroska,webm" for both.
    for known in ["mp4", "matroska", "webm", "avi", "mov", "mpegts", "flv"] {
        if lower.split(',').any(|part| part.trim() == known) {
            return known.to_string();
        }
    }
    lower.split(',').next().unwrap_or("").trim().to_string()
}

/// MIME type for a normalized container name.
pub fn container_mime(container: &str) -> &'static str {
    match container {
        "mp4" | "m4v" => "video/mp4",
        "matroska" | "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mpegts" | "ts" => "video/mp2t",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON schema (the subset we read)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Parse an ffprobe frame rate expression like "24000/1001" or "25/1".
fn parse_frame_rate(expr: &str) -> Option<f64> {
    let mut parts = expr.splitn(2, '/');
    let num: f64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some(den) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => Some(num),
    }
}

/// Build [`MediaInfo`] from raw ffprobe JSON.
fn parse_probe_json(json: &str) -> Result<MediaInfo> {
    let raw: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Internal(format!("ffprobe output parse error: {e}")))?;

    let video = raw
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .map(|s| VideoInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s.avg_frame_rate.as_deref().and_then(parse_frame_rate),
            bitrate: s.bit_rate.as_deref().and_then(|b| b.parse().ok()),
            profile: s.profile.clone(),
        });

    let audio = raw
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .map(|s| AudioInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            channels: s.channels,
            bitrate: s.bit_rate.as_deref().and_then(|b| b.parse().ok()),
        });

    let quality_label = QualityLabel::from_height(video.as_ref().map_or(0, |v| v.height));

    Ok(MediaInfo {
        duration_secs: raw.format.duration.as_deref().and_then(|d| d.parse().ok()),
        size_bytes: raw
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        bitrate: raw.format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
        container: normalize_container(&raw.format.format_name),
        video,
        audio,
        quality_label,
    })
}

/// Probe a media file with ffprobe.
pub async fn probe_file(encoders: &Encoders, path: &Path) -> Result<MediaInfo> {
    let ffprobe = encoders.require_ffprobe()?;

    let output = ToolCommand::new(ffprobe.clone())
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path.to_string_lossy())
        .timeout(Duration::from_secs(60))
        .execute()
        .await?;

    let mut info = parse_probe_json(&output.stdout)?;
    if info.size_bytes == 0 {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            info.size_bytes = meta.len();
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JSON: &str = r#"{
        "format": {
            "format_name": "matroska,webm",
            "duration": "5400.120000",
            "size": "2147483648",
            "bit_rate": "3182000"
        },
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "hevc",
                "profile": "Main 10",
                "width": 3840,
                "height": 2160,
                "avg_frame_rate": "24000/1001"
            },
            {
                "codec_type": "audio",
                "codec_name": "aac",
                "sample_rate": "48000",
                "channels": 6,
                "bit_rate": "320000"
            }
        ]
    }"#;

    #[test]
    fn parses_sample_output() {
        let info = parse_probe_json(SAMPLE_JSON).unwrap();
        assert_eq!(info.container, "matroska");
        assert_eq!(info.size_bytes, 2_147_483_648);
        assert!((info.duration_secs.unwrap() - 5400.12).abs() < 1e-6);

        let video = info.video.as_ref().unwrap();
        assert_eq!(video.codec, "hevc");
        assert_eq!(video.height, 2160);
        assert!((video.fps.unwrap() - 23.976).abs() < 0.001);

        let audio = info.audio.as_ref().unwrap();
        assert_eq!(audio.channels, Some(6));
        assert_eq!(audio.sample_rate, Some(48000));

        assert_eq!(info.quality_label, QualityLabel::Q4k);
    }

    #[test]
    fn matroska_needs_transcoding() {
        let info = parse_probe_json(SAMPLE_JSON).unwrap();
        assert!(info.needs_transcoding());
    }

    #[test]
    fn h264_mp4_1080p_is_direct() {
        let json = r#"{
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.0"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
            ]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.container, "mp4");
        assert!(!info.needs_transcoding());
    }

    #[test]
    fn tall_h264_needs_transcoding() {
        let json = r#"{
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 3840, "height": 2160}
            ]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert!(info.needs_transcoding(), "2160p exceeds the direct-play cap");
    }

    #[test]
    fn hevc_in_mp4_needs_transcoding() {
        let json = r#"{
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
            "streams": [
                {"codec_type": "video", "codec_name": "hevc", "width": 1920, "height": 1080}
            ]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert!(info.needs_transcoding());
    }

    #[test]
    fn audio_only_file_is_direct() {
        let json = r#"{
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
            "streams": [{"codec_type": "audio", "codec_name": "aac"}]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert!(!info.needs_transcoding());
        assert_eq!(info.quality_label, QualityLabel::Sd);
    }

    #[test]
    fn ladder_follows_source_height() {
        let info = parse_probe_json(SAMPLE_JSON).unwrap();
        assert_eq!(info.ladder().len(), 5, "4K source gets the whole ladder");
    }

    #[test]
    fn frame_rate_parsing() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("30"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("junk"), None);
    }

    #[test]
    fn container_mime_table() {
        assert_eq!(container_mime("mp4"), "video/mp4");
        assert_eq!(container_mime("matroska"), "video/x-matroska");
        assert_eq!(container_mime("unknown"), "application/octet-stream");
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(parse_probe_json("{").is_err());
    }
}
