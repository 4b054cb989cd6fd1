//! Shared domain enums and the transcode quality ladder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// What a library media item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    TvShow,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::TvShow => "tv_show",
            MediaKind::Episode => "episode",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "tv_show" => Ok(MediaKind::TvShow),
            "episode" => Ok(MediaKind::Episode),
            other => Err(Error::Validation(format!("unknown media kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Protocol family of a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Ftp,
    Smb,
    Upnp,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::Ftp => "ftp",
            SourceKind::Smb => "smb",
            SourceKind::Upnp => "upnp",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(SourceKind::Local),
            "ftp" => Ok(SourceKind::Ftp),
            "smb" => Ok(SourceKind::Smb),
            "upnp" => Ok(SourceKind::Upnp),
            other => Err(Error::Validation(format!("unknown source kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityLabel
// ---------------------------------------------------------------------------

/// Output quality rung, derived from the source height and used as the
/// transcode profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityLabel {
    #[serde(rename = "SD")]
    Sd,
    #[serde(rename = "360p")]
    Q360,
    #[serde(rename = "480p")]
    Q480,
    #[serde(rename = "720p")]
    Q720,
    #[serde(rename = "1080p")]
    Q1080,
    #[serde(rename = "2K")]
    Q2k,
    #[serde(rename = "4K")]
    Q4k,
}

impl QualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Sd => "SD",
            QualityLabel::Q360 => "360p",
            QualityLabel::Q480 => "480p",
            QualityLabel::Q720 => "720p",
            QualityLabel::Q1080 => "1080p",
            QualityLabel::Q2k => "2K",
            QualityLabel::Q4k => "4K",
        }
    }

    /// Classify a source video height into its display label.
    pub fn from_height(height: u32) -> Self {
        match height {
            h if h >= 2160 => QualityLabel::Q4k,
            h if h >= 1440 => QualityLabel::Q2k,
            h if h >= 1080 => QualityLabel::Q1080,
            h if h >= 720 => QualityLabel::Q720,
            h if h >= 480 => QualityLabel::Q480,
            h if h >= 360 => QualityLabel::Q360,
            _ => QualityLabel::Sd,
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SD" | "sd" => Ok(QualityLabel::Sd),
            "360p" => Ok(QualityLabel::Q360),
            "480p" => Ok(QualityLabel::Q480),
            "720p" => Ok(QualityLabel::Q720),
            "1080p" => Ok(QualityLabel::Q1080),
            "2K" | "2k" | "1440p" => Ok(QualityLabel::Q2k),
            "4K" | "4k" | "2160p" => Ok(QualityLabel::Q4k),
            other => Err(Error::Validation(format!("unknown quality '{other}'"))),
        }
    }
}

/// One rung of the transcode output ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LadderRung {
    pub label: QualityLabel,
    /// Output frame height in pixels.
    pub height: u32,
    /// Target video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,
}

/// The fixed output ladder, highest rung first.
pub const LADDER: &[LadderRung] = &[
    LadderRung {
        label: QualityLabel::Q4k,
        height: 2160,
        video_bitrate_kbps: 8000,
    },
    LadderRung {
        label: QualityLabel::Q1080,
        height: 1080,
        video_bitrate_kbps: 5000,
    },
    LadderRung {
        label: QualityLabel::Q720,
        height: 720,
        video_bitrate_kbps: 2500,
    },
    LadderRung {
        label: QualityLabel::Q480,
        height: 480,
        video_bitrate_kbps: 1000,
    },
    LadderRung {
        label: QualityLabel::Q360,
        height: 360,
        video_bitrate_kbps: 600,
    },
];

/// Rungs a source of the given height can be transcoded into (its ladder).
pub fn ladder_for_height(source_height: u32) -> Vec<LadderRung> {
    LADDER
        .iter()
        .filter(|rung| rung.height <= source_height)
        .copied()
        .collect()
}

/// Look up the ladder rung for a label, if the label has one.
pub fn rung_for_label(label: QualityLabel) -> Option<LadderRung> {
    LADDER.iter().find(|r| r.label == label).copied()
}

// ---------------------------------------------------------------------------
// SubtitleFormat
// ---------------------------------------------------------------------------

/// Subtitle file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Ass,
}

impl SubtitleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Vtt => "vtt",
            SubtitleFormat::Ass => "ass",
        }
    }

    /// MIME type used when serving the subtitle file.
    pub fn mime(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "application/x-subrip",
            SubtitleFormat::Vtt => "text/vtt",
            SubtitleFormat::Ass => "text/x-ssa",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "srt" => Some(SubtitleFormat::Srt),
            "vtt" => Some(SubtitleFormat::Vtt),
            "ass" => Some(SubtitleFormat::Ass),
            _ => None,
        }
    }
}

impl fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtitleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| Error::Validation(format!("unknown subtitle format '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_roundtrip() {
        for kind in [MediaKind::Movie, MediaKind::TvShow, MediaKind::Episode] {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
    }

    #[test]
    fn quality_from_height_thresholds() {
        assert_eq!(QualityLabel::from_height(2160), QualityLabel::Q4k);
        assert_eq!(QualityLabel::from_height(1440), QualityLabel::Q2k);
        assert_eq!(QualityLabel::from_height(1080), QualityLabel::Q1080);
        assert_eq!(QualityLabel::from_height(720), QualityLabel::Q720);
        assert_eq!(QualityLabel::from_height(480), QualityLabel::Q480);
        assert_eq!(QualityLabel::from_height(360), QualityLabel::Q360);
        assert_eq!(QualityLabel::from_height(240), QualityLabel::Sd);
    }

    #[test]
    fn ladder_subset_by_height() {
        let rungs = ladder_for_height(1080);
        let labels: Vec<_> = rungs.iter().map(|r| r.label).collect();
        assert_eq!(
            labels,
            vec![
                QualityLabel::Q1080,
                QualityLabel::Q720,
                QualityLabel::Q480,
                QualityLabel::Q360,
            ]
        );
    }

    #[test]
    fn ladder_for_4k_source_has_all_rungs() {
        assert_eq!(ladder_for_height(2160).len(), LADDER.len());
    }

    #[test]
    fn ladder_for_tiny_source_is_empty() {
        assert!(ladder_for_height(240).is_empty());
    }

    #[test]
    fn quality_parse_aliases() {
        assert_eq!("4k".parse::<QualityLabel>().unwrap(), QualityLabel::Q4k);
        assert_eq!("2160p".parse::<QualityLabel>().unwrap(), QualityLabel::Q4k);
        assert!("8K".parse::<QualityLabel>().is_err());
    }

    #[test]
    fn subtitle_mime() {
        assert_eq!(SubtitleFormat::Vtt.mime(), "text/vtt");
        assert_eq!(SubtitleFormat::from_extension("SRT"), Some(SubtitleFormat::Srt));
        assert_eq!(SubtitleFormat::from_extension("sub"), None);
    }
}
