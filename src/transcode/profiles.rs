//! Fixed transcode profiles, one per quality label.

use streambox_core::types::rung_for_label;
use streambox_core::{Error, QualityLabel, Result};

/// Encoder settings for one output quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub label: QualityLabel,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub fps: u32,
    pub preset: &'static str,
}

/// Look up the profile for a quality label.
///
/// Labels without a ladder rung (SD, 2K) have no profile and cannot be
/// requested as transcode targets.
pub fn profile_for(label: QualityLabel) -> Result<TranscodeProfile> {
    let rung = rung_for_label(label)
        .ok_or_else(|| Error::Validation(format!("'{label}' is not a transcode target")))?;

    let preset = match label {
        QualityLabel::Q4k => "medium",
        QualityLabel::Q1080 | QualityLabel::Q720 => "fast",
        _ => "veryfast",
    };

    Ok(TranscodeProfile {
        label,
        // 16:9 width, forced even for the encoder.
        width: (rung.height * 16 / 9) & !1,
        height: rung.height,
        video_bitrate_kbps: rung.video_bitrate_kbps,
        audio_bitrate_kbps: 128,
        fps: 30,
        preset,
    })
}

impl TranscodeProfile {
    /// GOP length for constant-duration HLS segments: one keyframe per
    /// segment boundary, scene-cut keyframes disabled separately.
    pub fn gop_size(&self, segment_duration_secs: u32) -> u32 {
        segment_duration_secs * self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_have_profiles() {
        for label in [
            QualityLabel::Q4k,
            QualityLabel::Q1080,
            QualityLabel::Q720,
            QualityLabel::Q480,
            QualityLabel::Q360,
        ] {
            let p = profile_for(label).unwrap();
            assert_eq!(p.label, label);
            assert_eq!(p.width % 2, 0);
        }
    }

    #[test]
    fn profile_values_match_ladder() {
        let p = profile_for(QualityLabel::Q720).unwrap();
        assert_eq!(p.height, 720);
        assert_eq!(p.width, 1280);
        assert_eq!(p.video_bitrate_kbps, 2500);
    }

    #[test]
    fn sd_has_no_profile() {
        assert!(profile_for(QualityLabel::Sd).is_err());
        assert!(profile_for(QualityLabel::Q2k).is_err());
    }

    #[test]
    fn gop_matches_segment_duration() {
        let p = profile_for(QualityLabel::Q1080).unwrap();
        assert_eq!(p.gop_size(10), 300);
    }
}
