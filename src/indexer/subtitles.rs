//! Sidecar subtitle discovery.
//!
//! A sidecar belongs to a video when its stem starts with the video's stem
//! and its extension is a subtitle format. The stem suffix carries a
//! BCP-47-ish language tag ("Movie.en.srt" → `en`); bare sidecars
//! ("Movie.srt") default to English.

use streambox_core::SubtitleFormat;

/// Known language tags and their display labels.
const LANGUAGE_LABELS: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
    ("nl", "Dutch"),
    ("sv", "Swedish"),
    ("no", "Norwegian"),
    ("da", "Danish"),
    ("fi", "Finnish"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("he", "Hebrew"),
    ("cs", "Czech"),
    ("el", "Greek"),
    ("hu", "Hungarian"),
    ("th", "Thai"),
    ("vi", "Vietnamese"),
    ("id", "Indonesian"),
    ("uk", "Ukrainian"),
    ("ro", "Romanian"),
];

/// A sidecar matched to a video file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarSubtitle {
    pub language: String,
    pub label: String,
    pub format: SubtitleFormat,
}

/// Human label for a language tag: known tags map to names, unknown tags
/// echo upper-cased.
pub fn language_label(tag: &str) -> String {
    LANGUAGE_LABELS
        .iter()
        .find(|(code, _)| *code == tag)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| tag.to_uppercase())
}

fn split_stem_ext(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (file_name, ""),
    }
}

/// Split a subtitle stem into its base name and language tag, if the last
/// dot-separated component looks like one (2-3 letters).
fn split_language_tag(stem: &str) -> (&str, Option<String>) {
    // Tolerate trailing variant markers like ".forced".
    let stem = stem.strip_suffix(".forced").unwrap_or(stem);

    if let Some((base, last)) = stem.rsplit_once('.') {
        if (2..=3).contains(&last.len()) && last.chars().all(|c| c.is_ascii_alphabetic()) {
            return (base, Some(last.to_lowercase()));
        }
    }
    (stem, None)
}

/// One stem extends the other at a separator boundary, or they are equal.
fn stems_match(video: &str, base: &str) -> bool {
    const SEPARATORS: [char; 4] = ['.', '-', '_', ' '];
    if video == base {
        return true;
    }
    if let Some(rest) = base.strip_prefix(video) {
        return rest.starts_with(SEPARATORS);
    }
    if let Some(rest) = video.strip_prefix(base) {
        return rest.starts_with(SEPARATORS);
    }
    false
}

/// Check whether `file_name` is a subtitle sidecar for a video with the
/// given stem, and extract its language.
///
/// The release-token tails differ between video and sidecar in the wild
/// ("Show.S01E02.720p.mkv" next to "Show.S01E02.en.srt"), so the stems
/// match when either one extends the other at a separator after the
/// language tag is stripped.
pub fn match_sidecar(video_stem: &str, file_name: &str) -> Option<SidecarSubtitle> {
    let (stem, ext) = split_stem_ext(file_name);
    let format = SubtitleFormat::from_extension(ext)?;

    let (base, tag) = split_language_tag(stem);
    if !stems_match(video_stem, base) {
        return None;
    }

    let language = tag.unwrap_or_else(|| "en".to_string());
    let label = language_label(&language);

    Some(SidecarSubtitle {
        language,
        label,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_language_suffix() {
        let sub = match_sidecar("Breaking.Bad.S01E02.720p", "Breaking.Bad.S01E02.720p.en.srt")
            .unwrap();
        assert_eq!(sub.language, "en");
        assert_eq!(sub.label, "English");
        assert_eq!(sub.format, SubtitleFormat::Srt);
    }

    #[test]
    fn matches_sidecar_without_release_tokens() {
        // Sidecars usually drop the quality tail the video carries.
        let sub =
            match_sidecar("Breaking.Bad.S01E02.720p", "Breaking.Bad.S01E02.en.srt").unwrap();
        assert_eq!(sub.language, "en");
        assert_eq!(sub.label, "English");
    }

    #[test]
    fn similar_but_distinct_stem_is_rejected() {
        // "Movie2" must not attach to "Movie": no separator at the boundary.
        assert!(match_sidecar("Movie", "Movie2.srt").is_none());
        assert!(match_sidecar("Movie", "Mov.en.srt").is_none());
    }

    #[test]
    fn bare_sidecar_defaults_to_english() {
        let sub = match_sidecar("Movie", "Movie.srt").unwrap();
        assert_eq!(sub.language, "en");
        assert_eq!(sub.label, "English");
    }

    #[test]
    fn unknown_tag_is_uppercased() {
        let sub = match_sidecar("Movie", "Movie.xx.vtt").unwrap();
        assert_eq!(sub.language, "xx");
        assert_eq!(sub.label, "XX");
    }

    #[test]
    fn three_letter_tag() {
        let sub = match_sidecar("Movie", "Movie.ger.ass").unwrap();
        assert_eq!(sub.language, "ger");
        assert_eq!(sub.format, SubtitleFormat::Ass);
    }

    #[test]
    fn wrong_stem_is_rejected() {
        assert!(match_sidecar("Movie", "Other.en.srt").is_none());
    }

    #[test]
    fn non_subtitle_extension_is_rejected() {
        assert!(match_sidecar("Movie", "Movie.en.txt").is_none());
        assert!(match_sidecar("Movie", "Movie.nfo").is_none());
    }

    #[test]
    fn forced_variant_keeps_language() {
        let sub = match_sidecar("Movie", "Movie.en.forced.srt").unwrap();
        assert_eq!(sub.language, "en");
    }
}
