//! Filename classification and title cleanup.
//!
//! Episode detection accepts `S01E02` (case-insensitive) and `1x02` forms.
//! Title cleanup strips the extension (done by the caller), release years,
//! and the closed set of quality/source/codec tokens, after normalizing
//! `.`/`_` separators to spaces.

use std::sync::LazyLock;

use regex::Regex;

/// Quality/source/codec tokens removed from titles, lower-case.
const QUALITY_TOKENS: &[&str] = &[
    "720p", "1080p", "2160p", "4k", "bluray", "web-dl", "webdl", "webrip", "hdtv", "x264",
    "x265", "hevc",
];

static EPISODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,2})\s*[._\- ]?\s*E(\d{1,3})\b").unwrap());

static ALT_EPISODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})x(\d{2,3})\b").unwrap());

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[]?\b((?:19|20)\d{2})\b[\)\]]?").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Season/episode numbers extracted from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeNumbers {
    pub season: u32,
    pub episode: u32,
}

/// Replace `.`/`_` separators with spaces.
fn normalize(stem: &str) -> String {
    stem.replace(['.', '_'], " ")
}

/// Find the `SxxEyy` / `NxNN` token in a file stem.
pub fn episode_numbers(stem: &str) -> Option<EpisodeNumbers> {
    let normalized = normalize(stem);
    let caps = EPISODE_RE
        .captures(&normalized)
        .or_else(|| ALT_EPISODE_RE.captures(&normalized))?;
    Some(EpisodeNumbers {
        season: caps[1].parse().ok()?,
        episode: caps[2].parse().ok()?,
    })
}

fn strip_quality_tokens(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| {
            let bare = token
                .trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | '-'))
                .to_lowercase();
            !bare.is_empty() && !QUALITY_TOKENS.contains(&bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse(text: &str) -> String {
    WHITESPACE_RE
        .replace_all(text, " ")
        .trim()
        .trim_matches(|c: char| matches!(c, '-' | '.'))
        .trim()
        .to_string()
}

/// Extract a human movie title and release year from a file stem.
pub fn movie_title(stem: &str) -> (String, Option<i32>) {
    let normalized = normalize(stem);

    // The last plausible year wins ("2012 (2009)" is the 2009 film).
    let year = YEAR_RE
        .captures_iter(&normalized)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .last();

    let without_year = YEAR_RE.replace_all(&normalized, " ");
    let title = collapse(&strip_quality_tokens(&without_year));
    (title, year)
}

/// Episode title: whatever follows the `SxxEyy` token, cleaned the same way
/// as movie titles. Frequently empty.
pub fn episode_title(stem: &str) -> String {
    let normalized = normalize(stem);
    let rest = match EPISODE_RE
        .find(&normalized)
        .or_else(|| ALT_EPISODE_RE.find(&normalized))
    {
        Some(m) => &normalized[m.end()..],
        None => return String::new(),
    };
    let without_year = YEAR_RE.replace_all(rest, " ");
    collapse(&strip_quality_tokens(&without_year))
}

/// Display-quality label derived from filename tokens, when present.
pub fn quality_from_tokens(stem: &str) -> Option<&'static str> {
    let lower = normalize(stem).to_lowercase();
    for token in lower.split_whitespace() {
        match token {
            "2160p" | "4k" => return Some("4K"),
            "1080p" => return Some("1080p"),
            "720p" => return Some("720p"),
            _ => {}
        }
    }
    None
}

/// Show name from a directory name (separator cleanup only; directory names
/// rarely carry release tokens, but strip them when they do).
pub fn show_name(dir_name: &str) -> String {
    collapse(&strip_quality_tokens(&normalize(dir_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_title_with_year_and_quality() {
        let (title, year) = movie_title("The Matrix (1999) 1080p");
        assert_eq!(title, "The Matrix");
        assert_eq!(year, Some(1999));
    }

    #[test]
    fn movie_title_dotted() {
        let (title, year) = movie_title("Blade.Runner.2049.2017.2160p.BluRay.x265");
        assert_eq!(title, "Blade Runner");
        assert_eq!(year, Some(2017));
    }

    #[test]
    fn movie_title_bare() {
        let (title, year) = movie_title("Alien");
        assert_eq!(title, "Alien");
        assert_eq!(year, None);
    }

    #[test]
    fn quality_tokens_are_case_insensitive() {
        let (title, _) = movie_title("Heat WEBRip X264 HDTV");
        assert_eq!(title, "Heat");
    }

    #[test]
    fn bracketed_year() {
        let (title, year) = movie_title("Dune [2021] 2160p");
        assert_eq!(title, "Dune");
        assert_eq!(year, Some(2021));
    }

    #[test]
    fn episode_numbers_sxxexx() {
        let numbers = episode_numbers("Breaking.Bad.S01E02.720p").unwrap();
        assert_eq!(numbers, EpisodeNumbers { season: 1, episode: 2 });
    }

    #[test]
    fn episode_numbers_lowercase() {
        let numbers = episode_numbers("show s03e10").unwrap();
        assert_eq!(numbers, EpisodeNumbers { season: 3, episode: 10 });
    }

    #[test]
    fn episode_numbers_alt_form() {
        let numbers = episode_numbers("The Wire 2x05 HDTV").unwrap();
        assert_eq!(numbers, EpisodeNumbers { season: 2, episode: 5 });
    }

    #[test]
    fn episode_numbers_absent() {
        assert!(episode_numbers("The Matrix (1999)").is_none());
        // A bare year must not read as 20x99.
        assert!(episode_numbers("Movie 1999").is_none());
    }

    #[test]
    fn episode_title_is_cleaned_remainder() {
        assert_eq!(episode_title("Breaking.Bad.S01E02.720p"), "");
        assert_eq!(
            episode_title("Breaking.Bad.S01E01.Pilot.1080p.WEB-DL"),
            "Pilot"
        );
    }

    #[test]
    fn quality_label_from_tokens() {
        assert_eq!(quality_from_tokens("Movie.2160p.x265"), Some("4K"));
        assert_eq!(quality_from_tokens("Movie.4K"), Some("4K"));
        assert_eq!(quality_from_tokens("Movie.1080p"), Some("1080p"));
        assert_eq!(quality_from_tokens("Movie.DVDRip"), None);
    }

    #[test]
    fn show_name_cleanup() {
        assert_eq!(show_name("Breaking Bad"), "Breaking Bad");
        assert_eq!(show_name("The.Expanse.1080p"), "The Expanse");
    }
}
