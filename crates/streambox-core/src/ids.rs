//! Typed ID wrappers providing compile-time safety for entity identifiers.
//!
//! Each ID type is a newtype over the SQLite integer rowid, preventing
//! accidental misuse (e.g., passing a `UserId` where a `MediaItemId` is
//! expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generate a newtype ID wrapper over `i64`.
///
/// The macro produces a struct with:
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`,
///   `Serialize`, `Deserialize`
/// - `Display` and `FromStr` delegating to the inner integer
/// - `From<i64>` and `Into<i64>` conversions
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
                Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(i64);

            impl $name {
                /// Wrap a raw database rowid.
                #[must_use]
                pub fn new(raw: i64) -> Self {
                    Self(raw)
                }

                /// Return the inner integer value.
                #[must_use]
                pub fn as_i64(&self) -> i64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = std::num::ParseIntError;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    s.parse::<i64>().map(Self)
                }
            }

            impl From<i64> for $name {
                fn from(raw: i64) -> Self {
                    Self(raw)
                }
            }

            impl From<$name> for i64 {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// Unique identifier for a library media item (movie, show, episode).
    MediaItemId,
    /// Unique identifier for a TV show container.
    TvShowId,
    /// Unique identifier for an episode.
    EpisodeId,
    /// Unique identifier for a media source (local or remote origin).
    SourceId,
    /// Unique identifier for a subtitle file.
    SubtitleId,
    /// Unique identifier for a user.
    UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_from_str() {
        let id = MediaItemId::new(42);
        let s = id.to_string();
        let parsed: MediaItemId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn roundtrip_i64() {
        let id = UserId::from(7);
        let back: i64 = id.into();
        assert_eq!(back, 7);
    }

    #[test]
    fn serde_roundtrip() {
        let id = TvShowId::new(3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "3");
        let back: TvShowId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn invalid_from_str() {
        assert!("not-a-number".parse::<EpisodeId>().is_err());
    }

    #[test]
    fn hash_set_usage() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = SourceId::new(1);
        set.insert(id);
        assert!(set.contains(&id));
    }
}
