//! Metadata enrichment: maps TMDB results onto stored entities.
//!
//! Enrichment is best-effort everywhere it is called from; failures are
//! logged and never abort a scan.

pub mod tmdb;

use std::sync::Arc;

use streambox_core::{Error, MediaItemId, MediaKind, Result, TvShowId};
use streambox_db::pool::DbPool;
use streambox_db::queries;

use tmdb::TmdbClient;

/// Preferred poster/backdrop sizes.
const POSTER_SIZE: &str = "w500";
const BACKDROP_SIZE: &str = "w1280";

/// How many cast members to keep.
const CAST_LIMIT: usize = 5;

pub struct Enricher {
    client: TmdbClient,
    db: DbPool,
}

impl Enricher {
    pub fn new(api_key: String, language: String, db: DbPool) -> Self {
        Self {
            client: TmdbClient::new(api_key, language),
            db,
        }
    }

    /// Build from config when enrichment is enabled and a key is present.
    pub fn from_config(
        config: &streambox_core::config::MetadataConfig,
        db: DbPool,
    ) -> Option<Arc<Self>> {
        if !config.auto_enrich {
            return None;
        }
        let api_key = config.tmdb_api_key.clone()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Arc::new(Self::new(api_key, config.language.clone(), db)))
    }

    fn year_from_date(date: Option<&str>) -> Option<i32> {
        date.and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok())
    }

    fn join_genres(genres: &[tmdb::TmdbGenre]) -> Option<String> {
        if genres.is_empty() {
            return None;
        }
        Some(
            genres
                .iter()
                .map(|g| g.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Enrich a movie or episode media item. Returns `true` when metadata
    /// was fetched and applied, `false` when the provider had no match.
    pub async fn enrich_media(&self, media_id: MediaItemId) -> Result<bool> {
        let (title, year, kind) = {
            let conn = streambox_db::pool::get_conn(&self.db)?;
            let item = queries::media::get_media_item(&conn, media_id)?
                .ok_or_else(|| Error::not_found("media item", media_id))?;
            (item.title, item.year, item.kind)
        };

        // Episodes inherit show-level metadata via their TvShow; only movies
        // are enriched individually.
        if kind != MediaKind::Movie {
            return Ok(false);
        }

        let results = self.client.search_movie(&title, year).await?;
        let Some(first) = results.first() else {
            tracing::debug!(media_id = %media_id, title, "No TMDB match");
            return Ok(false);
        };

        let details = self.client.get_movie(first.id).await?;
        let cast = details
            .credits
            .cast
            .iter()
            .take(CAST_LIMIT)
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let enrichment = queries::media::Enrichment {
            provider_id: Some(details.id.to_string()),
            overview: details.overview.clone(),
            poster_url: details
                .poster_path
                .as_deref()
                .map(|p| TmdbClient::image_url(p, POSTER_SIZE)),
            backdrop_url: details
                .backdrop_path
                .as_deref()
                .map(|p| TmdbClient::image_url(p, BACKDROP_SIZE)),
            rating: details.vote_average,
            genres: Self::join_genres(&details.genres),
            cast_list: (!cast.is_empty()).then_some(cast),
            year: Self::year_from_date(details.release_date.as_deref()),
        };

        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::media::update_enrichment(&conn, media_id, &enrichment)?;
        tracing::debug!(media_id = %media_id, tmdb_id = details.id, "Enriched movie");
        Ok(true)
    }

    /// Enrich a TV show container (and mirror artwork onto its media item).
    pub async fn enrich_show(&self, show_id: TvShowId) -> Result<bool> {
        let (title, media_item_id) = {
            let conn = streambox_db::pool::get_conn(&self.db)?;
            let show = queries::tv::get_show(&conn, show_id)?
                .ok_or_else(|| Error::not_found("tv show", show_id))?;
            (show.title, show.media_item_id)
        };

        let results = self.client.search_tv(&title, None).await?;
        let Some(first) = results.first() else {
            tracing::debug!(show_id = %show_id, title, "No TMDB match");
            return Ok(false);
        };

        let details = self.client.get_tv(first.id).await?;
        let poster = details
            .poster_path
            .as_deref()
            .map(|p| TmdbClient::image_url(p, POSTER_SIZE));
        let backdrop = details
            .backdrop_path
            .as_deref()
            .map(|p| TmdbClient::image_url(p, BACKDROP_SIZE));

        let conn = streambox_db::pool::get_conn(&self.db)?;
        queries::tv::update_show_enrichment(
            &conn,
            show_id,
            &queries::tv::ShowEnrichment {
                provider_id: Some(details.id.to_string()),
                overview: details.overview.clone(),
                first_air_date: details.first_air_date.clone(),
                status: details.status.clone(),
                poster_url: poster.clone(),
                backdrop_url: backdrop.clone(),
                genres: Self::join_genres(&details.genres),
            },
        )?;

        queries::media::update_enrichment(
            &conn,
            media_item_id,
            &queries::media::Enrichment {
                provider_id: Some(details.id.to_string()),
                overview: details.overview,
                poster_url: poster,
                backdrop_url: backdrop,
                rating: details.vote_average,
                genres: Self::join_genres(&details.genres),
                cast_list: None,
                year: Self::year_from_date(details.first_air_date.as_deref()),
            },
        )?;

        tracing::debug!(show_id = %show_id, tmdb_id = details.id, "Enriched show");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_extraction() {
        assert_eq!(Enricher::year_from_date(Some("1999-03-31")), Some(1999));
        assert_eq!(Enricher::year_from_date(Some("bad")), None);
        assert_eq!(Enricher::year_from_date(None), None);
    }

    #[test]
    fn genre_joining() {
        let genres = vec![
            tmdb::TmdbGenre { name: "Action".into() },
            tmdb::TmdbGenre { name: "Sci-Fi".into() },
        ];
        assert_eq!(Enricher::join_genres(&genres).as_deref(), Some("Action, Sci-Fi"));
        assert_eq!(Enricher::join_genres(&[]), None);
    }

    #[test]
    fn from_config_requires_key_and_flag() {
        let db = streambox_db::pool::init_memory_pool().unwrap();
        let mut config = streambox_core::config::MetadataConfig::default();

        config.auto_enrich = true;
        config.tmdb_api_key = None;
        assert!(Enricher::from_config(&config, db.clone()).is_none());

        config.tmdb_api_key = Some("key".into());
        assert!(Enricher::from_config(&config, db.clone()).is_some());

        config.auto_enrich = false;
        assert!(Enricher::from_config(&config, db).is_none());
    }
}
