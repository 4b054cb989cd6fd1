//! TMDB (The Movie Database) API client.
//!
//! Search and detail lookup for movies and TV shows. Rate-limited so bulk
//! enrichment during a scan stays under TMDB's API limits.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use streambox_core::{Error, Result};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct TmdbClient {
    http: reqwest::Client,
    api_key: String,
    language: String,
    limiter: Arc<DirectLimiter>,
}

impl TmdbClient {
    pub fn new(api_key: String, language: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(30).unwrap());
        Self {
            http: reqwest::Client::new(),
            api_key,
            language,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra_params: &[(&str, &str)],
    ) -> Result<T> {
        self.limiter.until_ready().await;

        let url = format!("{BASE_URL}{path}");
        let mut params: Vec<(&str, &str)> =
            vec![("api_key", &self.api_key), ("language", &self.language)];
        params.extend_from_slice(extra_params);

        let resp = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::upstream("tmdb", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::upstream("tmdb", format!("HTTP {status} for {path}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::upstream("tmdb", format!("parse error: {e}")))
    }

    pub async fn search_movie(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<Vec<TmdbSearchResult>> {
        let mut params: Vec<(&str, &str)> = vec![("query", query)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push(("year", y.as_str()));
        }
        let resp: TmdbSearchResponse = self.get("/search/movie", &params).await?;
        Ok(resp.results)
    }

    pub async fn search_tv(&self, query: &str, year: Option<i32>) -> Result<Vec<TmdbSearchResult>> {
        let mut params: Vec<(&str, &str)> = vec![("query", query)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push(("first_air_date_year", y.as_str()));
        }
        let resp: TmdbSearchResponse = self.get("/search/tv", &params).await?;
        Ok(resp.results)
    }

    pub async fn get_movie(&self, id: u64) -> Result<TmdbMovieDetails> {
        self.get(
            &format!("/movie/{id}"),
            &[("append_to_response", "credits")],
        )
        .await
    }

    pub async fn get_tv(&self, id: u64) -> Result<TmdbTvDetails> {
        self.get(&format!("/tv/{id}"), &[]).await
    }

    /// Full image URL for a TMDB image path like "/abc123.jpg".
    pub fn image_url(path: &str, size: &str) -> String {
        format!("{IMAGE_BASE_URL}/{size}{path}")
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse {
    results: Vec<TmdbSearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbSearchResult {
    pub id: u64,
    /// Movie title or TV show name.
    #[serde(alias = "name")]
    pub title: Option<String>,
    #[serde(alias = "first_air_date")]
    pub release_date: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCastMember {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: u64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub credits: TmdbCredits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbTvDetails {
    pub id: u64,
    pub name: String,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub status: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub number_of_seasons: Option<i32>,
    pub number_of_episodes: Option<i32>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_formatting() {
        assert_eq!(
            TmdbClient::image_url("/abc.jpg", "w500"),
            "https://image.tmdb.org/t/p/w500/abc.jpg"
        );
    }

    #[test]
    fn search_result_aliases_tv_fields() {
        // TV search responses use `name`/`first_air_date`.
        let json = r#"{"id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20"}"#;
        let result: TmdbSearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.title.as_deref(), Some("Breaking Bad"));
        assert_eq!(result.release_date.as_deref(), Some("2008-01-20"));
    }

    #[test]
    fn movie_details_tolerate_missing_credits() {
        let json = r#"{"id": 603, "title": "The Matrix", "genres": [{"id": 28, "name": "Action"}]}"#;
        let details: TmdbMovieDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.genres[0].name, "Action");
        assert!(details.credits.cast.is_empty());
    }
}
