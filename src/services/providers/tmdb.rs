/// TMDb (The Movie Database) v3 provider
///
/// API Flow:
/// 1. Popularity feed: /3/movie/popular?page=N → paginated movie summaries
/// 2. Search: /3/search/movie?query=... → same summary shape, also used for
///    autocomplete
/// 3. Release dates: /3/movie/{id}/release_dates → per-country release list
///
/// Summaries are projected to [`CandidateMovie`] or [`AutocompleteEntry`]
/// right after decoding, so no other TMDb field leaves this module.
use crate::{
    error::{AppError, AppResult},
    models::{
        tmdb::{TmdbMovieList, TmdbReleaseDates},
        AutocompleteEntry, CandidateMovie,
    },
    services::providers::MovieMetadataProvider,
};
use chrono::NaiveDate;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl TmdbProvider {
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let url = format!("{}/3{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                path = %path,
                status = %status,
                body = %body,
                "TMDb request failed"
            );
            return Err(AppError::ExternalApi(format!(
                "TMDb returned status {}: {}",
                status, body
            )));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                path = %path,
                "Failed to deserialize TMDb response"
            );
            AppError::ExternalApi(format!("Failed to parse TMDb response: {}", e))
        })
    }

    /// First result page of `/search/movie`, adult titles excluded
    async fn search(&self, term: &str, language: &str) -> AppResult<TmdbMovieList> {
        if term.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search term cannot be empty".to_string(),
            ));
        }

        let list: TmdbMovieList = self
            .get_json(
                "/search/movie",
                &[
                    ("query", term),
                    ("language", language),
                    ("page", "1"),
                    ("include_adult", "false"),
                ],
            )
            .await?;

        tracing::info!(
            term = %term,
            results = list.results.len(),
            provider = "tmdb",
            "Movie search completed"
        );

        Ok(list)
    }
}

#[async_trait::async_trait]
impl MovieMetadataProvider for TmdbProvider {
    async fn fetch_popular(&self, page: u32, language: &str) -> AppResult<Vec<CandidateMovie>> {
        let page_param = page.to_string();
        let list: TmdbMovieList = self
            .get_json(
                "/movie/popular",
                &[("language", language), ("page", page_param.as_str())],
            )
            .await?;

        tracing::debug!(
            page = page,
            results = list.results.len(),
            total_pages = list.total_pages,
            provider = "tmdb",
            "Popular movies fetched"
        );

        Ok(list.results.into_iter().map(CandidateMovie::from).collect())
    }

    async fn search_movies(&self, term: &str, language: &str) -> AppResult<Vec<CandidateMovie>> {
        let list = self.search(term, language).await?;
        Ok(list.results.into_iter().map(CandidateMovie::from).collect())
    }

    async fn autocomplete(&self, term: &str, language: &str) -> AppResult<Vec<AutocompleteEntry>> {
        let list = self.search(term, language).await?;
        Ok(list.results.into_iter().map(AutocompleteEntry::from).collect())
    }

    async fn fetch_release_date(&self, movie_id: i64) -> AppResult<Option<NaiveDate>> {
        let dates: TmdbReleaseDates = self
            .get_json(&format!("/movie/{}/release_dates", movie_id), &[])
            .await?;

        let release_date = dates.earliest_home_release();
        tracing::debug!(
            movie_id = movie_id,
            release_date = ?release_date,
            provider = "tmdb",
            "Release date resolved"
        );

        Ok(release_date)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
