/// External data providers
///
/// Each external collaborator sits behind a trait so that services can be
/// wired to real HTTP clients in production and to stubs in tests. Providers
/// hold no state besides their HTTP client and credentials.
use chrono::NaiveDate;

use crate::{
    error::AppResult,
    models::{AutocompleteEntry, CandidateMovie, PredictedMovie},
};

pub mod gemini;
pub mod ml_api;
pub mod tmdb;

pub use gemini::GeminiClient;
pub use ml_api::MlApiClient;
pub use tmdb::TmdbProvider;

/// Movie metadata source: popularity feed, search and release dates
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieMetadataProvider: Send + Sync {
    /// One page (1-based) of currently popular movies
    async fn fetch_popular(&self, page: u32, language: &str) -> AppResult<Vec<CandidateMovie>>;

    async fn search_movies(&self, term: &str, language: &str) -> AppResult<Vec<CandidateMovie>>;

    /// Compact search matches for search-as-you-type
    async fn autocomplete(&self, term: &str, language: &str) -> AppResult<Vec<AutocompleteEntry>>;

    /// Earliest home release date of a movie, `None` while it has none
    async fn fetch_release_date(&self, movie_id: i64) -> AppResult<Option<NaiveDate>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Free-text generative model
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<String>;

    fn name(&self) -> &'static str;
}

/// Dedicated prediction service returning structured suggestions
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingPredictor: Send + Sync {
    async fn predict(&self, user_id: i64, count: u32) -> AppResult<Vec<PredictedMovie>>;

    fn name(&self) -> &'static str;
}
