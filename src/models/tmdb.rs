use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use super::{AutocompleteEntry, CandidateMovie};

/// Base URL of 92px-wide poster thumbnails
pub const POSTER_THUMBNAIL_URL: &str = "https://image.tmdb.org/t/p/w92";

// ============================================================================
// TMDb v3 API Types
// ============================================================================

/// Paginated movie list returned by `/movie/popular` and `/search/movie`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovieList {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
    #[serde(default)]
    pub total_pages: u32,
}

/// Movie summary as TMDb returns it; most fields are dropped on projection
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<TmdbMovie> for CandidateMovie {
    fn from(movie: TmdbMovie) -> Self {
        CandidateMovie {
            id: movie.id,
            title: movie.title,
            // TMDb sends "" for unknown dates
            release_date: non_empty(movie.release_date),
            poster_path: non_empty(movie.poster_path),
        }
    }
}

impl From<TmdbMovie> for AutocompleteEntry {
    fn from(movie: TmdbMovie) -> Self {
        let poster_url = non_empty(movie.poster_path)
            .map(|path| format!("{}{}", POSTER_THUMBNAIL_URL, path))
            .unwrap_or_default();

        AutocompleteEntry(
            non_empty(movie.original_title).unwrap_or(movie.title),
            movie.release_date.unwrap_or_default(),
            poster_url,
        )
    }
}

/// Response of `/movie/{id}/release_dates`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbReleaseDates {
    pub id: i64,
    #[serde(default)]
    pub results: Vec<TmdbCountryReleases>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCountryReleases {
    pub iso_3166_1: String,
    #[serde(default)]
    pub release_dates: Vec<TmdbRelease>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbRelease {
    pub release_date: String,
    #[serde(rename = "type")]
    pub release_type: u8,
}

/// Release types 4 (digital), 5 (physical) and 6 (TV) make a movie watchable at home
const FIRST_HOME_RELEASE_TYPE: u8 = 4;

impl TmdbReleaseDates {
    /// Earliest home release across all countries
    ///
    /// Unparseable dates are logged and skipped.
    pub fn earliest_home_release(&self) -> Option<NaiveDate> {
        self.results
            .iter()
            .flat_map(|country| country.release_dates.iter())
            .filter(|release| release.release_type >= FIRST_HOME_RELEASE_TYPE)
            .filter_map(|release| match DateTime::parse_from_rfc3339(&release.release_date) {
                Ok(date) => Some(date.date_naive()),
                Err(e) => {
                    tracing::warn!(
                        movie_id = self.id,
                        release_date = %release.release_date,
                        error = %e,
                        "Skipping unparseable release date"
                    );
                    None
                }
            })
            .min()
    }
}
