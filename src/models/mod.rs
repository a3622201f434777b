use serde::{Deserialize, Serialize};

pub mod gemini;
pub mod movie;
pub mod tmdb;
pub mod user;

pub use movie::{Movie, NewMovie};
pub use user::User;

/// One entry of the popularity feed, projected to its public fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateMovie {
    pub id: i64,
    pub title: String,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
}

/// Search-as-you-type match, serialized as `[title, release_date, poster_url]`
///
/// Missing values are empty strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutocompleteEntry(pub String, pub String, pub String);

/// A suggestion returned to the client and stored in the cache
///
/// Always built from the locally fetched [`CandidateMovie`], never from
/// fields the oracle echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedMovie {
    pub id: i64,
    pub title: String,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_rating: Option<f32>,
}

impl From<CandidateMovie> for SuggestedMovie {
    fn from(movie: CandidateMovie) -> Self {
        Self {
            id: movie.id,
            title: movie.title,
            release_date: movie.release_date,
            poster_path: movie.poster_path,
            predicted_rating: None,
        }
    }
}

/// Ordered suggestions for one `(user, count)` request
pub type SuggestionResult = Vec<SuggestedMovie>;

/// Read-only projection of a watchlist or history row sent to the oracle
///
/// `rating` is 0 for "not rated yet", otherwise 1 (worst) to 5 (best).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchEntry {
    pub title: String,
    pub movie_id: i64,
    pub rating: u8,
}

impl From<&Movie> for WatchEntry {
    fn from(movie: &Movie) -> Self {
        Self {
            title: movie.title.clone(),
            movie_id: movie.movie_id,
            rating: movie.rating.clamp(0, 5) as u8,
        }
    }
}

/// One `{title, id}` pair picked by the oracle. The title is never trusted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OracleChoice {
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Accepts `11` as well as `"11"`; generative models quote ids now and then
fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(id) => Ok(id),
        Id::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid movie id '{}'", text))),
    }
}

/// Structured suggestion returned by a prediction service
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PredictedMovie {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub predicted_rating: Option<f32>,
}
