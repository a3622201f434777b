//! Reconciliation of untrusted oracle output against the candidate pool
//!
//! The oracle only ranks and selects. Every id it returns must belong to the
//! pool fetched in the same aggregation call, and the returned records are
//! always the locally fetched ones.

use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult},
    models::{CandidateMovie, OracleChoice, SuggestedMovie, SuggestionResult},
};

/// Popular movies of one aggregation call, deduplicated by id in feed order
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    movies: Vec<CandidateMovie>,
    index: HashMap<i64, usize>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends movies not seen yet, returning how many were added
    pub fn extend(&mut self, movies: impl IntoIterator<Item = CandidateMovie>) -> usize {
        let mut added = 0;
        for movie in movies {
            if self.index.contains_key(&movie.id) {
                continue;
            }
            self.index.insert(movie.id, self.movies.len());
            self.movies.push(movie);
            added += 1;
        }
        added
    }

    pub fn get(&self, id: i64) -> Option<&CandidateMovie> {
        self.index.get(&id).map(|&position| &self.movies[position])
    }

    pub fn movies(&self) -> &[CandidateMovie] {
        &self.movies
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

impl FromIterator<CandidateMovie> for CandidatePool {
    fn from_iter<I: IntoIterator<Item = CandidateMovie>>(iter: I) -> Self {
        let mut pool = CandidatePool::new();
        pool.extend(iter);
        pool
    }
}

/// Strips surrounding whitespace and a Markdown code fence, if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();

    let opened = ["```json", "```JSON", "```"]
        .iter()
        .find_map(|fence| trimmed.strip_prefix(fence))
        .unwrap_or(trimmed);

    let closed = opened.trim_end();
    closed.strip_suffix("```").unwrap_or(closed).trim()
}

/// Parses the formatted oracle answer into `{id, title}` choices
pub fn parse_choices(text: &str) -> AppResult<Vec<OracleChoice>> {
    let json = strip_code_fence(text);
    serde_json::from_str(json).map_err(|e| {
        tracing::warn!(error = %e, response = %text, "Unparseable oracle response");
        AppError::Validation(format!("unparseable oracle response: {}", e))
    })
}

/// Maps oracle picks onto pool records
///
/// Every id is checked before anything is returned: one unknown id fails the
/// whole call. Repeated ids keep their first position. The result is cut to
/// `count` entries.
pub fn reconcile<I>(picks: I, pool: &CandidatePool, count: u32) -> AppResult<SuggestionResult>
where
    I: IntoIterator<Item = (i64, Option<f32>)>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for (id, predicted_rating) in picks {
        let movie = pool.get(id).ok_or_else(|| {
            AppError::Validation(format!(
                "suggested movie id {} is not among the popular candidates",
                id
            ))
        })?;

        if !seen.insert(id) {
            continue;
        }

        result.push(SuggestedMovie {
            predicted_rating,
            ..SuggestedMovie::from(movie.clone())
        });
    }

    result.truncate(count as usize);
    Ok(result)
}
