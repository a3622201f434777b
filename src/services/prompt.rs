//! Oracle prompts for the generative two-pass flow

use crate::{
    error::{AppError, AppResult},
    models::{CandidateMovie, WatchEntry},
};

/// Upper bound on watchlist and history entries sent to the oracle, each
pub const MAX_CONTEXT_ENTRIES: usize = 250;

/// Keeps the first [`MAX_CONTEXT_ENTRIES`] entries
pub fn bound_entries<'a>(entries: &'a [WatchEntry], list: &str, user_id: i64) -> &'a [WatchEntry] {
    if entries.len() > MAX_CONTEXT_ENTRIES {
        tracing::info!(
            user_id = user_id,
            list = list,
            total = entries.len(),
            kept = MAX_CONTEXT_ENTRIES,
            "Truncating oracle context"
        );
        &entries[..MAX_CONTEXT_ENTRIES]
    } else {
        entries
    }
}

/// First pass: free-text selection over the candidate pool
pub fn selection_prompt(
    watchlist: &[WatchEntry],
    history: &[WatchEntry],
    candidates: &[CandidateMovie],
    count: u32,
) -> AppResult<String> {
    Ok(format!(
        "This is the list of movies in my watchlist:\n{watchlist}\n\n\
         This is the list of movies I have watched, with my rating for each:\n{history}\n\n\
         Ratings go from 1 (worst) to 5 (best). A rating of 0 means I have not rated the movie yet. \
         The movie_id property of my movies is the id of the movie in the list of popular movies below.\n\n\
         These are the currently popular movies:\n{candidates}\n\n\
         Suggest {count} movies from the popular movies that I would like, based on my ratings and my watchlist. \
         Do not suggest any movie that is already in my watchlist or in my watched list. \
         For every suggestion give its title and its id from the popular movies list.",
        watchlist = to_json(watchlist)?,
        history = to_json(history)?,
        candidates = to_json(candidates)?,
        count = count,
    ))
}

/// Second pass: turns the free-text selection into a JSON array
pub fn formatting_prompt(selection: &str) -> String {
    format!(
        "{}\n\nFormat the above list of movies in JSON representation with properties title and id. \
         Return only a JSON array of objects such as [{{\"title\": \"Movie\", \"id\": 123}}], \
         without any other text.",
        selection.trim()
    )
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode oracle context: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(movie_id: i64, rating: u8) -> WatchEntry {
        WatchEntry {
            title: format!("Movie {}", movie_id),
            movie_id,
            rating,
        }
    }

    #[test]
    fn test_selection_prompt_carries_context() {
        let candidates = vec![CandidateMovie {
            id: 11,
            title: "B".to_string(),
            release_date: Some("2024-05-01".to_string()),
            poster_path: Some("/b.jpg".to_string()),
        }];

        let prompt = selection_prompt(&[entry(12, 0)], &[entry(10, 4)], &candidates, 2).unwrap();

        assert!(prompt.contains(r#""movie_id":12"#));
        assert!(prompt.contains(r#"{"title":"Movie 10","movie_id":10,"rating":4}"#));
        assert!(prompt.contains(r#""id":11"#));
        assert!(prompt.contains("Suggest 2 movies"));
        assert!(prompt.contains("1 (worst) to 5 (best)"));
        assert!(prompt.contains("0 means I have not rated"));
        assert!(prompt.contains("Do not suggest any movie that is already in my watchlist"));
    }

    #[test]
    fn test_formatting_prompt_wraps_selection() {
        let prompt = formatting_prompt("  1. B (id 11)\n");

        assert!(prompt.starts_with("1. B (id 11)\n\nFormat the above list"));
        assert!(prompt.contains("properties title and id"));
    }

    #[test]
    fn test_bound_entries_truncates() {
        let entries: Vec<WatchEntry> = (0..300).map(|id| entry(id, 3)).collect();

        let bounded = bound_entries(&entries, "history", 7);
        assert_eq!(bounded.len(), MAX_CONTEXT_ENTRIES);
        assert_eq!(bounded[0].movie_id, 0);

        assert_eq!(bound_entries(&entries[..3], "history", 7).len(), 3);
    }
}
