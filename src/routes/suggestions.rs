use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::SuggestionResult,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(alias = "numMovies")]
    count: Option<u32>,
}

/// Handler for `GET /api/suggestions?count=N`
pub async fn suggest(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<SuggestionQuery>, QueryRejection>,
) -> AppResult<Json<SuggestionResult>> {
    let Query(params) = query?;
    let max = state.settings.max_suggestion_count;
    let count = params
        .count
        .unwrap_or(state.settings.default_suggestion_count);

    if count == 0 || count > max {
        return Err(AppError::InvalidInput(format!(
            "count must be between 1 and {}, got {}",
            max, count
        )));
    }

    let suggestions = state.suggestions.suggest(user.user_id, count).await?;
    Ok(Json(suggestions))
}
