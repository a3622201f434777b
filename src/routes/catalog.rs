use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    db::CacheKey,
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{AutocompleteEntry, CandidateMovie},
};

use super::AppState;

const POPULAR_PAGE_TTL: Duration = Duration::from_secs(3600);
/// TMDb serves at most 500 pages
const MAX_POPULAR_PAGE: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    #[serde(default = "first_page")]
    page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub term: String,
}

/// One page of the popularity feed, shared by all users
pub async fn popular(
    State(state): State<AppState>,
    query: Result<Query<PopularQuery>, QueryRejection>,
) -> AppResult<Json<Vec<CandidateMovie>>> {
    let Query(params) = query?;
    if !(1..=MAX_POPULAR_PAGE).contains(&params.page) {
        return Err(AppError::InvalidInput(format!(
            "page must be between 1 and {}",
            MAX_POPULAR_PAGE
        )));
    }

    Ok(Json(popular_page(&state, params.page).await?))
}

async fn popular_page(state: &AppState, page: u32) -> AppResult<Vec<CandidateMovie>> {
    let language = state.settings.language.as_str();
    crate::cached!(
        state.cache,
        CacheKey::PopularPage {
            language: language.to_string(),
            page,
        },
        POPULAR_PAGE_TTL,
        state.metadata.fetch_popular(page, language)
    )
}

pub async fn search(
    State(state): State<AppState>,
    _user: AuthUser,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> AppResult<Json<Vec<CandidateMovie>>> {
    let Json(request) = body?;
    let movies = state
        .metadata
        .search_movies(&request.term, &state.settings.language)
        .await?;
    Ok(Json(movies))
}

/// Search-as-you-type: `[title, release_date, poster_url]` per match
pub async fn autocomplete(
    State(state): State<AppState>,
    _user: AuthUser,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> AppResult<Json<Vec<AutocompleteEntry>>> {
    let Json(request) = body?;
    let entries = state
        .metadata
        .autocomplete(&request.term, &state.settings.language)
        .await?;
    Ok(Json(entries))
}

/// Resolves the caller's missing release dates right away
pub async fn update_release_dates(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<StatusCode> {
    state.sweeper.refresh_release_dates(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
