use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    middleware::AuthUser,
    models::{Movie, NewMovie},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct AddMovieRequest {
    pub title: String,
    /// TMDb id
    pub movie_id: i64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub overview: String,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: u8,
}

/// The caller's unwatched movies
pub async fn list(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<Movie>>> {
    Ok(Json(state.watchlist.list(user.user_id).await?))
}

/// The caller's watched movies
pub async fn history(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<Movie>>> {
    Ok(Json(state.watchlist.history(user.user_id).await?))
}

pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<AddMovieRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    let Json(request) = body?;
    let movie = state
        .watchlist
        .add(NewMovie {
            user_id: user.user_id,
            title: request.title,
            overview: request.overview,
            image: request.image,
            movie_id: request.movie_id,
            release_date: None,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.watchlist.remove(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    body: Result<Json<RateRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(request) = body?;
    state.watchlist.rate(user.user_id, id, request.rating).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_watched(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.watchlist.mark_watched(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_downloaded(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.watchlist.mark_downloaded(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
