use std::sync::Arc;

use crate::{
    db::WatchlistRepository,
    error::{AppError, AppResult},
    models::{Movie, NewMovie},
    services::{invalidation::CacheInvalidator, providers::MovieMetadataProvider},
};

/// Watchlist CRUD for one authenticated user at a time
///
/// Every mutation that changes the oracle context (add, remove, rate, watched)
/// invalidates the user's cached suggestions before returning.
#[derive(Clone)]
pub struct WatchlistService {
    repository: Arc<dyn WatchlistRepository>,
    metadata: Arc<dyn MovieMetadataProvider>,
    invalidator: CacheInvalidator,
}

impl WatchlistService {
    pub fn new(
        repository: Arc<dyn WatchlistRepository>,
        metadata: Arc<dyn MovieMetadataProvider>,
        invalidator: CacheInvalidator,
    ) -> Self {
        Self {
            repository,
            metadata,
            invalidator,
        }
    }

    pub async fn list(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        self.repository.get_watchlist(user_id).await
    }

    pub async fn history(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        self.repository.get_watch_history(user_id).await
    }

    /// Saves a movie, resolving its release date when the provider knows it
    pub async fn add(&self, mut movie: NewMovie) -> AppResult<Movie> {
        if movie.title.trim().is_empty() {
            return Err(AppError::InvalidInput("Title cannot be empty".to_string()));
        }

        if movie.release_date.is_none() {
            match self.metadata.fetch_release_date(movie.movie_id).await {
                Ok(date) => movie.release_date = date,
                Err(e) => tracing::warn!(
                    movie_id = movie.movie_id,
                    error = %e,
                    "Release date lookup failed, saving without date"
                ),
            }
        }

        let saved = self.repository.insert_movie(movie).await?;
        tracing::info!(user_id = saved.user_id, id = saved.id, movie_id = saved.movie_id, "Movie added");

        self.invalidate(saved.user_id).await;
        Ok(saved)
    }

    pub async fn remove(&self, user_id: i64, id: i64) -> AppResult<()> {
        self.owned_movie(user_id, id).await?;
        self.repository.delete_movie(id).await?;
        tracing::info!(user_id = user_id, id = id, "Movie removed");

        self.invalidate(user_id).await;
        Ok(())
    }

    /// Rates a movie from 1 (worst) to 5 (best)
    pub async fn rate(&self, user_id: i64, id: i64, rating: u8) -> AppResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::InvalidInput(format!(
                "Rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let mut movie = self.owned_movie(user_id, id).await?;
        movie.rating = i16::from(rating);
        self.repository.update_movie(&movie).await?;
        tracing::info!(user_id = user_id, id = id, rating = rating, "Movie rated");

        self.invalidate(user_id).await;
        Ok(())
    }

    /// Moves a movie from the watchlist to the watch history
    pub async fn mark_watched(&self, user_id: i64, id: i64) -> AppResult<()> {
        let mut movie = self.owned_movie(user_id, id).await?;
        if movie.watched {
            return Ok(());
        }

        movie.watched = true;
        self.repository.update_movie(&movie).await?;
        tracing::info!(user_id = user_id, id = id, "Movie marked watched");

        self.invalidate(user_id).await;
        Ok(())
    }

    /// Download state is not part of the oracle context, so nothing is invalidated
    pub async fn mark_downloaded(&self, user_id: i64, id: i64) -> AppResult<()> {
        let mut movie = self.owned_movie(user_id, id).await?;
        if movie.downloaded {
            return Ok(());
        }

        movie.downloaded = true;
        self.repository.update_movie(&movie).await?;
        tracing::info!(user_id = user_id, id = id, "Movie marked downloaded");
        Ok(())
    }

    async fn owned_movie(&self, user_id: i64, id: i64) -> AppResult<Movie> {
        let movie = self
            .repository
            .get_movie(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", id)))?;

        if movie.user_id != user_id {
            tracing::warn!(user_id = user_id, id = id, owner = movie.user_id, "Access to another user's movie");
            return Err(AppError::Forbidden(format!(
                "Movie {} belongs to another user",
                id
            )));
        }

        Ok(movie)
    }

    /// Best-effort: a failure leaves stale suggestions until TTL expiry
    async fn invalidate(&self, user_id: i64) {
        if let Err(e) = self.invalidator.invalidate_user(user_id).await {
            tracing::error!(
                user_id = user_id,
                error = %e,
                "Suggestion cache invalidation failed, stale suggestions may be served"
            );
        }
    }
}
