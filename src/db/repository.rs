use chrono::NaiveDate;

use crate::{
    error::AppResult,
    models::{Movie, NewMovie, User},
};

/// Storage for users and their watchlist rows
///
/// Assumed transactional and durable. Services never reach the database
/// except through this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn get_user(&self, user_id: i64) -> AppResult<Option<User>>;

    async fn get_users(&self) -> AppResult<Vec<User>>;

    /// Rows the user has not watched yet
    async fn get_watchlist(&self, user_id: i64) -> AppResult<Vec<Movie>>;

    /// Rows the user has watched
    async fn get_watch_history(&self, user_id: i64) -> AppResult<Vec<Movie>>;

    async fn get_movie(&self, id: i64) -> AppResult<Option<Movie>>;

    async fn insert_movie(&self, movie: NewMovie) -> AppResult<Movie>;

    async fn delete_movie(&self, id: i64) -> AppResult<()>;

    /// Persists every mutable column of `movie`
    async fn update_movie(&self, movie: &Movie) -> AppResult<()>;

    async fn movies_without_release_date(&self, user_id: i64) -> AppResult<Vec<Movie>>;

    /// Rows released on or before `as_of` whose availability mail was not sent
    async fn released_unnotified(&self, user_id: i64, as_of: NaiveDate) -> AppResult<Vec<Movie>>;
}
