use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::WatchlistRepository,
    error::AppResult,
    models::{Movie, NewMovie, User},
};

const MOVIE_COLUMNS: &str = "id, user_id, title, overview, release_date, image, movie_id, \
                             email_sent, watched, downloaded, rating";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Watchlist storage on PostgreSQL
#[derive(Clone)]
pub struct PgWatchlistRepository {
    pool: PgPool,
}

impl PgWatchlistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn movies_where(&self, condition: &str, user_id: i64) -> AppResult<Vec<Movie>> {
        let query = format!(
            "SELECT {} FROM watchlist WHERE user_id = $1 AND {} ORDER BY id",
            MOVIE_COLUMNS, condition
        );
        let movies = sqlx::query_as::<_, Movie>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movies)
    }
}

#[async_trait::async_trait]
impl WatchlistRepository for PgWatchlistRepository {
    async fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, first_name, last_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_users(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, email, first_name, last_name FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn get_watchlist(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        self.movies_where("watched = FALSE", user_id).await
    }

    async fn get_watch_history(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        self.movies_where("watched = TRUE", user_id).await
    }

    async fn get_movie(&self, id: i64) -> AppResult<Option<Movie>> {
        let query = format!("SELECT {} FROM watchlist WHERE id = $1", MOVIE_COLUMNS);
        let movie = sqlx::query_as::<_, Movie>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(movie)
    }

    async fn insert_movie(&self, movie: NewMovie) -> AppResult<Movie> {
        let query = format!(
            "INSERT INTO watchlist (user_id, title, overview, image, movie_id, release_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            MOVIE_COLUMNS
        );
        let created = sqlx::query_as::<_, Movie>(&query)
            .bind(movie.user_id)
            .bind(movie.title)
            .bind(movie.overview)
            .bind(movie.image)
            .bind(movie.movie_id)
            .bind(movie.release_date)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn delete_movie(&self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM watchlist WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_movie(&self, movie: &Movie) -> AppResult<()> {
        sqlx::query(
            "UPDATE watchlist SET title = $2, overview = $3, release_date = $4, image = $5, \
             email_sent = $6, watched = $7, downloaded = $8, rating = $9 WHERE id = $1",
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(&movie.overview)
        .bind(movie.release_date)
        .bind(&movie.image)
        .bind(movie.email_sent)
        .bind(movie.watched)
        .bind(movie.downloaded)
        .bind(movie.rating)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn movies_without_release_date(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        self.movies_where("release_date IS NULL", user_id).await
    }

    async fn released_unnotified(&self, user_id: i64, as_of: NaiveDate) -> AppResult<Vec<Movie>> {
        let query = format!(
            "SELECT {} FROM watchlist \
             WHERE user_id = $1 AND release_date <= $2 AND email_sent = FALSE ORDER BY id",
            MOVIE_COLUMNS
        );
        let movies = sqlx::query_as::<_, Movie>(&query)
            .bind(user_id)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;
        Ok(movies)
    }
}
