use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A row of the `watchlist` table
///
/// Unwatched rows form the user's watchlist, watched rows their history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Movie {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub overview: String,
    pub release_date: Option<NaiveDate>,
    pub image: String,
    /// TMDb id of the movie
    pub movie_id: i64,
    pub email_sent: bool,
    pub watched: bool,
    pub downloaded: bool,
    /// 0 = not rated yet, 1 = worst, 5 = best
    pub rating: i16,
}

impl Movie {
    /// Released on or before `today`
    pub fn is_available(&self, today: NaiveDate) -> bool {
        self.release_date.is_some_and(|date| date <= today)
    }

    #[cfg(test)]
    pub fn sample(id: i64, user_id: i64, movie_id: i64, title: &str) -> Self {
        Self {
            id,
            user_id,
            title: title.to_string(),
            overview: String::new(),
            release_date: None,
            image: String::new(),
            movie_id,
            email_sent: false,
            watched: false,
            downloaded: false,
            rating: 0,
        }
    }
}

/// Fields needed to insert a watchlist row
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovie {
    pub user_id: i64,
    pub title: String,
    pub overview: String,
    pub image: String,
    pub movie_id: i64,
    pub release_date: Option<NaiveDate>,
}
