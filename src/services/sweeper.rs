//! Availability sweeper
//!
//! Every interval, for each user: resolve missing release dates, then mail the
//! titles that became available and mark them notified. Suggestions are left
//! untouched; release dates and notification flags are not part of the oracle
//! context.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    db::WatchlistRepository,
    error::AppResult,
    models::{Movie, User},
    services::{mail::MailSender, providers::MovieMetadataProvider},
};

pub const AVAILABILITY_SUBJECT: &str = "New movies available to watch";

/// Outcome of one pass over all users
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub users: usize,
    pub release_dates_resolved: usize,
    pub notifications_sent: usize,
    pub failed_users: usize,
}

/// Handle for stopping the periodic sweep
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Availability sweeper shutdown signal sent");
    }
}

pub struct AvailabilitySweeper {
    repository: Arc<dyn WatchlistRepository>,
    metadata: Arc<dyn MovieMetadataProvider>,
    mailer: Arc<dyn MailSender>,
    interval: Duration,
}

impl AvailabilitySweeper {
    pub fn new(
        repository: Arc<dyn WatchlistRepository>,
        metadata: Arc<dyn MovieMetadataProvider>,
        mailer: Arc<dyn MailSender>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            metadata,
            mailer,
            interval,
        }
    }

    /// Spawns the periodic sweep. The first pass runs one interval after start.
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "Availability sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(report) => tracing::info!(
                                users = report.users,
                                release_dates_resolved = report.release_dates_resolved,
                                notifications_sent = report.notifications_sent,
                                failed_users = report.failed_users,
                                "Availability sweep completed"
                            ),
                            Err(e) => tracing::error!(error = %e, "Availability sweep failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Availability sweeper shutting down");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx }
    }

    pub async fn sweep(&self) -> AppResult<SweepReport> {
        self.sweep_as_of(Utc::now().date_naive()).await
    }

    /// One pass over every user. A failing user is logged and skipped.
    pub async fn sweep_as_of(&self, today: NaiveDate) -> AppResult<SweepReport> {
        let users = self.repository.get_users().await?;
        let mut report = SweepReport {
            users: users.len(),
            ..SweepReport::default()
        };

        for user in &users {
            let resolved = match self.refresh_release_dates(user.id).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(user_id = user.id, error = %e, "Release date refresh failed");
                    report.failed_users += 1;
                    continue;
                }
            };
            report.release_dates_resolved += resolved;

            match self.notify_available(user, today).await {
                Ok(true) => report.notifications_sent += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(user_id = user.id, error = %e, "Availability notification failed");
                    report.failed_users += 1;
                }
            }
        }

        Ok(report)
    }

    /// Looks up release dates still unknown for the user's movies
    ///
    /// A failed lookup leaves that movie undated for the next pass. Returns how
    /// many movies got a date.
    pub async fn refresh_release_dates(&self, user_id: i64) -> AppResult<usize> {
        let mut resolved = 0;

        for mut movie in self.repository.movies_without_release_date(user_id).await? {
            match self.metadata.fetch_release_date(movie.movie_id).await {
                Ok(Some(date)) => {
                    movie.release_date = Some(date);
                    self.repository.update_movie(&movie).await?;
                    resolved += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    user_id = user_id,
                    movie_id = movie.movie_id,
                    error = %e,
                    "Release date lookup failed"
                ),
            }
        }

        if resolved > 0 {
            tracing::info!(user_id = user_id, resolved = resolved, "Release dates resolved");
        }

        Ok(resolved)
    }

    /// Mails the newly available titles; movies are marked only after delivery
    async fn notify_available(&self, user: &User, today: NaiveDate) -> AppResult<bool> {
        let movies = self.repository.released_unnotified(user.id, today).await?;
        if movies.is_empty() {
            return Ok(false);
        }

        self.mailer
            .send(&user.email, AVAILABILITY_SUBJECT, &availability_body(&movies))
            .await?;

        for mut movie in movies {
            movie.email_sent = true;
            self.repository.update_movie(&movie).await?;
        }

        Ok(true)
    }
}

fn availability_body(movies: &[Movie]) -> String {
    let mut body = String::from("The following movies are available to download:\n");
    for movie in movies {
        body.push_str(&movie.title);
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::repository::MockWatchlistRepository, error::AppError, services::mail::MockMailSender,
        services::providers::MockMovieMetadataProvider,
    };
    use mockall::predicate::eq;

    fn user(id: i64) -> User {
        User {
            id,
            email: format!("user{}@example.com", id),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sweeper(
        repository: MockWatchlistRepository,
        metadata: MockMovieMetadataProvider,
        mailer: MockMailSender,
    ) -> AvailabilitySweeper {
        AvailabilitySweeper::new(
            Arc::new(repository),
            Arc::new(metadata),
            Arc::new(mailer),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_availability_body_lists_titles() {
        let movies = vec![Movie::sample(1, 7, 10, "Dune"), Movie::sample(2, 7, 11, "Alien")];
        assert_eq!(
            availability_body(&movies),
            "The following movies are available to download:\nDune\nAlien\n"
        );
    }

    #[tokio::test]
    async fn test_sweep_resolves_dates_and_notifies() {
        let today = date(2024, 6, 1);
        let released = Movie {
            release_date: Some(date(2024, 5, 20)),
            ..Movie::sample(1, 7, 10, "Dune")
        };

        let mut repository = MockWatchlistRepository::new();
        repository.expect_get_users().returning(|| Ok(vec![user(7)]));
        repository
            .expect_movies_without_release_date()
            .with(eq(7))
            .returning(|_| Ok(vec![Movie::sample(2, 7, 11, "Alien")]));
        repository
            .expect_update_movie()
            .withf(|movie| movie.id == 2 && movie.release_date == Some(date(2024, 9, 1)))
            .times(1)
            .returning(|_| Ok(()));
        repository
            .expect_released_unnotified()
            .with(eq(7), eq(today))
            .returning(move |_, _| Ok(vec![released.clone()]));
        repository
            .expect_update_movie()
            .withf(|movie| movie.id == 1 && movie.email_sent)
            .times(1)
            .returning(|_| Ok(()));

        let mut metadata = MockMovieMetadataProvider::new();
        metadata
            .expect_fetch_release_date()
            .with(eq(11))
            .returning(|_| Ok(Some(date(2024, 9, 1))));

        let mut mailer = MockMailSender::new();
        mailer
            .expect_send()
            .withf(|recipient, subject, body| {
                recipient == "user7@example.com"
                    && subject == AVAILABILITY_SUBJECT
                    && body.contains("Dune")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = sweeper(repository, metadata, mailer)
            .sweep_as_of(today)
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport {
                users: 1,
                release_dates_resolved: 1,
                notifications_sent: 1,
                failed_users: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_mail_leaves_movies_unmarked() {
        let mut repository = MockWatchlistRepository::new();
        repository.expect_get_users().returning(|| Ok(vec![user(7)]));
        repository
            .expect_movies_without_release_date()
            .returning(|_| Ok(Vec::new()));
        repository
            .expect_released_unnotified()
            .returning(|_, _| Ok(vec![Movie::sample(1, 7, 10, "Dune")]));
        repository.expect_update_movie().never();

        let mut mailer = MockMailSender::new();
        mailer
            .expect_send()
            .returning(|_, _, _| Err(AppError::ExternalApi("SMTP delivery failed".to_string())));

        let report = sweeper(repository, MockMovieMetadataProvider::new(), mailer)
            .sweep_as_of(date(2024, 6, 1))
            .await
            .unwrap();

        assert_eq!(report.failed_users, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_failing_user_does_not_stop_sweep() {
        let mut repository = MockWatchlistRepository::new();
        repository
            .expect_get_users()
            .returning(|| Ok(vec![user(7), user(8)]));
        repository
            .expect_movies_without_release_date()
            .with(eq(7))
            .returning(|_| Err(AppError::Internal("connection reset".to_string())));
        repository
            .expect_movies_without_release_date()
            .with(eq(8))
            .returning(|_| Ok(Vec::new()));
        repository
            .expect_released_unnotified()
            .with(eq(8), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let report = sweeper(repository, MockMovieMetadataProvider::new(), MockMailSender::new())
            .sweep_as_of(date(2024, 6, 1))
            .await
            .unwrap();

        assert_eq!(report.users, 2);
        assert_eq!(report.failed_users, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_movie() {
        let mut repository = MockWatchlistRepository::new();
        repository
            .expect_movies_without_release_date()
            .returning(|_| Ok(vec![Movie::sample(1, 7, 10, "A"), Movie::sample(2, 7, 11, "B")]));
        repository
            .expect_update_movie()
            .withf(|movie| movie.id == 2)
            .times(1)
            .returning(|_| Ok(()));

        let mut metadata = MockMovieMetadataProvider::new();
        metadata
            .expect_fetch_release_date()
            .with(eq(10))
            .returning(|_| Err(AppError::ExternalApi("TMDb returned status 404".to_string())));
        metadata
            .expect_fetch_release_date()
            .with(eq(11))
            .returning(|_| Ok(Some(date(2024, 1, 1))));

        let resolved = sweeper(repository, metadata, MockMailSender::new())
            .refresh_release_dates(7)
            .await
            .unwrap();

        assert_eq!(resolved, 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut repository = MockWatchlistRepository::new();
        repository.expect_get_users().returning(|| Ok(Vec::new()));

        let handle = Arc::new(AvailabilitySweeper::new(
            Arc::new(repository),
            Arc::new(MockMovieMetadataProvider::new()),
            Arc::new(MockMailSender::new()),
            Duration::from_millis(10),
        ))
        .start();

        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.shutdown().await;
    }
}
