//! Suggestion aggregation
//!
//! Flow of one `suggest` call:
//! 1. Cache lookup under `moviesuggestion-<user>-<count>`; a hit returns without
//!    touching any provider.
//! 2. Candidate pool: popular pages `1..=popular_pages`, deduplicated by id.
//! 3. Oracle context: watchlist and watch history as [`WatchEntry`] lists,
//!    generative oracle only.
//! 4. Oracle: a selection pass then a formatting pass for a text generator, or
//!    a single call for a rating predictor.
//! 5. Reconciliation against the pool, then the cache write, skipped when the
//!    user was invalidated while the result was being computed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    db::{Cache, CacheKey, WatchlistRepository},
    error::{AppError, AppResult, Stage},
    models::{SuggestionResult, WatchEntry},
    services::{
        prompt::{bound_entries, formatting_prompt, selection_prompt},
        providers::{MovieMetadataProvider, RatingPredictor, TextGenerator},
        reconcile::{parse_choices, reconcile, CandidatePool},
    },
};

/// The external service ranking candidates for a user
#[derive(Clone)]
pub enum Oracle {
    /// Free-text model, prompted twice
    Generative(Arc<dyn TextGenerator>),
    /// Structured prediction API
    ///
    /// The service keeps its own view of each user, so no watchlist or
    /// history is fetched or sent for this oracle.
    Predictive(Arc<dyn RatingPredictor>),
}

impl Oracle {
    pub fn kind(&self) -> &'static str {
        match self {
            Oracle::Generative(_) => "generative",
            Oracle::Predictive(_) => "predictive",
        }
    }

    /// Name of the backing provider
    pub fn name(&self) -> &'static str {
        match self {
            Oracle::Generative(generator) => generator.name(),
            Oracle::Predictive(predictor) => predictor.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionSettings {
    pub popular_pages: u32,
    pub language: String,
    pub cache_ttl: Duration,
    /// Applied to every upstream call on its own
    pub upstream_timeout: Duration,
}

#[derive(Clone)]
pub struct SuggestionService {
    cache: Cache,
    metadata: Arc<dyn MovieMetadataProvider>,
    repository: Arc<dyn WatchlistRepository>,
    oracle: Oracle,
    settings: SuggestionSettings,
}

impl SuggestionService {
    pub fn new(
        cache: Cache,
        metadata: Arc<dyn MovieMetadataProvider>,
        repository: Arc<dyn WatchlistRepository>,
        oracle: Oracle,
        settings: SuggestionSettings,
    ) -> Self {
        Self {
            cache,
            metadata,
            repository,
            oracle,
            settings,
        }
    }

    /// Up to `count` popular movies picked for `user_id`
    ///
    /// Only fully reconciled results are cached. Failures are never cached, so
    /// a retry repeats the miss path. A result whose computation overlapped an
    /// invalidation of the user is returned but not kept.
    pub async fn suggest(&self, user_id: i64, count: u32) -> AppResult<SuggestionResult> {
        let key = CacheKey::Suggestions { user_id, count };
        let generation = self.cache.generation(user_id);

        match self.cache.get_from_cache(&key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %key, "Cache hit");
                return Ok(cached);
            }
            Ok(None) => tracing::debug!(key = %key, "Cache miss"),
            Err(e) => tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss"),
        }

        let suggestions = self.compute(user_id, count).await?;
        self.store(&key, user_id, generation, &suggestions).await;

        Ok(suggestions)
    }

    /// Writes a computed result unless the user was invalidated since `generation`
    ///
    /// The generation is checked again after the write: an invalidation that
    /// lands in between may have listed keys before ours existed.
    async fn store(
        &self,
        key: &CacheKey,
        user_id: i64,
        generation: u64,
        suggestions: &SuggestionResult,
    ) {
        if self.cache.generation(user_id) != generation {
            tracing::info!(key = %key, "Watch state changed during computation, result not cached");
            return;
        }

        if let Err(e) = self
            .cache
            .set_in_cache(key, suggestions, self.settings.cache_ttl)
            .await
        {
            tracing::warn!(error = %e, key = %key, "Cache write failed, returning uncached value");
            return;
        }

        if self.cache.generation(user_id) != generation {
            tracing::info!(key = %key, "Watch state changed during cache write, dropping entry");
            if let Err(e) = self.cache.delete_key(&key.to_string()).await {
                tracing::warn!(error = %e, key = %key, "Failed to drop outdated cache entry");
            }
        }
    }

    async fn compute(&self, user_id: i64, count: u32) -> AppResult<SuggestionResult> {
        let pool = self.candidate_pool().await?;

        let picks: Vec<(i64, Option<f32>)> = match &self.oracle {
            Oracle::Generative(generator) => {
                let (watchlist, history) = self.watch_context(user_id).await?;
                let prompt = selection_prompt(
                    bound_entries(&watchlist, "watchlist", user_id),
                    bound_entries(&history, "history", user_id),
                    pool.movies(),
                    count,
                )?;

                let selection = self
                    .bounded(Stage::InvokingOracle, generator.generate(&prompt))
                    .await?;
                let formatted = self
                    .bounded(
                        Stage::FormattingSuggestions,
                        generator.generate(&formatting_prompt(&selection)),
                    )
                    .await?;

                parse_choices(&formatted)
                    .inspect_err(|e| {
                        tracing::warn!(
                            user_id = user_id,
                            stage = %Stage::ParsingSuggestions,
                            error = %e,
                            "Oracle output rejected"
                        )
                    })?
                    .into_iter()
                    .map(|choice| (choice.id, None))
                    .collect()
            }
            Oracle::Predictive(predictor) => self
                .bounded(Stage::InvokingOracle, predictor.predict(user_id, count))
                .await?
                .into_iter()
                .map(|prediction| (prediction.id, prediction.predicted_rating))
                .collect(),
        };

        let suggestions = reconcile(picks, &pool, count).inspect_err(|e| {
            tracing::warn!(user_id = user_id, error = %e, "Oracle output failed reconciliation")
        })?;

        tracing::info!(
            user_id = user_id,
            count = count,
            candidates = pool.len(),
            suggestions = suggestions.len(),
            oracle = self.oracle.kind(),
            "Suggestions computed"
        );

        Ok(suggestions)
    }

    async fn candidate_pool(&self) -> AppResult<CandidatePool> {
        let mut pool = CandidatePool::new();

        for page in 1..=self.settings.popular_pages.max(1) {
            let movies = self
                .bounded(
                    Stage::FetchingPopularity,
                    self.metadata.fetch_popular(page, &self.settings.language),
                )
                .await?;
            let added = pool.extend(movies);
            tracing::debug!(page = page, added = added, "Popular page merged into candidate pool");
        }

        if pool.is_empty() {
            return Err(AppError::Upstream {
                stage: Stage::FetchingPopularity,
                message: "popularity feed returned no movies".to_string(),
            });
        }

        Ok(pool)
    }

    async fn watch_context(&self, user_id: i64) -> AppResult<(Vec<WatchEntry>, Vec<WatchEntry>)> {
        let (watchlist, history) = tokio::try_join!(
            self.bounded(
                Stage::FetchingWatchlist,
                self.repository.get_watchlist(user_id)
            ),
            self.bounded(
                Stage::FetchingWatchHistory,
                self.repository.get_watch_history(user_id)
            ),
        )?;

        Ok((
            watchlist.iter().map(WatchEntry::from).collect(),
            history.iter().map(WatchEntry::from).collect(),
        ))
    }

    /// Runs one upstream call under the configured timeout, labelling failures with `stage`
    async fn bounded<T, F>(&self, stage: Stage, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let timeout = self.settings.upstream_timeout;

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(|e| e.at_stage(stage)),
            Err(_) => Err(AppError::Upstream {
                stage,
                message: format!("timed out after {}ms", timeout.as_millis()),
            }),
        };

        if let Err(e) = &result {
            tracing::warn!(stage = %stage, error = %e, "Upstream call failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{repository::MockWatchlistRepository, MemoryStore},
        models::{CandidateMovie, Movie, PredictedMovie},
        services::providers::{MockMovieMetadataProvider, MockRatingPredictor, MockTextGenerator},
    };
    use tokio_test::{assert_err, assert_ok};

    const FORMAT_MARKER: &str = "Format the above list";

    fn candidate(id: i64, title: &str) -> CandidateMovie {
        CandidateMovie {
            id,
            title: title.to_string(),
            release_date: None,
            poster_path: None,
        }
    }

    fn settings(popular_pages: u32) -> SuggestionSettings {
        SuggestionSettings {
            popular_pages,
            language: "en-US".to_string(),
            cache_ttl: Duration::from_secs(60),
            upstream_timeout: Duration::from_secs(5),
        }
    }

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()))
    }

    fn metadata_with(pool: Vec<CandidateMovie>) -> MockMovieMetadataProvider {
        let mut metadata = MockMovieMetadataProvider::new();
        metadata
            .expect_fetch_popular()
            .times(1)
            .returning(move |_, _| Ok(pool.clone()));
        metadata
    }

    fn empty_repository() -> MockWatchlistRepository {
        let mut repository = MockWatchlistRepository::new();
        repository
            .expect_get_watchlist()
            .returning(|_| Ok(Vec::new()));
        repository
            .expect_get_watch_history()
            .returning(|_| Ok(Vec::new()));
        repository
    }

    /// Selection pass answers with prose, formatting pass with `formatted`
    fn generator_answering(formatted: &'static str) -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt| !prompt.contains(FORMAT_MARKER))
            .times(1)
            .returning(|_| Ok("Here are my picks.".to_string()));
        generator
            .expect_generate()
            .withf(|prompt| prompt.contains(FORMAT_MARKER))
            .times(1)
            .returning(move |_| Ok(formatted.to_string()));
        generator
    }

    fn service(
        cache: Cache,
        metadata: MockMovieMetadataProvider,
        repository: MockWatchlistRepository,
        oracle: Oracle,
        settings: SuggestionSettings,
    ) -> SuggestionService {
        SuggestionService::new(
            cache,
            Arc::new(metadata),
            Arc::new(repository),
            oracle,
            settings,
        )
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_upstream_calls() {
        let cache = cache();
        let stored: SuggestionResult = vec![candidate(3, "Stored").into()];
        let key = CacheKey::Suggestions {
            user_id: 7,
            count: 5,
        };
        cache
            .set_in_cache(&key, &stored, Duration::from_secs(60))
            .await
            .unwrap();

        // Mocks without expectations panic on any call
        let service = service(
            cache,
            MockMovieMetadataProvider::new(),
            MockWatchlistRepository::new(),
            Oracle::Generative(Arc::new(MockTextGenerator::new())),
            settings(2),
        );

        let result = assert_ok!(service.suggest(7, 5).await);
        assert_eq!(result, stored);
    }

    #[tokio::test]
    async fn test_end_to_end_then_cached() {
        let mut metadata = MockMovieMetadataProvider::new();
        metadata
            .expect_fetch_popular()
            .times(2)
            .returning(|page, _| match page {
                1 => Ok(vec![candidate(10, "A"), candidate(11, "B")]),
                _ => Ok(vec![candidate(11, "B"), candidate(12, "C")]),
            });

        let mut repository = MockWatchlistRepository::new();
        repository
            .expect_get_watchlist()
            .times(1)
            .returning(|_| Ok(Vec::new()));
        repository
            .expect_get_watch_history()
            .times(1)
            .returning(|user_id| {
                Ok(vec![Movie {
                    watched: true,
                    rating: 4,
                    ..Movie::sample(1, user_id, 10, "A")
                }])
            });

        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt| {
                !prompt.contains(FORMAT_MARKER)
                    && prompt.contains(r#""movie_id":10,"rating":4"#)
                    && prompt.contains("Suggest 2 movies")
            })
            .times(1)
            .returning(|_| Ok("1. B\n2. C".to_string()));
        generator
            .expect_generate()
            .withf(|prompt| prompt.starts_with("1. B\n2. C") && prompt.contains(FORMAT_MARKER))
            .times(1)
            .returning(|_| {
                Ok("```json\n[{\"title\": \"B\", \"id\": 11}, {\"title\": \"C\", \"id\": 12}]\n```"
                    .to_string())
            });

        let service = service(
            cache(),
            metadata,
            repository,
            Oracle::Generative(Arc::new(generator)),
            settings(2),
        );

        let first = assert_ok!(service.suggest(7, 2).await);
        let titles: Vec<(i64, &str)> = first.iter().map(|m| (m.id, m.title.as_str())).collect();
        assert_eq!(titles, vec![(11, "B"), (12, "C")]);

        // Every mock above allows a single call
        let second = assert_ok!(service.suggest(7, 2).await);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_unknown_id_fails_and_is_not_cached() {
        let cache = cache();
        let service = service(
            cache.clone(),
            metadata_with(vec![candidate(1, "A"), candidate(2, "B"), candidate(3, "C")]),
            empty_repository(),
            Oracle::Generative(Arc::new(generator_answering(
                r#"[{"title": "A", "id": 1}, {"title": "Ghost", "id": 99}]"#,
            ))),
            settings(1),
        );

        let err = assert_err!(service.suggest(7, 2).await);
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("99"));

        let key = CacheKey::Suggestions {
            user_id: 7,
            count: 2,
        };
        let cached: Option<SuggestionResult> = cache.get_from_cache(&key).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_local_record_replaces_oracle_title() {
        let service = service(
            cache(),
            metadata_with(vec![candidate(1, "Correct Title")]),
            empty_repository(),
            Oracle::Generative(Arc::new(generator_answering(
                r#"[{"title": "Wrong Title", "id": 1}]"#,
            ))),
            settings(1),
        );

        let result = assert_ok!(service.suggest(7, 1).await);
        assert_eq!(result[0].title, "Correct Title");
    }

    #[tokio::test]
    async fn test_unparseable_formatting_pass_is_validation_error() {
        let service = service(
            cache(),
            metadata_with(vec![candidate(1, "A")]),
            empty_repository(),
            Oracle::Generative(Arc::new(generator_answering("Sorry, I can't help with that."))),
            settings(1),
        );

        let err = assert_err!(service.suggest(7, 1).await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_popularity_failure_is_labelled() {
        let mut metadata = MockMovieMetadataProvider::new();
        metadata
            .expect_fetch_popular()
            .returning(|_, _| Err(AppError::ExternalApi("TMDb returned status 503".to_string())));

        let service = service(
            cache(),
            metadata,
            MockWatchlistRepository::new(),
            Oracle::Generative(Arc::new(MockTextGenerator::new())),
            settings(2),
        );

        let err = assert_err!(service.suggest(7, 5).await);
        assert!(matches!(
            err,
            AppError::Upstream {
                stage: Stage::FetchingPopularity,
                ..
            }
        ));
        assert!(err.to_string().starts_with("fetching popularity failed"));
    }

    #[tokio::test]
    async fn test_empty_popularity_feed_is_upstream_error() {
        let service = service(
            cache(),
            metadata_with(Vec::new()),
            MockWatchlistRepository::new(),
            Oracle::Generative(Arc::new(MockTextGenerator::new())),
            settings(1),
        );

        let err = assert_err!(service.suggest(7, 5).await);
        assert!(matches!(
            err,
            AppError::Upstream {
                stage: Stage::FetchingPopularity,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_formatting_pass_failure_is_labelled() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt| !prompt.contains(FORMAT_MARKER))
            .returning(|_| Ok("1. A".to_string()));
        generator
            .expect_generate()
            .withf(|prompt| prompt.contains(FORMAT_MARKER))
            .returning(|_| Err(AppError::ExternalApi("Gemini returned status 429".to_string())));

        let service = service(
            cache(),
            metadata_with(vec![candidate(1, "A")]),
            empty_repository(),
            Oracle::Generative(Arc::new(generator)),
            settings(1),
        );

        let err = assert_err!(service.suggest(7, 1).await);
        assert!(matches!(
            err,
            AppError::Upstream {
                stage: Stage::FormattingSuggestions,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_history_failure_is_labelled() {
        let mut repository = MockWatchlistRepository::new();
        repository
            .expect_get_watchlist()
            .returning(|_| Ok(Vec::new()));
        repository
            .expect_get_watch_history()
            .returning(|_| Err(AppError::Internal("connection reset".to_string())));

        let service = service(
            cache(),
            metadata_with(vec![candidate(1, "A")]),
            repository,
            Oracle::Generative(Arc::new(MockTextGenerator::new())),
            settings(1),
        );

        let err = assert_err!(service.suggest(7, 1).await);
        assert!(matches!(
            err,
            AppError::Upstream {
                stage: Stage::FetchingWatchHistory,
                ..
            }
        ));
    }

    struct SlowGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _prompt: &str) -> AppResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("[]".to_string())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_oracle_timeout_is_upstream_error() {
        let cache = cache();
        let service = service(
            cache.clone(),
            metadata_with(vec![candidate(1, "A")]),
            empty_repository(),
            Oracle::Generative(Arc::new(SlowGenerator)),
            SuggestionSettings {
                upstream_timeout: Duration::from_millis(20),
                ..settings(1)
            },
        );

        let err = assert_err!(service.suggest(7, 1).await);
        assert!(matches!(
            err,
            AppError::Upstream {
                stage: Stage::InvokingOracle,
                ..
            }
        ));
        assert!(err.to_string().contains("timed out"));

        let key = CacheKey::Suggestions {
            user_id: 7,
            count: 1,
        };
        let cached: Option<SuggestionResult> = cache.get_from_cache(&key).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_predictive_oracle_skips_prompting() {
        let mut predictor = MockRatingPredictor::new();
        predictor
            .expect_predict()
            .withf(|user_id, count| *user_id == 7 && *count == 2)
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    PredictedMovie {
                        id: 12,
                        title: Some("whatever".to_string()),
                        predicted_rating: Some(4.8),
                    },
                    PredictedMovie {
                        id: 11,
                        title: None,
                        predicted_rating: Some(4.1),
                    },
                ])
            });

        let service = service(
            cache(),
            metadata_with(vec![candidate(10, "A"), candidate(11, "B"), candidate(12, "C")]),
            MockWatchlistRepository::new(),
            Oracle::Predictive(Arc::new(predictor)),
            settings(1),
        );

        let result = assert_ok!(service.suggest(7, 2).await);
        assert_eq!(result[0].title, "C");
        assert_eq!(result[0].predicted_rating, Some(4.8));
        assert_eq!(result[1].title, "B");
    }

    /// Holds the selection pass until released
    struct GatedGenerator {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TextGenerator for GatedGenerator {
        async fn generate(&self, _prompt: &str) -> AppResult<String> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                self.entered.notify_one();
                self.release.notified().await;
                return Ok("1. A".to_string());
            }
            Ok(r#"[{"title": "A", "id": 1}]"#.to_string())
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_result_overlapping_invalidation_is_not_cached() {
        let cache = cache();
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let generator = GatedGenerator {
            entered: entered.clone(),
            release: release.clone(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        };

        let service = service(
            cache.clone(),
            metadata_with(vec![candidate(1, "A")]),
            empty_repository(),
            Oracle::Generative(Arc::new(generator)),
            settings(1),
        );

        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.suggest(7, 1).await }
        });

        entered.notified().await;
        crate::services::CacheInvalidator::new(cache.clone())
            .invalidate_user(7)
            .await
            .unwrap();
        release.notify_one();

        // The caller still gets its answer
        let result = assert_ok!(pending.await.unwrap());
        assert_eq!(result[0].id, 1);

        let key = CacheKey::Suggestions {
            user_id: 7,
            count: 1,
        };
        let cached: Option<SuggestionResult> = cache.get_from_cache(&key).await.unwrap();
        assert!(cached.is_none());
    }

    #[test]
    fn test_oracle_kind() {
        let oracle = Oracle::Predictive(Arc::new(MockRatingPredictor::new()));
        assert_eq!(oracle.kind(), "predictive");
    }
}
