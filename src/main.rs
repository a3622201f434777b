use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlist_api::{
    config::{CacheBackend, Config, OracleKind},
    db::{
        create_pool, create_redis_client, Cache, CachePurgerHandle, CacheStore, MemoryStore,
        PgWatchlistRepository, RedisStore, WatchlistRepository,
    },
    middleware::JwtKeys,
    routes::{create_router, ApiSettings, AppState},
    services::{
        providers::{GeminiClient, MlApiClient, MovieMetadataProvider, TmdbProvider},
        AvailabilitySweeper, CacheInvalidator, Oracle, SmtpMailer, SuggestionService,
        SuggestionSettings, WatchlistService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlist_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    let repository: Arc<dyn WatchlistRepository> = Arc::new(PgWatchlistRepository::new(pool));

    let (store, purger) = cache_store(&config).await?;
    let cache = Cache::new(store);

    let metadata: Arc<dyn MovieMetadataProvider> = Arc::new(TmdbProvider::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        config.upstream_timeout(),
    )?);

    let oracle = oracle(&config)?;
    tracing::info!(kind = oracle.kind(), provider = oracle.name(), "Suggestion oracle configured");

    let suggestions = SuggestionService::new(
        cache.clone(),
        metadata.clone(),
        repository.clone(),
        oracle,
        SuggestionSettings {
            popular_pages: config.popular_pages,
            language: config.tmdb_language.clone(),
            cache_ttl: config.suggestion_cache_ttl(),
            upstream_timeout: config.upstream_timeout(),
        },
    );
    let watchlist = WatchlistService::new(
        repository.clone(),
        metadata.clone(),
        CacheInvalidator::new(cache.clone()),
    );

    let mailer = SmtpMailer::new(
        &config.email_sender,
        &config.email_smtp,
        config.email_port,
        config.email_user.clone(),
        config.email_password.clone(),
    )?;
    let sweeper = Arc::new(AvailabilitySweeper::new(
        repository.clone(),
        metadata.clone(),
        Arc::new(mailer),
        config.sweep_interval(),
    ));
    let sweeper_handle = sweeper.clone().start();

    let state = AppState {
        suggestions,
        watchlist,
        sweeper,
        repository,
        metadata,
        cache,
        jwt: JwtKeys::new(&config.jwt_secret),
        settings: ApiSettings {
            language: config.tmdb_language.clone(),
            default_suggestion_count: config.default_suggestion_count,
            max_suggestion_count: config.max_suggestion_count,
        },
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper_handle.shutdown().await;
    if let Some(purger) = purger {
        purger.shutdown().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

/// Builds the configured cache backend; the memory store also gets its purge task
async fn cache_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn CacheStore>, Option<CachePurgerHandle>)> {
    match config.cache_backend {
        CacheBackend::Memory => {
            let store = MemoryStore::new();
            let purger = store.start_purger(config.cache_purge_interval());
            Ok((Arc::new(store), Some(purger)))
        }
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required for the redis cache backend")?;
            let store = RedisStore::connect(create_redis_client(url)?)
                .await
                .context("Failed to connect to Redis")?;
            Ok((Arc::new(store), None))
        }
    }
}

fn oracle(config: &Config) -> anyhow::Result<Oracle> {
    match config.oracle_kind {
        OracleKind::Generative => {
            let api_key = config
                .gemini_api_key
                .clone()
                .context("GEMINI_API_KEY is required for the generative oracle")?;
            Ok(Oracle::Generative(Arc::new(GeminiClient::new(
                api_key,
                config.gemini_api_url.clone(),
                config.gemini_model.clone(),
                config.upstream_timeout(),
            )?)))
        }
        OracleKind::Predictive => {
            let api_url = config
                .ml_api_url
                .clone()
                .context("ML_API_URL is required for the predictive oracle")?;
            Ok(Oracle::Predictive(Arc::new(MlApiClient::new(
                api_url,
                config.upstream_timeout(),
            )?)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
