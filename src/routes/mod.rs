use axum::{
    extract::FromRef,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::{Cache, WatchlistRepository},
    middleware::{make_span_with_request_id, request_id_middleware, JwtKeys},
    services::{
        providers::MovieMetadataProvider, AvailabilitySweeper, SuggestionService, WatchlistService,
    },
};

pub mod catalog;
pub mod movies;
pub mod suggestions;
pub mod users;

/// Request-level settings the handlers need
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub language: String,
    pub default_suggestion_count: u32,
    pub max_suggestion_count: u32,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub suggestions: SuggestionService,
    pub watchlist: WatchlistService,
    pub sweeper: Arc<AvailabilitySweeper>,
    pub repository: Arc<dyn WatchlistRepository>,
    pub metadata: Arc<dyn MovieMetadataProvider>,
    pub cache: Cache,
    pub jwt: JwtKeys,
    pub settings: ApiSettings,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(users::health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(
            // Outermost first: the request id must exist before the trace span is made
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// API routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/version", get(users::version))
        .route("/user", get(users::current_user))
        .route("/popular", get(catalog::popular))
        .route("/search", post(catalog::search))
        .route("/autocomplete", post(catalog::autocomplete))
        .route("/update", get(catalog::update_release_dates))
        .route("/suggestions", get(suggestions::suggest))
        .route("/movies", get(movies::list).post(movies::add))
        .route("/movies/history", get(movies::history))
        .route("/movies/:id", delete(movies::remove))
        .route("/movies/:id/rate", post(movies::rate))
        .route("/movies/:id/watched", post(movies::mark_watched))
        .route("/movies/:id/downloaded", post(movies::mark_downloaded))
}
