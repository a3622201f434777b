use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::User,
};

use super::AppState;

pub const API_VERSION: &str = "1.0";

pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn version() -> Json<Value> {
    Json(json!({ "version": API_VERSION }))
}

/// Profile of the authenticated caller
pub async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<User>> {
    state
        .repository
        .get_user(user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))
}
