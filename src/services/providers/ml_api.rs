/// Movie suggestion ML service
///
/// Serves per-user predictions from a model trained on watch history:
/// GET /suggestions?user_id=..&num_movies=.. → [{id, title, predicted_rating}]
use crate::{
    error::{AppError, AppResult},
    models::PredictedMovie,
    services::providers::RatingPredictor,
};
use reqwest::Client as HttpClient;
use std::time::Duration;

#[derive(Clone)]
pub struct MlApiClient {
    http_client: HttpClient,
    api_url: String,
}

impl MlApiClient {
    pub fn new(api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RatingPredictor for MlApiClient {
    async fn predict(&self, user_id: i64, count: u32) -> AppResult<Vec<PredictedMovie>> {
        let url = format!("{}/suggestions", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("user_id", user_id.to_string()), ("num_movies", count.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Suggestion API returned status {}: {}",
                status, body
            )));
        }

        let response_text = response.text().await?;
        let predictions: Vec<PredictedMovie> =
            serde_json::from_str(&response_text).map_err(|e| {
                tracing::error!(error = %e, response = %response_text, "Unparseable prediction response");
                AppError::Validation(format!("unparseable prediction response: {}", e))
            })?;

        tracing::info!(
            user_id = user_id,
            predictions = predictions.len(),
            provider = "ml_api",
            "Predictions fetched"
        );

        Ok(predictions)
    }

    fn name(&self) -> &'static str {
        "ml_api"
    }
}
