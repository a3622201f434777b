//! Gemini text generation client

use crate::{
    error::{AppError, AppResult},
    models::gemini::{
        ApiError, ContentPart, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
        RequestContent,
    },
    services::providers::TextGenerator,
};
use reqwest::Client as HttpClient;
use std::time::Duration;

const SYSTEM_INSTRUCTION: &str = "You are a movie expert.";

/// Gemini `generateContent` client
pub struct GeminiClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn build_request(prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![RequestContent::user(prompt)],
            system_instruction: Some(RequestContent::system(SYSTEM_INSTRUCTION)),
            generation_config: GenerationConfig::default(),
        }
    }
}

/// Concatenates the text segments of the first candidate
///
/// Fails on any non-text part instead of skipping it, and on a response
/// without text.
pub fn text_response(response: GenerateContentResponse) -> AppResult<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Validation("oracle returned no candidates".to_string()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut text = String::new();

    for part in parts {
        match part {
            ContentPart::Text(segment) => text.push_str(&segment),
            ContentPart::Unsupported(kind) => {
                return Err(AppError::Validation(format!(
                    "oracle returned unsupported content part '{}'",
                    kind
                )));
            }
        }
    }

    if text.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "oracle returned no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        );

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_request(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error_msg = serde_json::from_str::<ApiError>(&error_text)
                .map(|api_error| api_error.error.message)
                .unwrap_or(error_text);

            tracing::error!(status = %status, error = %error_msg, model = %self.model, "Gemini request failed");
            return Err(AppError::ExternalApi(format!(
                "Gemini returned status {}: {}",
                status, error_msg
            )));
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = text_response(body)?;

        tracing::debug!(model = %self.model, chars = text.len(), "Gemini generation completed");

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
