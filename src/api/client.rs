//! HTTP client for the answer backend.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lecture_tutor::api::client::TutorClient;
//! use lecture_tutor::config::ApiConfig;
//!
//! # async fn example() -> Result<(), lecture_tutor::TutorError> {
//! let client = TutorClient::new(ApiConfig::default())?;
//! let verification = client.verify_key("gsk_...").await?;
//! println!("key ok: {}", verification.ok);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::backend::AnswerBackend;
use super::types::{BackendHealth, FallbackReply, KeyVerification, TurnRequest};
use crate::config::ApiConfig;
use crate::error::TutorError;
use crate::stream::{TurnEventStream, boxed_event_stream};

/// Answer backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct TutorClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl TutorClient {
    /// Create a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Config`] if the base URL does not parse or the
    /// HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, TutorError> {
        url::Url::parse(&config.base_url)
            .map_err(|e| TutorError::Config(format!("invalid api.base_url {}: {e}", config.base_url)))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TutorError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Check a credential against the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply does not parse.
    pub async fn verify_key(&self, api_key: &str) -> Result<KeyVerification, TutorError> {
        let url = self.endpoint(&self.config.verify_path);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "apiKey": api_key }))
            .send()
            .await
            .map_err(|e| TutorError::Request(format!("key verification failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .json::<KeyVerification>()
            .await
            .map_err(|e| TutorError::Request(format!("invalid verification reply: {e}")))
    }

    /// Fetch the backend health report.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply does not parse.
    pub async fn health(&self) -> Result<BackendHealth, TutorError> {
        let url = self.endpoint(&self.config.health_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TutorError::Request(format!("health check failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .json::<BackendHealth>()
            .await
            .map_err(|e| TutorError::Request(format!("invalid health reply: {e}")))
    }

    /// Fetch the backend's rate usage statistics (opaque JSON).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply is not JSON.
    pub async fn rate_status(&self) -> Result<serde_json::Value, TutorError> {
        let url = self.endpoint(&self.config.rate_status_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TutorError::Request(format!("rate status failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TutorError::Request(format!("invalid rate status reply: {e}")))
    }
}

/// Map a non-success status and its body to the appropriate error.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> TutorError {
    let message = extract_detail(body);
    match status.as_u16() {
        401 | 403 => TutorError::Auth(format!("credential rejected: {message}")),
        429 => TutorError::RateLimited(format!("rate limited: {message}")),
        503 => TutorError::Unavailable(format!("streaming unavailable: {message}")),
        400 | 422 => TutorError::Validation(message),
        code => TutorError::Request(format!("HTTP {code}: {message}")),
    }
}

/// Pull the `detail` field out of an error body, falling back to the raw text.
fn extract_detail(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("detail")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None if body.trim().is_empty() => "no details".to_owned(),
        None => body.trim().to_owned(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TutorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_http_error(status, &body))
}

#[async_trait]
impl AnswerBackend for TutorClient {
    async fn open_stream(&self, request: &TurnRequest) -> Result<TurnEventStream, TutorError> {
        let url = self.endpoint(&self.config.stream_path);
        debug!(
            lecture_id = %request.lecture_id,
            hint_stage = request.hint_stage,
            "opening turn stream"
        );
        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TutorError::Request(format!("turn request failed: {e}")))?;
        let response = check_status(response).await?;
        Ok(boxed_event_stream(response.bytes_stream()))
    }

    async fn complete(&self, request: &TurnRequest) -> Result<FallbackReply, TutorError> {
        let url = self.endpoint(&self.config.chat_path);
        info!(lecture_id = %request.lecture_id, "using non-streaming chat endpoint");
        let response = self
            .client
            .post(&url)
            .json(&request.fallback_body())
            .send()
            .await
            .map_err(|e| TutorError::Request(format!("chat request failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .json::<FallbackReply>()
            .await
            .map_err(|e| TutorError::Request(format!("invalid chat reply: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let mut config = ApiConfig::default();
        config.base_url = "http://localhost:8000/api/".into();
        let client = match TutorClient::new(config) {
            Ok(c) => c,
            Err(_) => unreachable!("valid config"),
        };
        assert_eq!(
            client.endpoint("/v2/chat/stream"),
            "http://localhost:8000/api/v2/chat/stream"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let mut config = ApiConfig::default();
        config.base_url = "not a url".into();
        assert!(matches!(TutorClient::new(config), Err(TutorError::Config(_))));
    }

    #[test]
    fn http_401_maps_to_auth() {
        let err = map_http_error(StatusCode::UNAUTHORIZED, r#"{"detail":"Invalid API key"}"#);
        match err {
            TutorError::Auth(msg) => assert!(msg.contains("Invalid API key")),
            other => unreachable!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn http_429_maps_to_rate_limited() {
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, TutorError::RateLimited(_)));
    }

    #[test]
    fn http_503_maps_to_unavailable() {
        let err = map_http_error(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"detail":"RAG pipeline not initialized. Set APP_MODE=rag in .env"}"#,
        );
        assert!(matches!(err, TutorError::Unavailable(_)));
    }

    #[test]
    fn http_422_detail_list_is_stringified() {
        let err = map_http_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail":[{"msg":"message must not be empty"}]}"#,
        );
        match err {
            TutorError::Validation(msg) => assert!(msg.contains("message must not be empty")),
            other => unreachable!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn http_500_maps_to_request() {
        let err = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "");
        match err {
            TutorError::Request(msg) => assert!(msg.contains("500")),
            other => unreachable!("expected request error, got {other:?}"),
        }
    }
}
