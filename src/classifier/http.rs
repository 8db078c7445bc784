//! HTTP inference client for a remotely hosted classification model
//!
//! The model server receives the raw image bytes and answers with a label:
//!
//! ```json
//! { "label": "violence", "confidence": 0.93 }
//! ```
//!
//! Transient failures (5xx, connection errors) are retried with exponential
//! backoff. Client errors and timeouts are not retried.
//!
//! # Example
//!
//! ```no_run
//! use railwatch::classifier::{HttpClassifier, HttpClassifierConfig};
//!
//! let config = HttpClassifierConfig::new("http://localhost:9000/classify")
//!     .with_timeout_ms(3000)
//!     .with_retry_attempts(2);
//!
//! let classifier = HttpClassifier::new(config);
//! ```

use super::{inspect_image, ClassificationError, ClassificationTag, Classifier};
use crate::config::ServiceConfig;
use crate::upload::UploadedImage;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings for the model server
#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    /// Inference endpoint
    pub url: String,
    /// Health endpoint; derived from `url` when not set
    pub health_url: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of retry attempts for transient failures
    pub retry_attempts: usize,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Formats accepted before anything is sent over the wire
    pub allowed_formats: Vec<String>,
}

impl HttpClassifierConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            health_url: None,
            timeout_ms: 5000,
            retry_attempts: 2,
            api_key: None,
            allowed_formats: vec!["jpeg".to_string(), "png".to_string()],
        }
    }

    /// Build from the service configuration, resolving the API key env var
    pub fn from_service_config(
        config: &ServiceConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            url: config.classifier.url.clone(),
            health_url: None,
            timeout_ms: config.classifier.timeout_ms,
            retry_attempts: config.classifier.retry_attempts,
            api_key: config.get_classifier_api_key()?,
            allowed_formats: config.uploads.allowed_formats.clone(),
        })
    }

    pub fn with_health_url(mut self, health_url: impl Into<String>) -> Self {
        self.health_url = Some(health_url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: usize) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_allowed_formats(mut self, formats: Vec<String>) -> Self {
        self.allowed_formats = formats;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Longest one `classify` call can run: every attempt timing out plus
    /// every backoff sleep between attempts
    pub fn retry_budget(&self) -> Duration {
        let attempts = u32::try_from(self.retry_attempts.saturating_add(1)).unwrap_or(u32::MAX);
        let requests = self.timeout().saturating_mul(attempts);
        // Delays saturate long before 64 retries
        (0..self.retry_attempts.min(64))
            .map(backoff_delay)
            .fold(requests, Duration::saturating_add)
    }

    /// `<scheme>://<host>[:port]/health` unless overridden
    fn resolved_health_url(&self) -> Result<String, ClassificationError> {
        if let Some(url) = &self.health_url {
            return Ok(url.clone());
        }
        let base = url::Url::parse(&self.url)
            .map_err(|e| ClassificationError::ModelUnavailable(format!("invalid model URL: {e}")))?;
        base.join("/health")
            .map(|u| u.to_string())
            .map_err(|e| ClassificationError::ModelUnavailable(format!("invalid model URL: {e}")))
    }
}

/// Response body from the model server
#[derive(Debug, Clone, Deserialize)]
struct ModelResponse {
    label: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Classifier backed by an HTTP model server
pub struct HttpClassifier {
    config: HttpClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(config: HttpClassifierConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &HttpClassifierConfig {
        &self.config
    }

    async fn call_model(&self, bytes: &[u8]) -> Result<ModelResponse, ClassificationError> {
        let url = &self.config.url;
        let timeout = self.config.timeout();
        let retry_attempts = self.config.retry_attempts;
        let mut last_error = None;

        for attempt in 0..=retry_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts = retry_attempts + 1,
                url = %url,
                "Calling classification model"
            );

            let mut request = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes.to_vec())
                .timeout(timeout);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response.text().await.map_err(|e| {
                            ClassificationError::InvalidResponse(format!(
                                "failed to read response body: {e}"
                            ))
                        })?;
                        return serde_json::from_str(&body).map_err(|e| {
                            ClassificationError::InvalidResponse(format!(
                                "unexpected JSON from model: {e}"
                            ))
                        });
                    } else if status.is_server_error() && attempt < retry_attempts {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "Model server returned server error, retrying..."
                        );
                        last_error = Some(format!("server error: {status}"));
                        backoff(attempt).await;
                        continue;
                    } else if status.is_client_error() {
                        return Err(ClassificationError::CorruptImage(format!(
                            "model rejected image with status {status}"
                        )));
                    } else {
                        return Err(ClassificationError::ModelUnavailable(format!(
                            "model failed with status {status}"
                        )));
                    }
                }
                Err(e) if e.is_timeout() => {
                    return Err(ClassificationError::Timeout(self.config.timeout_ms));
                }
                Err(e) if attempt < retry_attempts => {
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        "Model server network error, retrying..."
                    );
                    last_error = Some(format!("network error: {e}"));
                    backoff(attempt).await;
                    continue;
                }
                Err(e) => {
                    return Err(ClassificationError::ModelUnavailable(e.to_string()));
                }
            }
        }

        Err(ClassificationError::ModelUnavailable(
            last_error.unwrap_or_else(|| "all attempts failed".to_string()),
        ))
    }
}

/// Delay before retry number `attempt` (0-based): 100ms·2^attempt
fn backoff_delay(attempt: usize) -> Duration {
    let factor = 2_u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
    Duration::from_millis(100_u64.saturating_mul(factor))
}

async fn backoff(attempt: usize) {
    tokio::time::sleep(backoff_delay(attempt)).await;
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(
        &self,
        image: &UploadedImage,
    ) -> Result<ClassificationTag, ClassificationError> {
        let format = inspect_image(image.bytes(), &self.config.allowed_formats)?;
        debug!(format, size = image.len(), "Image accepted for classification");

        let response = self.call_model(image.bytes()).await?;
        let tag = ClassificationTag::parse(&response.label)?;

        info!(
            label = %tag,
            confidence = response.confidence,
            "Received label from classification model"
        );

        Ok(tag)
    }

    async fn health_check(&self) -> Result<(), ClassificationError> {
        let url = self.config.resolved_health_url()?;
        let response = self
            .client
            .get(&url)
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| ClassificationError::ModelUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClassificationError::ModelUnavailable(format!(
                "health endpoint returned {}",
                response.status()
            )))
        }
    }
}
