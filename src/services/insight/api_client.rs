use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use super::{InsightProvider, EMPTY_RESPONSE_INSIGHT, FAILURE_INSIGHT, INSIGHT_PROMPT};
use crate::core::config::InsightConfig;
use crate::core::errors::{InsightError, InsightResult};
use crate::utils::{InsightOutcome, Metrics};

const DEFAULT_MIME: &str = "image/jpeg";
const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_LOGGED_BODY: usize = 500;

/// Gemini `generateContent` client producing one insight per image
pub struct GeminiInsightClient {
    config: InsightConfig,
    http_client: reqwest::Client,
    metrics: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GeminiInsightClient {
    /// Create a client from an explicit configuration
    pub fn new(config: InsightConfig, metrics: Option<Metrics>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
            metrics,
        })
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// Send one insight request.
    ///
    /// `Ok(None)` means the model answered but produced no text.
    #[instrument(skip(self, data_url), fields(model = %self.config.model))]
    pub async fn request_insight(&self, data_url: &str) -> InsightResult<Option<String>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(InsightError::MissingApiKey)?;

        // The key travels in a header so it never shows up in error URLs
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let request_body = self.build_request_body(data_url);

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| InsightError::Request(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InsightError::Request(e.without_url()))?;

        if !status.is_success() {
            return Err(InsightError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_LOGGED_BODY).collect(),
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| InsightError::InvalidResponse(e.to_string()))?;

        let text = extract_text(&parsed);
        debug!(
            "Insight response: {} candidates, {} chars",
            parsed.candidates.len(),
            text.as_deref().map(str::len).unwrap_or(0)
        );
        Ok(text)
    }

    fn build_request_body(&self, data_url: &str) -> serde_json::Value {
        let (mime_type, data) = split_data_url(data_url);

        serde_json::json!({
            "contents": [{
                "parts": [
                    {"text": INSIGHT_PROMPT},
                    {
                        "inline_data": {
                            "mime_type": mime_type,
                            "data": data
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "topK": self.config.top_k,
                "topP": self.config.top_p
            }
        })
    }
}

impl InsightProvider for GeminiInsightClient {
    async fn get_insight(&self, data_url: &str, display_name: &str) -> String {
        let start = Instant::now();

        let (outcome, text) = match self.request_insight(data_url).await {
            Ok(Some(text)) => (InsightOutcome::Model, text),
            Ok(None) => {
                debug!("Empty insight for {}, using default", display_name);
                (InsightOutcome::EmptyFallback, EMPTY_RESPONSE_INSIGHT.to_string())
            }
            Err(e) => {
                warn!("Insight request for {} failed: {}", display_name, e);
                (InsightOutcome::ErrorFallback, FAILURE_INSIGHT.to_string())
            }
        };

        if let Some(ref m) = self.metrics {
            m.record_insight(outcome, start.elapsed());
        }

        text
    }
}

/// Split a data URL into (mime type, base64 payload).
///
/// Strings without a comma are treated as a bare JPEG payload.
pub fn split_data_url(data_url: &str) -> (&str, &str) {
    match data_url.split_once(',') {
        Some((header, payload)) if !payload.is_empty() => {
            let mime = header
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .filter(|mime| !mime.is_empty())
                .unwrap_or(DEFAULT_MIME);
            (mime, payload)
        }
        _ => (DEFAULT_MIME, data_url),
    }
}

/// Text parts of the first candidate, joined; `None` when there is no text
fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    let text: String = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter(|part| !part.thought)
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_split_data_url() {
        assert_eq!(
            split_data_url("data:image/jpeg;base64,QUJD"),
            ("image/jpeg", "QUJD")
        );
        assert_eq!(split_data_url("data:image/png;base64,QUJD"), ("image/png", "QUJD"));
        assert_eq!(split_data_url("QUJD"), ("image/jpeg", "QUJD"));
        assert_eq!(split_data_url("data:;base64,QUJD"), ("image/jpeg", "QUJD"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"PNG keeps edges crisp. "},{"text":"It also supports alpha."}]}}]}"#,
        );
        assert_eq!(
            extract_text(&response).as_deref(),
            Some("PNG keeps edges crisp. It also supports alpha.")
        );
    }

    #[test]
    fn test_extract_text_skips_thoughts() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true},{"text":"Answer."}]}}]}"#,
        );
        assert_eq!(extract_text(&response).as_deref(), Some("Answer."));
    }

    #[test]
    fn test_extract_text_empty() {
        assert!(extract_text(&parse(r#"{}"#)).is_none());
        assert!(extract_text(&parse(r#"{"candidates":[]}"#)).is_none());
        assert!(extract_text(&parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#)).is_none());
        assert!(extract_text(&parse(r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#)).is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let client = GeminiInsightClient::new(InsightConfig::new("key"), None).unwrap();
        let body = client.build_request_body("data:image/jpeg;base64,QUJD");

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], INSIGHT_PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "QUJD");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((body["generationConfig"]["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_key_falls_back() {
        let mut config = InsightConfig::new("unused");
        config.api_key = None;
        let metrics = Metrics::new();
        let client = GeminiInsightClient::new(config, Some(metrics.clone())).unwrap();

        assert!(matches!(
            client.request_insight("QUJD").await,
            Err(InsightError::MissingApiKey)
        ));
        assert_eq!(client.get_insight("QUJD", "a.jpg").await, FAILURE_INSIGHT);
        assert_eq!(metrics.snapshot().insight_error_fallback, 1);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_key() {
        let mut config =
            InsightConfig::new("SECRET-KEY-123").with_base_url("http://127.0.0.1:1/v1beta");
        config.timeout = Duration::from_secs(5);
        let client = GeminiInsightClient::new(config, None).unwrap();

        let err = client.request_insight("QUJD").await.unwrap_err();

        assert!(matches!(err, InsightError::Request(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        assert!(!format!("{:?}", err).contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back() {
        let mut config = InsightConfig::new("key").with_base_url("http://127.0.0.1:1/v1beta");
        config.timeout = Duration::from_secs(5);
        let client = GeminiInsightClient::new(config, None).unwrap();

        let text = client.get_insight("data:image/jpeg;base64,QUJD", "a.jpg").await;
        assert_eq!(text, FAILURE_INSIGHT);
    }
}
