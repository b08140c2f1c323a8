//! Comment moderation through Google's Perspective API

use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::config::ContentSafetyConfig;

const PERSPECTIVE_URL: &str = "https://commentanalyzer.googleapis.com/v1alpha1/comments:analyze";

/// Attributes requested for every analysis
const ATTRIBUTES: [&str; 4] = ["TOXICITY", "THREAT", "IDENTITY_ATTACK", "INSULT"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(default)]
    attribute_scores: HashMap<String, AttributeScore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeScore {
    summary_score: SummaryScore,
}

#[derive(Debug, Deserialize)]
struct SummaryScore {
    value: f64,
}

/// Decides whether user-submitted text may be published
pub struct ContentSafetyService {
    client: reqwest::Client,
    endpoint: String,
    config: ContentSafetyConfig,
}

impl ContentSafetyService {
    pub fn new(config: ContentSafetyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: PERSPECTIVE_URL.to_string(),
            config,
        }
    }

    /// Analyze against another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn api_key(&self) -> Option<&str> {
        if !self.config.enabled {
            return None;
        }
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Whether the analysis is actually performed
    pub fn is_active(&self) -> bool {
        self.api_key().is_some()
    }

    /// `true` when `text` is safe to publish.
    ///
    /// Without an API key every text is safe. A failed request or a non-success
    /// status counts as unsafe.
    pub async fn is_safe(&self, text: &str) -> bool {
        let Some(key) = self.api_key() else {
            tracing::debug!("Content safety disabled, accepting text");
            return true;
        };

        let requested: serde_json::Map<String, serde_json::Value> = ATTRIBUTES
            .iter()
            .map(|a| (a.to_string(), json!({})))
            .collect();
        let body = json!({
            "comment": { "text": text },
            "requestedAttributes": requested,
            "languages": ["en", "sv"],
        });

        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Perspective request failed: {}", e);
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Perspective answered {}", response.status());
            return false;
        }

        match response.json::<AnalyzeResponse>().await {
            Ok(parsed) => is_below_threshold(&parsed, self.config.threshold),
            Err(e) => {
                tracing::warn!("Unreadable Perspective response: {}", e);
                false
            }
        }
    }
}

fn is_below_threshold(response: &AnalyzeResponse, threshold: f64) -> bool {
    response
        .attribute_scores
        .values()
        .all(|score| score.summary_score.value < threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse, routing::post, Router};

    async fn start_fake(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/analyze", addr)
    }

    fn enabled() -> ContentSafetyConfig {
        ContentSafetyConfig {
            enabled: true,
            api_key: Some("key".into()),
            threshold: 0.7,
        }
    }

    fn parse(json: &str) -> AnalyzeResponse {
        serde_json::from_str(json).expect("valid response")
    }

    #[test]
    fn test_threshold() {
        let safe = parse(
            r#"{"attributeScores":{"TOXICITY":{"summaryScore":{"value":0.2,"type":"PROBABILITY"}},
                "INSULT":{"summaryScore":{"value":0.69}}}}"#,
        );
        assert!(is_below_threshold(&safe, 0.7));

        let unsafe_text = parse(r#"{"attributeScores":{"THREAT":{"summaryScore":{"value":0.7}}}}"#);
        assert!(!is_below_threshold(&unsafe_text, 0.7));

        assert!(is_below_threshold(&parse("{}"), 0.7));
    }

    #[tokio::test]
    async fn test_without_key_everything_is_safe() {
        let service = ContentSafetyService::new(ContentSafetyConfig::default());
        assert!(!service.is_active());
        assert!(service.is_safe("vad som helst").await);
    }

    #[tokio::test]
    async fn test_disabled_ignores_key() {
        let service = ContentSafetyService::new(ContentSafetyConfig {
            enabled: false,
            api_key: Some("key".into()),
            threshold: 0.7,
        });
        assert!(!service.is_active());
        assert!(service.is_safe("text").await);
    }

    #[tokio::test]
    async fn test_error_status_counts_as_unsafe() {
        let app = Router::new().route(
            "/analyze",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
        );
        let service = ContentSafetyService::new(enabled()).with_endpoint(start_fake(app).await);
        assert!(service.is_active());
        assert!(!service.is_safe("hej").await);
    }

    #[tokio::test]
    async fn test_low_scores_are_safe() {
        let app = Router::new().route(
            "/analyze",
            post(|| async {
                axum::Json(json!({
                    "attributeScores": { "TOXICITY": { "summaryScore": { "value": 0.1 } } }
                }))
            }),
        );
        let service = ContentSafetyService::new(enabled()).with_endpoint(start_fake(app).await);
        assert!(service.is_safe("hej").await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_counts_as_unsafe() {
        let service = ContentSafetyService::new(enabled()).with_endpoint("http://127.0.0.1:9/analyze");
        assert!(!service.is_safe("hej").await);
    }
}
