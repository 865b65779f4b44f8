//! LLM classifier collaborator.
//!
//! Given a business name and description, the external model resolves a
//! business type and proposes competitor URLs to analyze. The collaborator
//! is treated as unreliable by contract: malformed JSON, missing fields,
//! and markdown-fenced payloads are expected inputs, not exceptional ones.
//! Callers (the planner) degrade to an empty candidate list on error.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::ClassifierConfig;

/// Resolved classification for a business description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub business_type: String,
    pub competitor_urls: Vec<String>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, business_name: &str, description: &str) -> Result<Classification>;
}

/// HTTP client for an OpenAI-style chat-completions endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build classifier HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, business_name: &str, description: &str) -> Result<Classification> {
        let prompt = format!(
            "Classify this business and list competitor websites worth analyzing.\n\
             Business name: {}\nDescription: {}\n\
             Respond with JSON only: {{\"business_type\": string, \"competitor_urls\": [string]}}",
            business_name, description
        );

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "response_format": { "type": "json_object" }
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Classifier request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(500).collect();
            return Err(anyhow!("Classifier API error {}: {}", status, truncated));
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read classifier response body: {}", e))?;

        let wrapper: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| anyhow!("Failed to parse classifier response wrapper: {}", e))?;

        let content = wrapper["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("No content in classifier response"))?;

        let classification = parse_classification(content)?;
        info!(
            "classified '{}' as '{}' with {} competitor urls",
            business_name,
            classification.business_type,
            classification.competitor_urls.len()
        );
        Ok(classification)
    }
}

#[derive(Deserialize)]
struct RawClassification {
    business_type: String,
    #[serde(default)]
    competitor_urls: Vec<serde_json::Value>,
}

/// Parse the model's raw text output into a [`Classification`].
///
/// Tolerates markdown code fences and non-string entries in the URL array;
/// entries that are not http(s) URLs are dropped.
pub fn parse_classification(text: &str) -> Result<Classification> {
    let cleaned = strip_markdown_json(text);
    let raw: RawClassification = serde_json::from_str(&cleaned)
        .map_err(|e| anyhow!("Classifier output is not the expected JSON shape: {}", e))?;

    let competitor_urls = raw
        .competitor_urls
        .into_iter()
        .filter_map(|value| value.as_str().map(|s| s.trim().to_string()))
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .collect();

    Ok(Classification {
        business_type: raw.business_type,
        competitor_urls,
    })
}

/// Strip markdown code fences from model output if present. Some providers
/// wrap JSON in ```json ... ``` even when asked not to.
fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let after_open = match trimmed.find('\n') {
            Some(pos) => &trimmed[pos + 1..],
            None => trimmed,
        };
        let cleaned = after_open.trim_end();
        if let Some(stripped) = cleaned.strip_suffix("```") {
            stripped.trim().to_string()
        } else {
            cleaned.to_string()
        }
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let out = parse_classification(
            r#"{"business_type": "florist", "competitor_urls": ["https://a.test", "https://b.test"]}"#,
        )
        .unwrap();
        assert_eq!(out.business_type, "florist");
        assert_eq!(out.competitor_urls.len(), 2);
    }

    #[test]
    fn parses_fenced_json() {
        let out = parse_classification(
            "```json\n{\"business_type\": \"bakery\", \"competitor_urls\": [\"https://c.test\"]}\n```",
        )
        .unwrap();
        assert_eq!(out.business_type, "bakery");
        assert_eq!(out.competitor_urls, vec!["https://c.test"]);
    }

    #[test]
    fn drops_non_url_entries() {
        let out = parse_classification(
            r#"{"business_type": "cafe", "competitor_urls": ["https://ok.test", 42, "not a url", null]}"#,
        )
        .unwrap();
        assert_eq!(out.competitor_urls, vec!["https://ok.test"]);
    }

    #[test]
    fn missing_urls_field_defaults_to_empty() {
        let out = parse_classification(r#"{"business_type": "gym"}"#).unwrap();
        assert!(out.competitor_urls.is_empty());
    }

    #[test]
    fn malformed_output_is_an_error_not_a_panic() {
        assert!(parse_classification("I think it's probably a florist?").is_err());
        assert!(parse_classification("{\"competitor_urls\": []}").is_err());
        assert!(parse_classification("").is_err());
    }
}
