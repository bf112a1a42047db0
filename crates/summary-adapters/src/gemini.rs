//! Gemini-style generateContent `SummaryProvider`.
//!
//! Same port, different wire vocabulary: key goes in the query string,
//! prompts travel as `contents/parts`, errors come back in a structured
//! envelope with a gRPC-style status string.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use domains::error::ProviderError;
use domains::ports::{SummaryProvider, SummaryRequest, SummaryResponse};

use crate::instruction;

pub struct GeminiSummarizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl GeminiSummarizer {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

/// Maps the Gemini error envelope onto the port's error vocabulary.
fn classify_error(status: StatusCode, body: &Value) -> ProviderError {
    let grpc_status = body.pointer("/error/status").and_then(Value::as_str);
    if status == StatusCode::TOO_MANY_REQUESTS || grpc_status == Some("RESOURCE_EXHAUSTED") {
        return ProviderError::QuotaExceeded;
    }
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    ProviderError::Request(format!("http {status}: {message}"))
}

/// Concatenates the text parts of the first candidate.
/// `finishReason == "MAX_TOKENS"` marks a truncated summary.
fn parse_candidates(body: &Value) -> Result<SummaryResponse, ProviderError> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed("missing candidates[0].content.parts".into()))?;

    let summary: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    let summary = summary.trim().to_string();
    if summary.is_empty() {
        return Err(ProviderError::Malformed("candidate has no text parts".into()));
    }

    let truncated = body
        .pointer("/candidates/0/finishReason")
        .and_then(Value::as_str)
        == Some("MAX_TOKENS");
    Ok(SummaryResponse { summary, truncated })
}

#[async_trait]
impl SummaryProvider for GeminiSummarizer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<SummaryResponse, ProviderError> {
        let Some(key) = self.api_key.as_ref() else {
            return Err(ProviderError::Unavailable);
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            key.expose_secret(),
        );
        let prompt = format!(
            "{}\n\n{}",
            instruction(request.subject, request.max_chars),
            request.content
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 },
        });

        debug!(model = %self.model, subject = ?request.subject, "requesting content generation");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            return Err(classify_error(status, &body));
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_candidates(&body)
    }
}
