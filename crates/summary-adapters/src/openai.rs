//! OpenAI-style chat-completions `SummaryProvider`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use domains::error::ProviderError;
use domains::ports::{SummaryProvider, SummaryRequest, SummaryResponse};

use crate::instruction;

pub struct OpenAiSummarizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiSummarizer {
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

/// Pulls the summary out of a chat-completions response body.
/// `finish_reason == "length"` means the model hit its token cap, i.e. the
/// summary is truncated.
fn parse_chat_completion(body: &Value) -> Result<SummaryResponse, ProviderError> {
    let summary = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))?
        .trim();
    if summary.is_empty() {
        return Err(ProviderError::Malformed("empty completion".into()));
    }
    let truncated = body
        .pointer("/choices/0/finish_reason")
        .and_then(Value::as_str)
        == Some("length");
    Ok(SummaryResponse {
        summary: summary.to_string(),
        truncated,
    })
}

#[async_trait]
impl SummaryProvider for OpenAiSummarizer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<SummaryResponse, ProviderError> {
        let Some(key) = self.api_key.as_ref() else {
            return Err(ProviderError::Unavailable);
        };

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": instruction(request.subject, request.max_chars) },
                { "role": "user", "content": request.content },
            ],
            "temperature": 0.2,
        });

        debug!(model = %self.model, subject = ?request.subject, "requesting chat completion");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::QuotaExceeded);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!("http {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_chat_completion(&body)
    }
}
