//! rusty-forum/crates/configs/src/lib.rs
//!
//! Layered settings: compiled defaults, then an optional `rusty-forum.toml`,
//! then `RF__`-prefixed environment variables. Provider API keys are held
//! as secrets and never appear in Debug output. Defaults produce a fully
//! working offline configuration (summaries disabled).

use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Load(#[from] ConfigError),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub media: MediaSettings,
    pub summary: SummarySettings,
}

#[derive(Debug, Deserialize)]
pub struct MediaSettings {
    /// Root directory for stored uploads.
    pub root: String,
    /// Public URL prefix uploads are served under.
    pub url_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryBackend {
    /// No provider; auto-generation stays off, manual requests use the
    /// local extractive fallback.
    Disabled,
    Openai,
    Gemini,
}

impl SummaryBackend {
    pub fn default_base_url(self) -> &'static str {
        match self {
            SummaryBackend::Disabled | SummaryBackend::Openai => "https://api.openai.com/v1",
            SummaryBackend::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            SummaryBackend::Disabled | SummaryBackend::Openai => "gpt-4o-mini",
            SummaryBackend::Gemini => "gemini-1.5-flash",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummarySettings {
    pub backend: SummaryBackend,
    pub api_key: Option<SecretString>,
    /// Override; when absent the backend's own endpoint is used.
    pub base_url: Option<String>,
    /// Override; when absent the backend's default model is used.
    pub model: Option<String>,
    pub post_min_chars: usize,
    pub thread_min_comments: i64,
    pub max_summary_chars: usize,
}

impl SummarySettings {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.backend.default_base_url())
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let config = Config::builder()
            .set_default("media.root", "./data/media")?
            .set_default("media.url_prefix", "/media")?
            .set_default("summary.backend", "disabled")?
            .set_default("summary.post_min_chars", 200_i64)?
            .set_default("summary.thread_min_comments", 3_i64)?
            .set_default("summary.max_summary_chars", 480_i64)?
            .add_source(File::with_name("rusty-forum").required(false))
            .add_source(
                Environment::with_prefix("RF")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        debug!(backend = ?settings.summary.backend, "settings loaded");
        Ok(settings)
    }
}
