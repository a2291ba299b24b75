//! Pre-chunking text normalization.
//!
//! Whitespace is always collapsed. An optional language-model pass can
//! rewrite the text for narration (numbers, abbreviations, symbols). The
//! model pass is best-effort: any failure falls back to the input text.

use async_trait::async_trait;

/// Collapse every run of whitespace to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rewrites text before it is chunked.
///
/// Implementations never fail; on error they return the input unchanged.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, text: &str) -> String;

    fn name(&self) -> &str;
}

/// Pass-through normalizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityNormalizer;

#[async_trait]
impl Normalizer for IdentityNormalizer {
    async fn normalize(&self, text: &str) -> String {
        text.to_string()
    }

    fn name(&self) -> &str {
        "identity"
    }
}

#[cfg(feature = "http")]
pub use chat::ChatNormalizer;

#[cfg(feature = "http")]
mod chat {
    use super::Normalizer;
    use crate::config::NormalizerConfig;
    use crate::error::{NarratorError, Result};
    use async_trait::async_trait;
    use std::time::Duration;

    const SYSTEM_PROMPT: &str = "You prepare written text to be read aloud by a speech \
synthesizer. Spell out numbers, dates, times, currency and units as words. Expand \
abbreviations and symbols into their spoken form. Keep every sentence, its order and \
its meaning. Do not summarize, translate or add commentary. Reply with the rewritten \
text only.";

    /// Normalizer backed by an OpenAI-compatible chat-completions endpoint.
    pub struct ChatNormalizer {
        client: reqwest::Client,
        base_url: String,
        model: String,
        api_key: Option<String>,
    }

    impl ChatNormalizer {
        /// Build from config. The API key is read from the configured
        /// environment variable; without a key every call is a pass-through.
        pub fn from_config(config: &NormalizerConfig) -> Result<Self> {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty());
            if api_key.is_none() {
                log::warn!(
                    "{} is not set; text normalization will pass text through",
                    config.api_key_env
                );
            }
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| NarratorError::Other(format!("Failed to build HTTP client: {e}")))?;
            Ok(Self {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                model: config.model.clone(),
                api_key,
            })
        }

        async fn request(&self, text: &str, api_key: &str) -> Result<String> {
            let words = text.split_whitespace().count();
            let body = serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": text },
                ],
                "temperature": 0.1,
                "max_tokens": words * 2 + 500,
            });

            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| NarratorError::Normalization {
                    message: format!("request failed: {e}"),
                })?;

            if !response.status().is_success() {
                return Err(NarratorError::Normalization {
                    message: format!("server returned status {}", response.status()),
                });
            }

            let value: serde_json::Value = response.json().await.map_err(|e| {
                NarratorError::Normalization {
                    message: format!("unreadable response: {e}"),
                }
            })?;

            parse_completion(&value)
        }
    }

    pub(super) fn parse_completion(value: &serde_json::Value) -> Result<String> {
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(NarratorError::Normalization {
                message: "response has no content".to_string(),
            });
        }
        Ok(content.to_string())
    }

    #[async_trait]
    impl Normalizer for ChatNormalizer {
        async fn normalize(&self, text: &str) -> String {
            let Some(api_key) = self.api_key.as_deref() else {
                return text.to_string();
            };
            match self.request(text, api_key).await {
                Ok(rewritten) => rewritten,
                Err(e) => {
                    log::warn!("normalization skipped: {e}");
                    text.to_string()
                }
            }
        }

        fn name(&self) -> &str {
            &self.model
        }
    }
}
