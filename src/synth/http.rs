//! Generation resource reached over HTTP.
//!
//! The server exposes `POST /generate` taking JSON and answering with a WAV
//! body. Reference audio travels as base64-encoded WAV.

use crate::audio::Waveform;
use crate::config::GenerationConfig;
use crate::error::{NarratorError, Result};
use crate::synth::{SynthesisRequest, Synthesizer};
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use std::time::Duration;

/// Token budget for a text: room for the words plus generous headroom for
/// slow speech, capped so a runaway generation still terminates.
pub fn max_new_tokens(text: &str) -> usize {
    let estimate = text.len() / 3;
    estimate + (estimate * 10).min(2000) + 256
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_audio: Option<String>,
    temperature: f32,
    top_p: f32,
    max_new_tokens: usize,
}

pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| NarratorError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn encode_reference(reference: Option<&Waveform>) -> Result<Option<String>> {
    reference
        .map(|wave| {
            wave.to_wav_bytes()
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
        })
        .transpose()
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Waveform> {
        let body = GenerateBody {
            text: &request.text,
            reference_audio: encode_reference(request.reference.as_ref())?,
            temperature: request.temperature,
            top_p: request.top_p,
            max_new_tokens: max_new_tokens(&request.text),
        };

        let response = self
            .client
            .post(format!("{}/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| NarratorError::Generation {
                message: format!("Request to {} failed: {e}", self.endpoint),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NarratorError::Generation {
                message: format!("Server returned status {status}: {}", detail.trim()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| NarratorError::Generation {
            message: format!("Failed to read audio response: {e}"),
        })?;
        if bytes.is_empty() {
            return Err(NarratorError::EmptyAudio);
        }
        Waveform::from_wav_bytes(&bytes)
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}
