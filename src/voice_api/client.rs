//! Remote inference client.
//!
//! [`HttpVoiceClient`] posts a recorded WAV buffer to `{base_url}/api/voice`
//! and parses the JSON reply `{ "message": string, "data"?: any }`.
//! All connection details come from [`VoiceApiConfig`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::VoiceApiConfig;

// ---------------------------------------------------------------------------
// VoiceApiError
// ---------------------------------------------------------------------------

/// Errors from a voice API round trip.  None are retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceApiError {
    /// The service answered with a non-2xx status.
    #[error("voice API returned {status}: {body}")]
    Remote { status: u16, body: String },

    /// The request was aborted after the configured timeout.
    #[error("voice API request timed out")]
    Timeout,

    /// Transport or connection error.
    #[error("voice API request failed: {0}")]
    Request(String),

    /// The 2xx body was not the expected JSON.
    #[error("failed to parse voice API response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for VoiceApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VoiceApiError::Timeout
        } else {
            VoiceApiError::Request(e.to_string())
        }
    }
}

/// Successful reply body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// InferenceClient trait
// ---------------------------------------------------------------------------

/// Sends one encoded recording to the remote service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn send_audio(&self, wav: Vec<u8>) -> Result<VoiceResponse, VoiceApiError>;
}

// ---------------------------------------------------------------------------
// HttpVoiceClient
// ---------------------------------------------------------------------------

pub struct HttpVoiceClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpVoiceClient {
    /// Build a client from config.  The per-request timeout comes from
    /// `config.timeout_ms`.
    pub fn from_config(config: &VoiceApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: format!("{}/api/voice", config.base_url.trim_end_matches('/')),
            token: config.token.clone().filter(|t| !t.is_empty()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceClient for HttpVoiceClient {
    async fn send_audio(&self, wav: Vec<u8>) -> Result<VoiceResponse, VoiceApiError> {
        log::debug!("voice-api: POST {} ({} bytes)", self.endpoint, wav.len());

        let mut req = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("voice-api: {status} from server");
            return Err(VoiceApiError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| VoiceApiError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockInferenceClient (tests only)
// ---------------------------------------------------------------------------

/// Returns a scripted reply after an optional delay and records each upload.
#[cfg(test)]
pub struct MockInferenceClient {
    reply: Result<VoiceResponse, VoiceApiError>,
    delay: Duration,
    uploads: std::sync::Mutex<Vec<Vec<u8>>>,
}

#[cfg(test)]
impl MockInferenceClient {
    pub fn replying(message: &str) -> Self {
        Self {
            reply: Ok(VoiceResponse {
                message: message.into(),
                data: Some(serde_json::json!({ "source": "mock" })),
            }),
            delay: Duration::ZERO,
            uploads: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: VoiceApiError) -> Self {
        Self {
            reply: Err(error),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn send_audio(&self, wav: Vec<u8>) -> Result<VoiceResponse, VoiceApiError> {
        self.uploads.lock().unwrap().push(wav);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
