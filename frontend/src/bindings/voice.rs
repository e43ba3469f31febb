use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::VoiceSelectorConfig;

// ============================================================================
// Wire Types
// ============================================================================

/// Response of `GET /api/available-voices`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableVoices {
    pub voices: Vec<String>,
}

/// Request body of `POST /api/voice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChoice {
    pub voice: String,
}

pub const AVAILABLE_VOICES_PATH: &str = "/api/available-voices";
pub const VOICE_PATH: &str = "/api/voice";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

// ============================================================================
// Client
// ============================================================================

/// HTTP bindings for the voice endpoints of the backend.
#[derive(Debug, Clone)]
pub struct VoiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl VoiceClient {
    pub fn new(config: &VoiceSelectorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: resolve_base(config.base_url()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Voice names in backend order.
    pub async fn available_voices(&self) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint(AVAILABLE_VOICES_PATH);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: AvailableVoices = response
            .json()
            .await
            .map_err(|source| ApiError::Decode {
                url: url.clone(),
                source,
            })?;
        Ok(body.voices)
    }

    /// Persist the chosen voice. The response body is ignored.
    pub async fn update_voice(&self, voice: &str) -> Result<(), ApiError> {
        let url = self.endpoint(VOICE_PATH);
        let response = self
            .http
            .post(&url)
            .json(&VoiceChoice {
                voice: voice.to_string(),
            })
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// An empty base resolves to the page origin in the browser.
fn resolve_base(base: &str) -> String {
    #[cfg(target_arch = "wasm32")]
    if base.is_empty() {
        if let Some(origin) = web_sys::window().and_then(|w| w.location().origin().ok()) {
            return origin;
        }
    }
    base.to_string()
}
