//! Voice selector configuration.

/// Endpoint injected by `voicerag build` for the active mode.
pub const API_ENDPOINT: Option<&str> = option_env!("VOICERAG_API_ENDPOINT");

/// Options recognized by [`crate::components::voice_selector::VoiceSelector`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceSelectorConfig {
    /// Backend origin, e.g. `https://voicerag.example.com`. Empty means
    /// the page's own origin.
    pub api_base_url: String,
}

impl VoiceSelectorConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
        }
    }

    /// Configuration baked in at compile time.
    pub fn from_build_env() -> Self {
        Self::new(API_ENDPOINT.unwrap_or_default())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }
}
