//! Engine configuration from the environment
//!
//! `LLM_API_KEY` / `LLM_BASE_URL` / `LLM_MODEL` configure the provider;
//! `LOG_LEVEL` feeds the tracing filter. Session-specific settings come from
//! the JSON config file instead (see `aeonisk_shared::SessionConfig`).

use std::path::Path;

use crate::error::SessionError;
use aeonisk_shared::SessionConfig;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model when neither env nor config names one.
pub const DEFAULT_MODEL: &str = "qwen2.5:32b";

/// Provider configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Transport timeout per LLM request, seconds.
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url =
            std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            api_key,
            base_url,
            model,
            request_timeout_secs: 120,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Load and validate a session config file.
pub fn load_session_config(path: &Path) -> Result<SessionConfig, SessionError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SessionError::Config(format!("cannot read {}: {e}", path.display())))?;
    Ok(SessionConfig::from_json_str(&raw)?)
}
