//! API endpoint and credential configuration.
//!
//! Credentials come from the environment as a base key plus indexed
//! alternates (`API_KEY`, `API_KEY_2`, `API_KEY_3`, …). List order is the
//! rotation order. Missing all of them is a fatal startup condition —
//! there is nothing useful this system can do without at least one token.

use crate::error::ExtractionError;

/// Default chat-completions endpoint (OpenRouter).
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "qwen/qwen2.5-vl-72b-instruct:free";

/// Default per-request timeout. The upstream service can take a while on
/// large scans, but an unbounded wait hangs the whole pipeline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Environment variable holding the primary API key.
pub const API_KEY_VAR: &str = "API_KEY";

/// Remote API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Load the ordered credential list from the environment.
///
/// Reads `API_KEY`, then `API_KEY_2`, `API_KEY_3`, … until the first gap.
/// Blank values are skipped. Returns `NoCredentials` when nothing usable
/// is found.
pub fn load_credentials_from_env() -> Result<Vec<String>, ExtractionError> {
    let mut tokens = Vec::new();

    if let Ok(key) = std::env::var(API_KEY_VAR) {
        if !key.trim().is_empty() {
            tokens.push(key.trim().to_string());
        }
    }

    for index in 2.. {
        match std::env::var(format!("{API_KEY_VAR}_{index}")) {
            Ok(key) => {
                if !key.trim().is_empty() {
                    tokens.push(key.trim().to_string());
                }
            }
            Err(_) => break,
        }
    }

    if tokens.is_empty() {
        return Err(ExtractionError::NoCredentials);
    }

    tracing::info!(count = tokens.len(), "Loaded API credentials");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_openrouter() {
        let config = ApiConfig::default();
        assert!(config.endpoint.contains("openrouter.ai"));
        assert!(config.endpoint.ends_with("/chat/completions"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    // Environment loading itself is not unit-tested here: mutating process
    // env vars races with parallel tests. The empty-pool error path is
    // covered through CredentialPool::new in credentials.rs.
}
