//! HTTP client for the remote vision-language model.
//!
//! One POST per call to a chat-completions endpoint: a single user message
//! carrying one text instruction block and one base64 JPEG data URL. The
//! success path requires HTTP 200 and a non-empty
//! `choices[0].message.content`; anything else maps onto the error
//! taxonomy so the dispatcher can decide whether to rotate credentials.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::ExtractionError;

/// Seam between the pipeline and the remote model. Production code uses
/// [`OpenRouterClient`]; tests script a [`MockVisionClient`].
pub trait VisionClient {
    /// Send one instruction + image round-trip with the given bearer token
    /// and return the model's text content.
    fn complete(
        &self,
        token: &str,
        instruction: &str,
        image_data_url: &str,
    ) -> Result<String, ExtractionError>;
}

/// Encode raw image bytes as the JPEG data URL the API expects.
pub fn encode_image(image_bytes: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(image_bytes)
    )
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: &'a str },
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

// ──────────────────────────────────────────────
// OpenRouterClient
// ──────────────────────────────────────────────

/// Blocking chat-completions client.
pub struct OpenRouterClient {
    config: ApiConfig,
    client: reqwest::blocking::Client,
}

impl OpenRouterClient {
    pub fn new(config: ApiConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn map_status(status: u16, body: String) -> ExtractionError {
        // Quota wording in the body is retryable whatever the status code;
        // some providers report limits under odd statuses.
        if status == 429 || is_quota_message(&body) {
            return ExtractionError::QuotaExceeded(body);
        }
        match status {
            401 => ExtractionError::AuthFailure(body),
            400 => ExtractionError::BadRequest(body),
            403 => ExtractionError::Forbidden(body),
            _ => ExtractionError::ServerError { status, body },
        }
    }
}

/// Some providers return HTTP 200 with an error object instead of a
/// status code. Quota wording in that message still has to rotate keys.
fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("rate limit")
}

impl VisionClient for OpenRouterClient {
    fn complete(
        &self,
        token: &str,
        instruction: &str,
        image_data_url: &str,
    ) -> Result<String, ExtractionError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text { text: instruction },
                    ContentPart::ImageUrl { image_url: image_data_url },
                ],
            }],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::NetworkTimeout(self.config.timeout_secs)
                } else {
                    ExtractionError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        if status != 200 {
            return Err(Self::map_status(status, text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

        if let Some(err) = parsed.error {
            let message = err.message.unwrap_or_default();
            if is_quota_message(&message) {
                return Err(ExtractionError::QuotaExceeded(message));
            }
            return Err(ExtractionError::ServerError { status, body: message });
        }

        let content = parsed
            .choices
            .and_then(|mut c| if c.is_empty() { None } else { c.remove(0).message.content })
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ExtractionError::MalformedResponse("missing choices[0].message.content".into())
            })?;

        Ok(content)
    }
}

// ──────────────────────────────────────────────
// MockVisionClient
// ──────────────────────────────────────────────

/// Scripted client for tests — pops pre-canned results in order and
/// records every call it receives.
pub struct MockVisionClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, ExtractionError>>>,
    pub calls: std::sync::Mutex<Vec<MockCall>>,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub token: String,
    pub instruction: String,
}

impl MockVisionClient {
    pub fn new(responses: Vec<Result<String, ExtractionError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Convenience: always succeed with the same text.
    pub fn always(text: &str) -> Self {
        Self::new((0..16).map(|_| Ok(text.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl VisionClient for MockVisionClient {
    fn complete(
        &self,
        token: &str,
        instruction: &str,
        _image_data_url: &str,
    ) -> Result<String, ExtractionError> {
        self.calls.lock().unwrap().push(MockCall {
            token: token.to_string(),
            instruction: instruction.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExtractionError::Network("mock script exhausted".into())))
    }
}
