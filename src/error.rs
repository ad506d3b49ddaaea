use thiserror::Error;

/// Everything that can go wrong between receiving image bytes and handing
/// back a scored field record.
///
/// The retryable variants (`QuotaExceeded`, `AuthFailure`) drive credential
/// rotation in the dispatcher; everything else is surfaced to the caller
/// as-is. No variant is ever allowed to escape as a panic — every public
/// entry point returns `Result<_, ExtractionError>`.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Could not identify the drawing type from model response: {0}")]
    UnclassifiedDrawing(String),

    #[error("Unknown drawing category: {0}")]
    UnknownCategory(String),

    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Malformed request rejected by API: {0}")]
    BadRequest(String),

    #[error("Request forbidden by API: {0}")]
    Forbidden(String),

    #[error("API returned error (status {status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("All credentials exhausted")]
    AllCredentialsExhausted,

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Network timeout after {0}s")]
    NetworkTimeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No API credentials configured")]
    NoCredentials,

    #[error("No record found for drawing: {0}")]
    RecordNotFound(String),
}

impl ExtractionError {
    /// Retryable errors trigger credential rotation in the dispatcher.
    ///
    /// 401 rotates too: a bad or expired token on one key should not abort
    /// the whole pipeline when another key may still work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_) | Self::AuthFailure(_))
    }
}
