//! Error types for scene generation.

use std::time::Duration;

/// Fallback description when an error carries no usable message.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "There was an error generating your image. Please try again.";

/// Maximum length of an error message surfaced from a remote service.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating or editing a scene.
#[derive(Debug, thiserror::Error)]
pub enum TimeLensError {
    /// No API credential has been configured.
    #[error("an API key is required to generate images")]
    MissingCredential,

    /// An era edit was requested before a modern base image exists.
    #[error("generate a modern scene first")]
    MissingBaseImage,

    /// A download was requested before any image was displayed.
    #[error("no image to download yet")]
    MissingImage,

    /// API key rejected by the service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the service.
        message: String,
    },

    /// Account has no remaining quota or billing is disabled.
    #[error("billing error: {0}")]
    Billing(String),

    /// Rate limit exceeded.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Delay suggested by the service, if any.
        retry_after: Option<Duration>,
        /// Message reported by the service.
        message: String,
    },

    /// The service did not answer within the request timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The service answered successfully but without an image.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving a file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or credential file could not be read or written.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification of failures as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No credential configured; no network call was made.
    MissingCredential,
    /// No modern base image to edit; no network call was made.
    MissingBaseImage,
    /// Nothing is displayed, so there is nothing to download.
    MissingImage,
    /// The service answered with a structured error.
    Service,
    /// The call failed before or without a structured response.
    Transport,
}

impl TimeLensError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::MissingBaseImage => ErrorKind::MissingBaseImage,
            Self::MissingImage => ErrorKind::MissingImage,
            Self::Auth(_)
            | Self::Api { .. }
            | Self::Billing(_)
            | Self::RateLimited { .. }
            | Self::ContentBlocked(_)
            | Self::InvalidRequest(_)
            | Self::UnexpectedResponse(_) => ErrorKind::Service,
            Self::Timeout(_)
            | Self::Network(_)
            | Self::Decode(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_) => ErrorKind::Transport,
        }
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            Self::Timeout(_) => Some(Duration::from_secs(1)),
            Self::Network(_) => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// The most specific message available, suitable for a user notification.
    ///
    /// Service-reported messages are passed through verbatim.
    pub fn notification_message(&self) -> String {
        let message = match self {
            Self::Api { message, .. }
            | Self::RateLimited { message, .. }
            | Self::Auth(message)
            | Self::Billing(message)
            | Self::ContentBlocked(message)
            | Self::InvalidRequest(message)
            | Self::UnexpectedResponse(message) => message.clone(),
            Self::MissingCredential => {
                "Please set your API key before generating a scene.".to_string()
            }
            Self::MissingBaseImage => {
                "Generate a modern scene first, then travel to another era.".to_string()
            }
            Self::MissingImage => "Generate a scene before downloading it.".to_string(),
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        }
    }
}

/// Result type alias for scene generation operations.
pub type Result<T> = std::result::Result<T, TimeLensError>;

/// Parses a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Extracts the service message from a JSON error body, if it has one.
///
/// Both Google and OpenAI wrap errors as `{"error": {"message": "..."}}`;
/// some proxies send `{"error": "..."}` instead.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other.get("message")?.as_str()?.to_string(),
    };
    (!message.trim().is_empty()).then_some(message)
}

/// Redacts API keys and caps the length of a service error message.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            let token = word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-');
            if looks_like_api_key(token) {
                word.replace(token, "[REDACTED]")
            } else {
                word.to_string()
            }
        })
        .collect();
    let mut message = redacted.join(" ");
    if message.chars().count() > MAX_ERROR_MESSAGE_LEN {
        message = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        message.push_str("...");
    }
    message
}

fn looks_like_api_key(token: &str) -> bool {
    (token.starts_with("sk-") && token.len() > 12) || (token.starts_with("AIza") && token.len() > 30)
}
