//! Error types for sessions and image service calls.

use std::time::Duration;

/// Message shown when a failure carries no text of its own.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Maximum length of an upstream error body kept in an error message.
#[cfg(feature = "gemini")]
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Missing-input failures detected before any external call.
///
/// The display strings are shown to the user verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Visualize needs both the environment and the model image.
    #[error("Please upload both an environment and a model image.")]
    MissingVisualizeImages,

    /// Edit has neither a produced image nor an uploaded one.
    #[error("Please upload an image to edit.")]
    MissingEditImage,

    /// Edit has no prompt.
    #[error("Please enter a prompt to edit the image.")]
    MissingEditPrompt,

    /// Generate has no prompt.
    #[error("Please enter a prompt to generate an image.")]
    MissingGeneratePrompt,

    /// Analyze has no uploaded image.
    #[error("Please upload an image to analyze.")]
    MissingAnalyzeImage,

    /// Analyze has no prompt.
    #[error("Please enter a prompt to analyze the image.")]
    MissingAnalyzePrompt,
}

/// Errors that can occur while running a session or calling the image service.
#[derive(Debug, thiserror::Error)]
pub enum DekovizError {
    /// A required input is missing for the current mode.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A run is already in flight for this session.
    #[error("a request is already in progress")]
    Busy,

    /// Data URI could not be parsed.
    #[error("Invalid data URL: {0}")]
    InvalidDataUri(String),

    /// File is not a recognized image.
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Billing is not enabled for the API key.
    #[error("billing error: {0}")]
    Billing(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay suggested by the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The service answered, but not with what was asked for.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network or HTTP error.
    #[cfg(feature = "gemini")]
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading or saving a file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DekovizError {
    /// Returns true if this error was raised before any external call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the message to surface to the user.
    ///
    /// Errors whose upstream detail is blank collapse to
    /// [`UNKNOWN_ERROR_MESSAGE`].
    pub fn user_message(&self) -> String {
        let detail = match self {
            Self::Auth(m)
            | Self::Billing(m)
            | Self::ContentBlocked(m)
            | Self::InvalidRequest(m)
            | Self::UnexpectedResponse(m)
            | Self::Decode(m)
            | Self::Api { message: m, .. } => Some(m.as_str()),
            _ => None,
        };
        match detail {
            Some(m) if m.trim().is_empty() => UNKNOWN_ERROR_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type alias for dekoviz operations.
pub type Result<T> = std::result::Result<T, DekovizError>;

/// Reads a `Retry-After` header expressed in seconds.
#[cfg(feature = "gemini")]
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Redacts API keys from an upstream error body and bounds its length.
#[cfg(feature = "gemini")]
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            if word.contains("AIza") || word.contains("key=") {
                "[REDACTED]".to_string()
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.join(" ");

    if joined.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = joined.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::MissingVisualizeImages.to_string(),
            "Please upload both an environment and a model image."
        );
        assert_eq!(
            ValidationError::MissingGeneratePrompt.to_string(),
            "Please enter a prompt to generate an image."
        );

        let err: DekovizError = ValidationError::MissingAnalyzeImage.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Please upload an image to analyze.");
    }

    #[test]
    fn test_error_display() {
        let err = DekovizError::Api {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Not found");

        let err = DekovizError::ContentBlocked("Safety filter triggered".into());
        assert_eq!(err.to_string(), "content blocked: Safety filter triggered");
    }

    #[test]
    fn test_user_message_falls_back_when_empty() {
        let err = DekovizError::Api {
            status: 500,
            message: "  ".into(),
        };
        assert_eq!(err.user_message(), UNKNOWN_ERROR_MESSAGE);

        let err = DekovizError::Auth("Invalid API key".into());
        assert_eq!(err.user_message(), "authentication failed: Invalid API key");

        let err = DekovizError::Validation(ValidationError::MissingEditPrompt);
        assert_eq!(err.user_message(), "Please enter a prompt to edit the image.");
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn test_parse_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(30));

        headers.insert(
            reqwest::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn test_sanitize_error_message() {
        let text = "bad request for key=AIzaSyExample please retry";
        assert_eq!(
            sanitize_error_message(text),
            "bad request for [REDACTED] please retry"
        );

        let long = "x".repeat(600);
        let sanitized = sanitize_error_message(&long);
        assert!(sanitized.ends_with("..."));
        assert_eq!(sanitized.len(), 503);
    }
}
