//! Error types for grantscope operations.
//!
//! [`ExtractError`] is the crate-level error. Only two of its variants ever
//! reach a caller of the parse pipeline, and they arrive inside a failed
//! [`ParseResult`](crate::ParseResult) rather than as an `Err`:
//! [`ExtractError::InvalidUrl`] and [`ExtractError::FetchExhausted`].
//!
//! [`StrategyError`] is local to a single extraction strategy. The strategy
//! chain records it against the attempt and moves on to the next strategy.
//!
//! # Example
//!
//! ```rust
//! use grantscope_core::{ExtractError, Result};
//!
//! fn require_host(url: &url::Url) -> Result<&str> {
//!     url.host_str().ok_or_else(|| ExtractError::InvalidUrl("URL has no host".to_string()))
//! }
//! ```

use thiserror::Error;

/// Main error type for extraction operations.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The request URL could not be parsed or uses an unsupported scheme.
    ///
    /// Raised before any network call is made.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Every fetch attempt failed.
    ///
    /// Carries the number of attempts made and the last underlying error.
    #[error("Fetch failed after {attempts} attempt(s): {message}")]
    FetchExhausted { attempts: u32, message: String },

    /// Site profile files are missing or invalid.
    #[error("Profile error: {0}")]
    ProfileError(String),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single extraction strategy.
///
/// Never fatal to a parse: the chain records the message in the
/// corresponding [`StrategyAttempt`](crate::StrategyAttempt).
#[derive(Error, Debug)]
pub enum StrategyError {
    /// A CSS selector could not be compiled.
    #[error("Invalid selector: {0}")]
    Selector(String),

    /// A regular expression could not be compiled.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// JSON embedded in the page could not be decoded.
    #[error("Malformed embedded JSON: {0}")]
    EmbeddedJson(#[from] serde_json::Error),
}

/// Failure of a single HTTP attempt.
///
/// The fetcher retries on every variant and reports the last one inside
/// [`ExtractError::FetchExhausted`].
#[derive(Error, Debug)]
pub enum TransportError {
    /// No response within the profile timeout.
    #[error("Request timed out after {} ms", .0.as_millis())]
    Timeout(std::time::Duration),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// Connection-level failure reported by a transport.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client errors.
    #[cfg(feature = "fetch")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for ExtractError.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractError::InvalidUrl("not a url".to_string());
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_fetch_exhausted_carries_reason() {
        let err = ExtractError::FetchExhausted { attempts: 3, message: "connection refused".to_string() };
        let message = err.to_string();
        assert!(message.contains('3'));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_transport_timeout_message() {
        let err = TransportError::Timeout(std::time::Duration::from_secs(30));
        assert!(err.to_string().contains("30000"));
        assert_eq!(TransportError::Status(503).to_string(), "HTTP status 503");
    }

    #[test]
    fn test_strategy_error_from_regex() {
        let err: StrategyError = regex::Regex::new("(unclosed").unwrap_err().into();
        assert!(err.to_string().starts_with("Invalid pattern"));
    }
}
