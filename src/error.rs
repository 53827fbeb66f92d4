//! Error types for the lecture tutor client.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`TutorError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// User input rejected before reaching the backend.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

    /// A turn is already in flight.
    pub const TURN_IN_FLIGHT: &str = "TURN_IN_FLIGHT";

    /// Credential rejected by the backend.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Backend reported rate limiting.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// Request to the backend failed.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming endpoint is not available (fallback may apply).
    pub const STREAM_UNAVAILABLE: &str = "STREAM_UNAVAILABLE";

    /// Streaming response broke off or could not be read.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Key-value storage read or write failed.
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";

    /// Speech capture or recognition failed.
    pub const DICTATION_ERROR: &str = "DICTATION_ERROR";

    /// Local filesystem error.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Errors produced by the tutor client.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// User input rejected before reaching the backend.
    #[error("[{}] {}", error_codes::VALIDATION_FAILED, .0)]
    Validation(String),

    /// A turn is already in flight; the submission was rejected.
    #[error("[{}] a turn is already in flight", error_codes::TURN_IN_FLIGHT)]
    Busy,

    /// Credential rejected by the backend.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// Backend reported rate limiting.
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Request to the backend failed (connection, non-success status).
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Streaming endpoint is not available on this backend.
    #[error("[{}] {}", error_codes::STREAM_UNAVAILABLE, .0)]
    Unavailable(String),

    /// Streaming response broke off or could not be read.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    Stream(String),

    /// Key-value storage read or write failed.
    #[error("[{}] {}", error_codes::STORAGE_ERROR, .0)]
    Storage(String),

    /// Speech capture or recognition failed.
    #[error("[{}] {}", error_codes::DICTATION_ERROR, .0)]
    Dictation(String),

    /// Local filesystem error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl TutorError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Validation(_) => error_codes::VALIDATION_FAILED,
            Self::Busy => error_codes::TURN_IN_FLIGHT,
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Unavailable(_) => error_codes::STREAM_UNAVAILABLE,
            Self::Stream(_) => error_codes::STREAM_FAILED,
            Self::Storage(_) => error_codes::STORAGE_ERROR,
            Self::Dictation(_) => error_codes::DICTATION_ERROR,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Config(m)
            | Self::Validation(m)
            | Self::Auth(m)
            | Self::RateLimited(m)
            | Self::Request(m)
            | Self::Unavailable(m)
            | Self::Stream(m)
            | Self::Storage(m)
            | Self::Dictation(m) => m.clone(),
            Self::Busy => "a turn is already in flight".to_owned(),
            Self::Io(e) => e.to_string(),
        }
    }

    /// Returns true if this error represents a transient failure that can be retried.
    ///
    /// Auth, validation and configuration failures need user action first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Auth(_) => false,
            Self::Busy | Self::RateLimited(_) => true,
            Self::Request(_) | Self::Unavailable(_) | Self::Stream(_) => true,
            Self::Storage(_) | Self::Dictation(_) | Self::Io(_) => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_prefix() {
        let err = TutorError::Auth("Invalid API key".into());
        assert_eq!(err.to_string(), "[AUTH_FAILED] Invalid API key");
    }

    #[test]
    fn message_strips_code() {
        let err = TutorError::Validation("message must not be empty".into());
        assert_eq!(err.message(), "message must not be empty");
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn busy_has_fixed_message() {
        let err = TutorError::Busy;
        assert_eq!(err.code(), error_codes::TURN_IN_FLIGHT);
        assert!(err.to_string().contains("already in flight"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TutorError = io.into();
        assert_eq!(err.code(), "IO_ERROR");
        assert!(err.message().contains("gone"));
    }

    #[test]
    fn retryability() {
        assert!(TutorError::Request("reset".into()).is_retryable());
        assert!(TutorError::Stream("eof".into()).is_retryable());
        assert!(TutorError::RateLimited("429".into()).is_retryable());
        assert!(!TutorError::Auth("bad key".into()).is_retryable());
        assert!(!TutorError::Config("empty base_url".into()).is_retryable());
        assert!(!TutorError::Storage("quota".into()).is_retryable());
    }
}
