//! Rate-limit detection and the sticky rate-limit notice.
//!
//! The backend signals rate limiting either structurally (a `done` event
//! tagged `rate_limited`, HTTP 429) or only through free text in `error`
//! events. The text path is a heuristic: a phrase this module does not
//! recognise is a silent miss.

use tracing::{info, warn};

use crate::error::TutorError;
use crate::stream::ResponseType;

/// Notice shown while the rate-limit flag is set.
pub const RATE_LIMIT_NOTICE: &str =
    "You've hit the rate limit. Answers will resume shortly; see the last message for details.";

/// Assistant message used for any rate-limit failure.
pub const RATE_LIMIT_MESSAGE: &str = "Oops, looks like you've hit the rate limit! \
If this is a per-minute limit, just wait about **60 seconds** and try again. \
If you've used up your daily tokens, they reset at **midnight UTC** (every 24 hours).";

/// Assistant message used for credential failures.
pub const CREDENTIAL_MESSAGE: &str = "Your API key was rejected. \
Please revisit Settings, check the key, and try again.";

/// What an error text is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate or token-budget exhaustion.
    RateLimit,
    /// Invalid or missing credential.
    Credential,
    /// Anything else.
    Other,
}

const TOKEN_EXHAUSTION_PHRASES: &[&str] = &[
    "tokens per minute",
    "tokens per day",
    "token limit",
    "token quota",
    "out of tokens",
    "daily tokens",
    "tokens exhausted",
    "too many tokens",
];

const RATE_PHRASES: &[&str] = &["too many requests", "quota exceeded", "ratelimit"];

const CREDENTIAL_PHRASES: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "unauthorized",
    "unauthenticated",
    "authentication",
    "invalid key",
    "credential",
    "forbidden",
];

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Classify free error text with case-insensitive substring heuristics.
pub fn classify_error_text(text: &str) -> ErrorClass {
    let lower = text.to_lowercase();
    let rate_word = words(&lower).any(|w| w == "rate" || w == "429" || w.starts_with("ratelimit"));
    if rate_word
        || RATE_PHRASES.iter().any(|p| lower.contains(p))
        || TOKEN_EXHAUSTION_PHRASES.iter().any(|p| lower.contains(p))
    {
        return ErrorClass::RateLimit;
    }
    if words(&lower).any(|w| w == "401" || w == "403")
        || CREDENTIAL_PHRASES.iter().any(|p| lower.contains(p))
    {
        return ErrorClass::Credential;
    }
    ErrorClass::Other
}

/// Classify a client-side error, preferring its structured variant.
pub fn classify_error(err: &TutorError) -> ErrorClass {
    match err {
        TutorError::RateLimited(_) => ErrorClass::RateLimit,
        TutorError::Auth(_) => ErrorClass::Credential,
        other => classify_error_text(&other.message()),
    }
}

/// Turn raw error text into the message shown in the transcript.
pub fn friendly_error_message(raw: &str) -> String {
    match classify_error_text(raw) {
        ErrorClass::RateLimit => RATE_LIMIT_MESSAGE.to_owned(),
        ErrorClass::Credential => CREDENTIAL_MESSAGE.to_owned(),
        ErrorClass::Other => {
            let detail = raw.trim();
            let detail = detail.strip_prefix("Error:").map(str::trim).unwrap_or(detail);
            if detail.is_empty() {
                "Sorry, something went wrong. Please try again.".to_owned()
            } else {
                format!("Sorry, something went wrong: {detail}")
            }
        }
    }
}

/// Transcript message for a client-side failure.
pub fn friendly_message_for(err: &TutorError) -> String {
    match classify_error(err) {
        ErrorClass::RateLimit => RATE_LIMIT_MESSAGE.to_owned(),
        ErrorClass::Credential => CREDENTIAL_MESSAGE.to_owned(),
        ErrorClass::Other => friendly_error_message(&err.message()),
    }
}

/// Session-scoped sticky rate-limit flag.
#[derive(Debug, Default, Clone)]
pub struct RateLimitMonitor {
    limited: bool,
}

impl RateLimitMonitor {
    /// Create a monitor with the flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sticky notice is visible.
    pub fn is_limited(&self) -> bool {
        self.limited
    }

    /// The notice text while the flag is set.
    pub fn notice(&self) -> Option<&'static str> {
        self.limited.then_some(RATE_LIMIT_NOTICE)
    }

    fn set(&mut self, value: bool) -> bool {
        let changed = self.limited != value;
        if changed {
            if value {
                warn!("rate limit detected; showing notice");
            } else {
                info!("turn completed normally; clearing rate-limit notice");
            }
        }
        self.limited = value;
        changed
    }

    /// Record a finished turn. Returns whether the flag changed.
    ///
    /// `rate_limited` sets the flag; any other successful classification
    /// clears it. `error` leaves it as is.
    pub fn observe_done(&mut self, response_type: ResponseType) -> bool {
        match response_type {
            ResponseType::RateLimited => self.set(true),
            t if t.is_success() => self.set(false),
            _ => false,
        }
    }

    /// Record error text from the stream. Returns whether the flag changed.
    pub fn observe_error_text(&mut self, text: &str) -> bool {
        if classify_error_text(text) == ErrorClass::RateLimit {
            self.set(true)
        } else {
            false
        }
    }

    /// Record a transport-level failure. Returns whether the flag changed.
    pub fn observe_error(&mut self, err: &TutorError) -> bool {
        if classify_error(err) == ErrorClass::RateLimit {
            self.set(true)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_phrases() {
        assert_eq!(classify_error_text("Rate limit reached for model"), ErrorClass::RateLimit);
        assert_eq!(classify_error_text("Error code: 429"), ErrorClass::RateLimit);
        assert_eq!(classify_error_text("rate_limit_exceeded"), ErrorClass::RateLimit);
        assert_eq!(
            classify_error_text("Limit 30000, Used 29950: tokens per minute (TPM)"),
            ErrorClass::RateLimit
        );
        assert_eq!(classify_error_text("Too Many Requests"), ErrorClass::RateLimit);
    }

    #[test]
    fn rate_substring_inside_other_words_is_not_a_match() {
        assert_eq!(classify_error_text("Failed to generate response"), ErrorClass::Other);
        assert_eq!(classify_error_text("separate issue"), ErrorClass::Other);
    }

    #[test]
    fn classifies_credential_phrases() {
        assert_eq!(classify_error_text("Invalid API Key"), ErrorClass::Credential);
        assert_eq!(classify_error_text("HTTP 401"), ErrorClass::Credential);
        assert_eq!(classify_error_text("authentication failed"), ErrorClass::Credential);
    }

    #[test]
    fn structured_errors_take_precedence() {
        assert_eq!(
            classify_error(&TutorError::RateLimited("anything".into())),
            ErrorClass::RateLimit
        );
        assert_eq!(classify_error(&TutorError::Auth("nope".into())), ErrorClass::Credential);
        assert_eq!(
            classify_error(&TutorError::Request("connection refused".into())),
            ErrorClass::Other
        );
    }

    #[test]
    fn friendly_messages() {
        assert_eq!(friendly_error_message("rate limit exceeded"), RATE_LIMIT_MESSAGE);
        assert_eq!(friendly_error_message("invalid api key"), CREDENTIAL_MESSAGE);
        assert_eq!(
            friendly_error_message("Error: upstream timeout"),
            "Sorry, something went wrong: upstream timeout"
        );
        assert!(friendly_error_message("  ").contains("try again"));
        assert_eq!(
            friendly_message_for(&TutorError::RateLimited("slow down".into())),
            RATE_LIMIT_MESSAGE
        );
        assert_eq!(
            friendly_message_for(&TutorError::Request("connection refused".into())),
            "Sorry, something went wrong: connection refused"
        );
    }

    #[test]
    fn flag_is_sticky_until_successful_done() {
        let mut monitor = RateLimitMonitor::new();
        assert!(monitor.notice().is_none());

        assert!(monitor.observe_done(ResponseType::RateLimited));
        assert!(monitor.is_limited());
        assert!(monitor.notice().is_some());

        // Errors and further rate limits keep it set.
        assert!(!monitor.observe_done(ResponseType::Error));
        assert!(!monitor.observe_error_text("something broke"));
        assert!(!monitor.observe_done(ResponseType::RateLimited));
        assert!(monitor.is_limited());

        assert!(monitor.observe_done(ResponseType::InScope));
        assert!(!monitor.is_limited());
    }

    #[test]
    fn credential_errors_do_not_set_flag() {
        let mut monitor = RateLimitMonitor::new();
        assert!(!monitor.observe_error_text("Invalid API key"));
        assert!(!monitor.observe_error(&TutorError::Auth("401".into())));
        assert!(!monitor.is_limited());
    }

    #[test]
    fn transport_rate_limit_sets_flag() {
        let mut monitor = RateLimitMonitor::new();
        assert!(monitor.observe_error(&TutorError::RateLimited("429".into())));
        assert!(monitor.is_limited());
    }
}
