//! Speech recognizer seam.
//!
//! A platform recognizer implements [`SpeechRecognizer`] for control and
//! delivers [`RecognitionEvent`]s on the channel handed to the dictation
//! driver. Error kinds map to a fixed [`ErrorPolicy`].

use crate::error::TutorError;

/// One candidate interpretation of an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    /// Recognized text.
    pub transcript: String,
    /// Recognizer confidence in `0.0..=1.0`.
    pub confidence: f32,
}

impl Alternative {
    /// Convenience constructor.
    pub fn new(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            transcript: transcript.into(),
            confidence,
        }
    }
}

/// Pick the highest-confidence alternative. Ties keep the earlier one.
pub fn best_alternative(alternatives: &[Alternative]) -> Option<&Alternative> {
    alternatives.iter().reduce(|best, alt| {
        if alt.confidence > best.confidence {
            alt
        } else {
            best
        }
    })
}

/// Recognition error kinds reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Nothing was said.
    NoSpeech,
    /// Network hiccup talking to the recognition service.
    Network,
    /// Microphone permission denied.
    NotAllowed,
    /// Recognition service refused.
    ServiceNotAllowed,
    /// Audio capture failed.
    AudioCapture,
    /// Session aborted by the platform.
    Aborted,
    /// Requested language unsupported.
    LanguageNotSupported,
    /// Grammar rejected.
    BadGrammar,
    /// Anything else.
    Other(String),
}

/// What the dictation session does about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Show a short hint and keep listening.
    Transient,
    /// Restart the recognizer after a delay, within the restart budget.
    Restart,
    /// End the session.
    Terminate,
}

impl RecognitionErrorKind {
    /// Parse a platform error code (`no-speech`, `network`, ...).
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            "aborted" => Self::Aborted,
            "language-not-supported" => Self::LanguageNotSupported,
            "bad-grammar" => Self::BadGrammar,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Platform error code.
    pub fn code(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Network => "network",
            Self::NotAllowed => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::AudioCapture => "audio-capture",
            Self::Aborted => "aborted",
            Self::LanguageNotSupported => "language-not-supported",
            Self::BadGrammar => "bad-grammar",
            Self::Other(code) => code,
        }
    }

    /// Policy table.
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            Self::NoSpeech => ErrorPolicy::Transient,
            Self::Network => ErrorPolicy::Restart,
            _ => ErrorPolicy::Terminate,
        }
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Lifecycle and result events from a recognizer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Interim or final result with its weighted alternatives.
    Result {
        /// Candidate interpretations.
        alternatives: Vec<Alternative>,
        /// Whether the segment is final.
        is_final: bool,
    },
    /// The recognizer reported an error.
    Error(RecognitionErrorKind),
    /// The recognizer session ended.
    End,
}

impl RecognitionEvent {
    /// An interim result with one alternative.
    pub fn interim(text: impl Into<String>, confidence: f32) -> Self {
        Self::Result {
            alternatives: vec![Alternative::new(text, confidence)],
            is_final: false,
        }
    }

    /// A final result with one alternative.
    pub fn final_text(text: impl Into<String>, confidence: f32) -> Self {
        Self::Result {
            alternatives: vec![Alternative::new(text, confidence)],
            is_final: true,
        }
    }
}

/// Recognition session options.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerOptions {
    /// BCP 47 language tag.
    pub language: String,
    /// Keep recognizing across pauses.
    pub continuous: bool,
    /// Deliver interim results.
    pub interim_results: bool,
    /// Maximum alternatives per result.
    pub max_alternatives: u32,
}

impl From<&crate::config::DictationConfig> for RecognizerOptions {
    fn from(config: &crate::config::DictationConfig) -> Self {
        Self {
            language: config.language.clone(),
            continuous: config.continuous,
            interim_results: true,
            max_alternatives: config.max_alternatives,
        }
    }
}

/// Control surface of a platform speech recognizer.
pub trait SpeechRecognizer: Send {
    /// Begin a recognition session.
    fn start(&mut self, options: &RecognizerOptions) -> Result<(), TutorError>;

    /// Stop gracefully: pending results are delivered, then `End`.
    fn stop(&mut self);

    /// Stop immediately, discarding pending results.
    fn abort(&mut self);
}
