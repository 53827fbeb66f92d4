//! Voice dictation into the chat input.
//!
//! - [`recognizer`]: the platform recognizer seam and error policy table
//! - [`audio`]: audio input leases (cpal microphone behind `microphone`)
//! - [`machine`]: the pure Idle/Listening/Finalizing state machine
//! - [`controller`]: effect execution, the tokio driver and the handle

pub mod audio;
pub mod controller;
pub mod machine;
pub mod recognizer;

#[cfg(feature = "microphone")]
pub use audio::CpalMicrophone;
pub use audio::{AudioInput, AudioLease, NoAudioInput};
pub use controller::{DictationController, DictationDriver, DictationHandle, DictationSnapshot};
pub use machine::{DictationInput, DictationPhase, DictationState, DictationTimings, Effect};
pub use recognizer::{
    Alternative, ErrorPolicy, RecognitionErrorKind, RecognitionEvent, RecognizerOptions,
    SpeechRecognizer,
};
