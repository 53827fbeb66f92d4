//! Dictation session state machine.
//!
//! Pure transitions over [`DictationState`]: every input returns the list
//! of [`Effect`]s the controller must perform, and timers are plain
//! deadlines read back through [`DictationState::next_deadline`]. Nothing
//! here touches a device or sleeps.
//!
//! ```text
//! Idle --start--> Listening --stop | silence--> Finalizing --end | timeout--> Idle
//!                     |                             |
//!                     +------ cancel | fatal -------+-----------------------> Idle
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::recognizer::{
    Alternative, ErrorPolicy, RecognitionErrorKind, RecognitionEvent, best_alternative,
};
use crate::config::DictationConfig;

/// Hint shown when the recognizer heard nothing.
pub const NO_SPEECH_HINT: &str = "No speech detected. Try speaking again.";

/// Session phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DictationPhase {
    /// No session.
    #[default]
    Idle,
    /// Capturing speech.
    Listening,
    /// Waiting for the recognizer to flush its last results.
    Finalizing,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Acquire the audio input (best-effort).
    AcquireAudio,
    /// Drop the audio lease.
    ReleaseAudio,
    /// Start the recognizer.
    StartRecognizer,
    /// Stop the recognizer gracefully.
    StopRecognizer,
    /// Stop the recognizer and discard pending results.
    AbortRecognizer,
    /// Abort and immediately start the recognizer again.
    RestartRecognizer,
    /// Write the transcript to the text input.
    Commit(String),
}

/// Inputs to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum DictationInput {
    /// User pressed start.
    Start,
    /// User pressed stop: finish and keep the transcript.
    Stop,
    /// User cancelled: finish and discard the transcript.
    Cancel,
    /// Event from the recognizer.
    Recognition(RecognitionEvent),
    /// The recognizer could not be started.
    StartFailed(String),
}

/// Timing knobs, copied from [`DictationConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictationTimings {
    /// Silence before auto-stop.
    pub silence_timeout: Duration,
    /// Forced recognizer restart period.
    pub watchdog_interval: Duration,
    /// Delay before a recovery restart.
    pub restart_delay: Duration,
    /// Lifetime of the transient hint.
    pub hint_clear: Duration,
    /// Longest wait in Finalizing.
    pub finalize_timeout: Duration,
    /// Recovery restarts allowed without an intervening result.
    pub max_recoverable_restarts: u32,
}

impl From<&DictationConfig> for DictationTimings {
    fn from(config: &DictationConfig) -> Self {
        Self {
            silence_timeout: Duration::from_millis(config.silence_timeout_ms),
            watchdog_interval: Duration::from_millis(config.watchdog_interval_ms),
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            hint_clear: Duration::from_millis(config.hint_clear_ms),
            finalize_timeout: Duration::from_millis(config.finalize_timeout_ms),
            max_recoverable_restarts: config.max_recoverable_restarts,
        }
    }
}

impl Default for DictationTimings {
    fn default() -> Self {
        Self::from(&DictationConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Deadlines {
    silence: Option<Instant>,
    watchdog: Option<Instant>,
    restart: Option<Instant>,
    hint_clear: Option<Instant>,
    finalize: Option<Instant>,
}

impl Deadlines {
    fn earliest(&self) -> Option<Instant> {
        [
            self.silence,
            self.watchdog,
            self.restart,
            self.hint_clear,
            self.finalize,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

/// One dictation session's state.
#[derive(Debug, Clone)]
pub struct DictationState {
    timings: DictationTimings,
    phase: DictationPhase,
    final_text: String,
    interim: String,
    // Interim text held back when listening ended, committed unless a
    // late final result supersedes it.
    pending_tail: String,
    confidence: u8,
    hint: Option<&'static str>,
    restarts: u32,
    // Whether the current recognizer session has not reported `End` yet.
    session_live: bool,
    // `End` events still owed by sessions aborted for a restart.
    stale_ends: u32,
    deadlines: Deadlines,
}

impl DictationState {
    /// Idle state with the given timings.
    pub fn new(timings: DictationTimings) -> Self {
        Self {
            timings,
            phase: DictationPhase::Idle,
            final_text: String::new(),
            interim: String::new(),
            pending_tail: String::new(),
            confidence: 0,
            hint: None,
            restarts: 0,
            session_live: false,
            stale_ends: 0,
            deadlines: Deadlines::default(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> DictationPhase {
        self.phase
    }

    /// Accumulated final transcript.
    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    /// Latest interim (non-final) text.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Running confidence estimate, 0–100.
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    /// Transient inline hint.
    pub fn hint(&self) -> Option<&'static str> {
        self.hint
    }

    /// Recovery restarts since the last result.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.earliest()
    }

    // Guards.

    fn is_listening(&self) -> bool {
        self.phase == DictationPhase::Listening
    }

    fn has_speech(&self) -> bool {
        !self.final_text.trim().is_empty() || !self.interim.trim().is_empty()
    }

    fn restart_budget_left(&self) -> bool {
        self.restarts < self.timings.max_recoverable_restarts
    }

    fn restart_pending(&self) -> bool {
        self.deadlines.restart.is_some()
    }

    /// Apply one input.
    pub fn handle(&mut self, input: DictationInput, now: Instant) -> Vec<Effect> {
        match (self.phase, input) {
            (DictationPhase::Idle, DictationInput::Start) => self.begin(now),
            (_, DictationInput::Start) => {
                debug!("dictation already active; ignoring start");
                Vec::new()
            }
            (DictationPhase::Listening, DictationInput::Stop) => self.begin_finalizing(now),
            (DictationPhase::Listening | DictationPhase::Finalizing, DictationInput::Cancel) => {
                info!("dictation cancelled");
                self.end(false)
            }
            (DictationPhase::Listening, DictationInput::StartFailed(reason)) => {
                warn!("recognizer failed to start: {reason}");
                self.end(true)
            }
            (DictationPhase::Listening, DictationInput::Recognition(event)) => {
                self.on_listening_event(event, now)
            }
            (DictationPhase::Finalizing, DictationInput::Recognition(event)) => {
                self.on_finalizing_event(event)
            }
            (_, DictationInput::Stop | DictationInput::Cancel | DictationInput::StartFailed(_)) => {
                Vec::new()
            }
            (DictationPhase::Idle, DictationInput::Recognition(event)) => {
                debug!("recognition event while idle: {event:?}");
                Vec::new()
            }
        }
    }

    /// Fire every deadline at or before `now`.
    pub fn on_timer(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let due = |d: Option<Instant>| d.is_some_and(|d| d <= now);

        if due(self.deadlines.hint_clear) {
            self.deadlines.hint_clear = None;
            self.hint = None;
        }

        if due(self.deadlines.finalize) {
            debug!("finalize timeout; committing what we have");
            effects.push(Effect::AbortRecognizer);
            effects.extend(self.end(true));
            return effects;
        }

        if !self.is_listening() {
            return effects;
        }

        if due(self.deadlines.silence) {
            if self.has_speech() {
                info!("silence timeout; finishing dictation");
                effects.extend(self.begin_finalizing(now));
                return effects;
            }
            self.deadlines.silence = Some(now + self.timings.silence_timeout);
        }

        if due(self.deadlines.restart) {
            self.deadlines.restart = None;
            debug!(restarts = self.restarts, "restarting recognizer");
            effects.push(Effect::RestartRecognizer);
        }

        if due(self.deadlines.watchdog) {
            debug!("watchdog restart");
            self.promote_interim();
            self.deadlines.watchdog = Some(now + self.timings.watchdog_interval);
            if !effects.contains(&Effect::RestartRecognizer) {
                effects.push(Effect::RestartRecognizer);
            }
        }

        if effects.contains(&Effect::RestartRecognizer) {
            self.recycle_session();
        }

        effects
    }

    /// Account for an abort-and-start. Aborting a live session makes the
    /// recognizer report one more `End` after the new session has begun.
    fn recycle_session(&mut self) {
        if self.session_live {
            self.stale_ends += 1;
        }
        self.session_live = true;
    }

    /// Swallow the `End` of a session aborted by a restart.
    fn absorb_stale_end(&mut self) -> bool {
        if self.stale_ends == 0 {
            return false;
        }
        self.stale_ends -= 1;
        debug!(remaining = self.stale_ends, "end of aborted recognizer session");
        true
    }

    fn begin(&mut self, now: Instant) -> Vec<Effect> {
        info!("dictation started");
        self.phase = DictationPhase::Listening;
        self.final_text.clear();
        self.interim.clear();
        self.pending_tail.clear();
        self.confidence = 0;
        self.hint = None;
        self.restarts = 0;
        self.session_live = true;
        self.stale_ends = 0;
        self.deadlines = Deadlines {
            silence: Some(now + self.timings.silence_timeout),
            watchdog: Some(now + self.timings.watchdog_interval),
            ..Deadlines::default()
        };
        vec![Effect::AcquireAudio, Effect::StartRecognizer]
    }

    fn begin_finalizing(&mut self, now: Instant) -> Vec<Effect> {
        self.phase = DictationPhase::Finalizing;
        self.pending_tail = std::mem::take(&mut self.interim);
        self.confidence = 0;
        self.deadlines = Deadlines {
            finalize: Some(now + self.timings.finalize_timeout),
            hint_clear: self.deadlines.hint_clear,
            ..Deadlines::default()
        };
        vec![Effect::StopRecognizer, Effect::ReleaseAudio]
    }

    /// Leave the session. Releases audio if still listening.
    fn end(&mut self, keep_transcript: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.is_listening() {
            effects.push(Effect::AbortRecognizer);
            effects.push(Effect::ReleaseAudio);
        } else if !keep_transcript {
            effects.push(Effect::AbortRecognizer);
        }

        let mut text = std::mem::take(&mut self.final_text);
        let tail = std::mem::take(&mut self.pending_tail);
        let interim = std::mem::take(&mut self.interim);
        for extra in [tail, interim] {
            append_segment(&mut text, &extra);
        }
        if keep_transcript && !text.trim().is_empty() {
            effects.push(Effect::Commit(text.trim().to_owned()));
        }

        self.phase = DictationPhase::Idle;
        self.confidence = 0;
        self.restarts = 0;
        self.session_live = false;
        self.stale_ends = 0;
        self.deadlines = Deadlines {
            hint_clear: self.deadlines.hint_clear,
            ..Deadlines::default()
        };
        info!("dictation ended");
        effects
    }

    fn promote_interim(&mut self) {
        let interim = std::mem::take(&mut self.interim);
        append_segment(&mut self.final_text, &interim);
    }

    fn apply_result(&mut self, alternatives: &[Alternative], is_final: bool) {
        let Some(best) = best_alternative(alternatives) else {
            return;
        };
        self.confidence = (best.confidence.clamp(0.0, 1.0) * 100.0).round() as u8;
        if is_final {
            append_segment(&mut self.final_text, &best.transcript);
            self.interim.clear();
        } else {
            self.interim = best.transcript.clone();
        }
    }

    fn on_listening_event(&mut self, event: RecognitionEvent, now: Instant) -> Vec<Effect> {
        match event {
            RecognitionEvent::Result {
                alternatives,
                is_final,
            } => {
                self.apply_result(&alternatives, is_final);
                self.restarts = 0;
                self.hint = None;
                self.deadlines.hint_clear = None;
                self.deadlines.silence = Some(now + self.timings.silence_timeout);
                Vec::new()
            }
            RecognitionEvent::Error(RecognitionErrorKind::Aborted) if self.stale_ends > 0 => {
                debug!("aborted recognizer session reported its abort");
                Vec::new()
            }
            RecognitionEvent::Error(kind) => self.on_error(kind, now),
            RecognitionEvent::End if self.absorb_stale_end() => Vec::new(),
            RecognitionEvent::End => {
                self.session_live = false;
                if !self.restart_pending() {
                    debug!("recognizer ended while listening; scheduling restart");
                    self.promote_interim();
                    self.deadlines.restart = Some(now + self.timings.restart_delay);
                }
                Vec::new()
            }
        }
    }

    fn on_error(&mut self, kind: RecognitionErrorKind, now: Instant) -> Vec<Effect> {
        match kind.policy() {
            ErrorPolicy::Transient => {
                debug!(kind = %kind, "transient recognition error");
                self.hint = Some(NO_SPEECH_HINT);
                self.deadlines.hint_clear = Some(now + self.timings.hint_clear);
                Vec::new()
            }
            ErrorPolicy::Restart if self.restart_budget_left() => {
                self.restarts += 1;
                warn!(kind = %kind, attempt = self.restarts, "recoverable recognition error");
                self.promote_interim();
                self.deadlines.restart = Some(now + self.timings.restart_delay);
                Vec::new()
            }
            ErrorPolicy::Restart | ErrorPolicy::Terminate => {
                warn!(kind = %kind, "fatal recognition error; ending dictation");
                self.end(true)
            }
        }
    }

    fn on_finalizing_event(&mut self, event: RecognitionEvent) -> Vec<Effect> {
        match event {
            RecognitionEvent::Result {
                alternatives,
                is_final,
            } => {
                self.apply_result(&alternatives, is_final);
                if is_final {
                    self.pending_tail.clear();
                }
                Vec::new()
            }
            RecognitionEvent::Error(RecognitionErrorKind::Aborted) if self.stale_ends > 0 => {
                Vec::new()
            }
            RecognitionEvent::Error(kind) => {
                debug!(kind = %kind, "recognition error while finalizing");
                self.end(true)
            }
            RecognitionEvent::End if self.absorb_stale_end() => Vec::new(),
            RecognitionEvent::End => self.end(true),
        }
    }
}

fn append_segment(text: &mut String, segment: &str) {
    let segment = segment.trim();
    if segment.is_empty() {
        return;
    }
    if !text.is_empty() && !text.ends_with(' ') {
        text.push(' ');
    }
    text.push_str(segment);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn started() -> (DictationState, Instant) {
        let t0 = Instant::now();
        let mut state = DictationState::new(DictationTimings::default());
        let effects = state.handle(DictationInput::Start, t0);
        assert_eq!(effects, vec![Effect::AcquireAudio, Effect::StartRecognizer]);
        (state, t0)
    }

    fn recog(event: RecognitionEvent) -> DictationInput {
        DictationInput::Recognition(event)
    }

    #[test]
    fn no_speech_shows_hint_without_leaving_listening() {
        let (mut state, t0) = started();
        let effects = state.handle(
            recog(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech)),
            t0 + ms(1500),
        );
        assert!(effects.is_empty());
        assert_eq!(state.phase(), DictationPhase::Listening);
        assert_eq!(state.hint(), Some(NO_SPEECH_HINT));

        let effects = state.on_timer(t0 + ms(3500));
        assert!(!effects.contains(&Effect::ReleaseAudio));
        assert_eq!(state.hint(), None);
        assert_eq!(state.phase(), DictationPhase::Listening);
    }

    #[test]
    fn silence_with_empty_transcript_keeps_listening() {
        let (mut state, t0) = started();
        let effects = state.on_timer(t0 + ms(3500));
        assert!(effects.is_empty());
        assert_eq!(state.phase(), DictationPhase::Listening);
        assert_eq!(state.next_deadline(), Some(t0 + ms(7000)));
    }

    #[test]
    fn results_reset_silence_timer() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::interim("what is", 0.5)), t0 + ms(3000));
        assert!(state.on_timer(t0 + ms(3500)).is_empty());
        assert_eq!(state.phase(), DictationPhase::Listening);
        assert_eq!(state.next_deadline(), Some(t0 + ms(6500)));
    }

    #[test]
    fn silence_after_speech_finalizes_then_commits() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("What is a primary key", 0.9)), t0 + ms(500));
        assert_eq!(state.confidence(), 90);

        let effects = state.on_timer(t0 + ms(4000));
        assert_eq!(effects, vec![Effect::StopRecognizer, Effect::ReleaseAudio]);
        assert_eq!(state.phase(), DictationPhase::Finalizing);
        assert_eq!(state.confidence(), 0);

        let effects = state.handle(recog(RecognitionEvent::End), t0 + ms(4100));
        assert_eq!(effects, vec![Effect::Commit("What is a primary key".into())]);
        assert_eq!(state.phase(), DictationPhase::Idle);
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn final_results_pick_best_alternative_and_accumulate() {
        let (mut state, t0) = started();
        state.handle(
            recog(RecognitionEvent::Result {
                alternatives: vec![
                    Alternative::new("what is a", 0.4),
                    Alternative::new("what's a", 0.7),
                ],
                is_final: true,
            }),
            t0 + ms(100),
        );
        state.handle(recog(RecognitionEvent::interim("foreign", 0.3)), t0 + ms(200));
        assert_eq!(state.interim(), "foreign");
        state.handle(recog(RecognitionEvent::final_text("foreign key", 0.8)), t0 + ms(300));

        assert_eq!(state.final_text(), "what's a foreign key");
        assert_eq!(state.interim(), "");
    }

    #[test]
    fn stop_commits_pending_interim_when_no_final_arrives() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("explain", 0.9)), t0 + ms(100));
        state.handle(recog(RecognitionEvent::interim("normal forms", 0.6)), t0 + ms(200));

        state.handle(DictationInput::Stop, t0 + ms(300));
        assert_eq!(state.interim(), "");
        let effects = state.on_timer(t0 + ms(300) + ms(1500));
        assert_eq!(
            effects,
            vec![
                Effect::AbortRecognizer,
                Effect::Commit("explain normal forms".into())
            ]
        );
    }

    #[test]
    fn late_final_supersedes_interim_tail() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::interim("normal for", 0.6)), t0 + ms(200));
        state.handle(DictationInput::Stop, t0 + ms(300));
        state.handle(recog(RecognitionEvent::final_text("normal forms", 0.9)), t0 + ms(400));
        let effects = state.handle(recog(RecognitionEvent::End), t0 + ms(500));
        assert_eq!(effects, vec![Effect::Commit("normal forms".into())]);
    }

    #[test]
    fn cancel_discards_and_releases() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("never mind", 0.9)), t0 + ms(100));
        let effects = state.handle(DictationInput::Cancel, t0 + ms(200));
        assert_eq!(effects, vec![Effect::AbortRecognizer, Effect::ReleaseAudio]);
        assert_eq!(state.phase(), DictationPhase::Idle);
        assert_eq!(state.final_text(), "");
    }

    #[test]
    fn fatal_error_releases_and_commits() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("half a question", 0.9)), t0 + ms(100));
        let effects = state.handle(
            recog(RecognitionEvent::Error(RecognitionErrorKind::NotAllowed)),
            t0 + ms(200),
        );
        assert_eq!(
            effects,
            vec![
                Effect::AbortRecognizer,
                Effect::ReleaseAudio,
                Effect::Commit("half a question".into())
            ]
        );
        assert_eq!(state.phase(), DictationPhase::Idle);
    }

    #[test]
    fn fatal_error_with_empty_transcript_commits_nothing() {
        let (mut state, t0) = started();
        let effects = state.handle(
            recog(RecognitionEvent::Error(RecognitionErrorKind::AudioCapture)),
            t0 + ms(200),
        );
        assert_eq!(effects, vec![Effect::AbortRecognizer, Effect::ReleaseAudio]);
    }

    #[test]
    fn network_errors_restart_within_budget() {
        let (mut state, t0) = started();
        let mut now = t0;
        for attempt in 1..=3 {
            now += ms(100);
            let effects = state.handle(
                recog(RecognitionEvent::Error(RecognitionErrorKind::Network)),
                now,
            );
            assert!(effects.is_empty());
            assert_eq!(state.restarts(), attempt);
            now += ms(300);
            assert_eq!(state.on_timer(now), vec![Effect::RestartRecognizer]);
        }

        // Budget exhausted: the fourth network error is fatal.
        let effects = state.handle(
            recog(RecognitionEvent::Error(RecognitionErrorKind::Network)),
            now + ms(100),
        );
        assert!(effects.contains(&Effect::ReleaseAudio));
        assert_eq!(state.phase(), DictationPhase::Idle);
    }

    #[test]
    fn results_reset_restart_budget() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::Error(RecognitionErrorKind::Network)), t0 + ms(100));
        state.on_timer(t0 + ms(400));
        state.handle(recog(RecognitionEvent::interim("hello", 0.5)), t0 + ms(500));
        assert_eq!(state.restarts(), 0);
    }

    #[test]
    fn watchdog_restart_keeps_transcript() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("first part", 0.9)), t0 + ms(7000));
        state.handle(recog(RecognitionEvent::interim("second", 0.5)), t0 + ms(9500));

        let effects = state.on_timer(t0 + ms(10_000));
        assert_eq!(effects, vec![Effect::RestartRecognizer]);
        assert_eq!(state.phase(), DictationPhase::Listening);
        assert_eq!(state.final_text(), "first part second");
        assert_eq!(state.next_deadline(), Some(t0 + ms(13_000)));
    }

    #[test]
    fn unexpected_end_schedules_restart() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::End), t0 + ms(1000));
        assert_eq!(state.next_deadline(), Some(t0 + ms(1300)));
        assert_eq!(state.on_timer(t0 + ms(1300)), vec![Effect::RestartRecognizer]);
        // The unexpected end does not consume the recovery budget.
        assert_eq!(state.restarts(), 0);
    }

    #[test]
    fn end_of_aborted_session_does_not_restart_again() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("first part", 0.9)), t0 + ms(9000));
        assert_eq!(state.on_timer(t0 + ms(10_000)), vec![Effect::RestartRecognizer]);

        // The aborted session reports its end after the new one started.
        let effects = state.handle(recog(RecognitionEvent::End), t0 + ms(10_050));
        assert!(effects.is_empty());
        assert_eq!(state.next_deadline(), Some(t0 + ms(12_500)));
        assert!(state.on_timer(t0 + ms(10_400)).is_empty());

        // A later end from the live session is unexpected again.
        state.handle(recog(RecognitionEvent::End), t0 + ms(11_000));
        assert_eq!(state.next_deadline(), Some(t0 + ms(11_300)));
        assert_eq!(state.on_timer(t0 + ms(11_300)), vec![Effect::RestartRecognizer]);
    }

    #[test]
    fn abort_report_from_restarted_session_is_not_fatal() {
        let (mut state, t0) = started();
        state.on_timer(t0 + ms(3500));
        state.on_timer(t0 + ms(7000));
        assert_eq!(state.on_timer(t0 + ms(10_000)), vec![Effect::RestartRecognizer]);

        let aborted = recog(RecognitionEvent::Error(RecognitionErrorKind::Aborted));
        assert!(state.handle(aborted.clone(), t0 + ms(10_020)).is_empty());
        assert!(state.handle(recog(RecognitionEvent::End), t0 + ms(10_030)).is_empty());
        assert_eq!(state.phase(), DictationPhase::Listening);

        // With nothing owed, an abort report ends the session.
        let effects = state.handle(aborted, t0 + ms(10_500));
        assert!(effects.contains(&Effect::ReleaseAudio));
        assert_eq!(state.phase(), DictationPhase::Idle);
    }

    #[test]
    fn restart_after_recognizer_ended_owes_no_end() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::Error(RecognitionErrorKind::Network)), t0 + ms(100));
        state.handle(recog(RecognitionEvent::End), t0 + ms(150));
        assert_eq!(state.on_timer(t0 + ms(400)), vec![Effect::RestartRecognizer]);

        // The restarted session's own end is not mistaken for a stale one.
        state.handle(recog(RecognitionEvent::End), t0 + ms(2000));
        assert_eq!(state.next_deadline(), Some(t0 + ms(2300)));
    }

    #[test]
    fn stale_end_does_not_cut_finalizing_short() {
        let (mut state, t0) = started();
        state.handle(recog(RecognitionEvent::final_text("first part", 0.9)), t0 + ms(9000));
        state.on_timer(t0 + ms(10_000));
        state.handle(recog(RecognitionEvent::interim("second", 0.5)), t0 + ms(10_010));
        state.handle(DictationInput::Stop, t0 + ms(10_020));

        assert!(state.handle(recog(RecognitionEvent::End), t0 + ms(10_030)).is_empty());
        assert_eq!(state.phase(), DictationPhase::Finalizing);
        state.handle(recog(RecognitionEvent::final_text("second part", 0.9)), t0 + ms(10_040));
        let effects = state.handle(recog(RecognitionEvent::End), t0 + ms(10_050));
        assert_eq!(effects, vec![Effect::Commit("first part second part".into())]);
    }

    #[test]
    fn start_while_active_is_ignored() {
        let (mut state, t0) = started();
        assert!(state.handle(DictationInput::Start, t0 + ms(10)).is_empty());
    }

    #[test]
    fn start_failure_ends_session() {
        let (mut state, t0) = started();
        let effects = state.handle(DictationInput::StartFailed("denied".into()), t0);
        assert!(effects.contains(&Effect::ReleaseAudio));
        assert_eq!(state.phase(), DictationPhase::Idle);
    }
}
