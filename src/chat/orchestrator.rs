//! Turn orchestration for one lecture chat.
//!
//! [`LectureChat`] owns the per-lecture conversation state (transcript,
//! duplicate-answer cache, hint ladder, rate-limit flag) and drives one
//! turn at a time: consult the cache, otherwise open the answer stream,
//! reconcile its events into the transcript and persist after every
//! change. Submitting while a turn is in flight fails with
//! [`TutorError::Busy`]; the busy flag is cleared on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::cache::AnswerCache;
use super::hints::{HintEligibility, HintLadder, MIN_STAGE};
use super::message::{Message, Role, StreamId};
use super::rate_limit::{RateLimitMonitor, friendly_message_for};
use super::reconciler::{Applied, MessageReconciler};
use super::updates::ChatUpdate;
use crate::api::{AnswerBackend, Attachment, HistoryEntry, TurnRequest};
use crate::config::{ChatConfig, ResponseStyle, TeachingMode};
use crate::dictation::DictationHandle;
use crate::error::{Result, TutorError};
use crate::input::InputSlot;
use crate::storage::{KeyValueStore, SessionStore};
use crate::stream::{ResponseType, StreamEvent, TurnEventStream};

/// Which lecture a chat is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureContext {
    /// Lecture identifier, also the transcript storage key.
    pub lecture_id: String,
    /// Course title sent with every turn.
    pub course_title: String,
    /// Position of the lecture in the course.
    pub lecture_order: u32,
}

impl LectureContext {
    /// Validated context. Identifier and title must be non-empty.
    pub fn new(
        lecture_id: impl Into<String>,
        course_title: impl Into<String>,
        lecture_order: u32,
    ) -> Result<Self> {
        let lecture_id = lecture_id.into().trim().to_owned();
        let course_title = course_title.into().trim().to_owned();
        if lecture_id.is_empty() {
            return Err(TutorError::Validation("lecture id must not be empty".into()));
        }
        if course_title.is_empty() {
            return Err(TutorError::Validation("course title must not be empty".into()));
        }
        Ok(Self {
            lecture_id,
            course_title,
            lecture_order,
        })
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream finished with `done`.
    Answered {
        /// Classification from `done`.
        response_type: ResponseType,
    },
    /// Replayed from the session cache; no network.
    Cached,
    /// Answered by the non-streaming endpoint.
    Fallback {
        /// `off_topic` when the backend could not answer.
        response_type: ResponseType,
    },
    /// Transport failure or a stream without `done`; an error message was appended.
    Failed,
}

struct ChatState {
    transcript: Vec<Message>,
    cache: AnswerCache,
    hints: HintLadder,
    rate: RateLimitMonitor,
    api_key: String,
    mode: TeachingMode,
    style: ResponseStyle,
}

struct Turn {
    question: String,
    stage: u8,
    attachment: Option<Attachment>,
}

impl Turn {
    // Only first-stage, attachment-free turns read or write the cache.
    fn cacheable(&self) -> bool {
        self.stage == MIN_STAGE && self.attachment.is_none()
    }
}

/// Holds the busy flag for one turn and clears it on drop.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TutorError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One lecture's conversation.
pub struct LectureChat<B, K> {
    backend: B,
    sessions: SessionStore<K>,
    context: LectureContext,
    max_history: usize,
    max_chars: usize,
    fallback_on_unavailable: bool,
    state: Mutex<ChatState>,
    busy: AtomicBool,
    updates: Option<mpsc::UnboundedSender<ChatUpdate>>,
    dictation: Option<DictationHandle>,
    input: InputSlot,
}

impl<B, K> std::fmt::Debug for LectureChat<B, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LectureChat")
            .field("context", &self.context)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<B: AnswerBackend, K: KeyValueStore> LectureChat<B, K> {
    /// Open the chat for `context`, restoring its stored transcript.
    pub async fn open(
        backend: B,
        sessions: SessionStore<K>,
        context: LectureContext,
        api_key: impl Into<String>,
        config: &ChatConfig,
    ) -> Self {
        let transcript = sessions.load(&context.lecture_id).await;
        let mut hints = HintLadder::new();
        for message in transcript.iter().filter(|m| m.role == Role::User) {
            if let Some(stage) = message.hint_stage {
                hints.restore(&message.content, stage);
            }
        }
        info!(
            lecture_id = %context.lecture_id,
            restored = transcript.len(),
            "lecture chat opened"
        );
        Self {
            backend,
            sessions,
            context,
            max_history: config.max_history_messages,
            max_chars: config.max_message_chars,
            fallback_on_unavailable: true,
            state: Mutex::new(ChatState {
                transcript,
                cache: AnswerCache::new(),
                hints,
                rate: RateLimitMonitor::new(),
                api_key: api_key.into(),
                mode: config.teaching_mode,
                style: config.response_style,
            }),
            busy: AtomicBool::new(false),
            updates: None,
            dictation: None,
            input: InputSlot::new(),
        }
    }

    /// Publish [`ChatUpdate`]s on `tx`.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<ChatUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Stop this dictation session before every turn.
    pub fn with_dictation(mut self, handle: DictationHandle) -> Self {
        self.dictation = Some(handle);
        self
    }

    /// Share `input` as the text input buffer.
    pub fn with_input(mut self, input: InputSlot) -> Self {
        self.input = input;
        self
    }

    /// Whether HTTP 503 from the streaming endpoint falls back to `/chat`.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_unavailable = enabled;
        self
    }

    /// The lecture this chat is about.
    pub fn context(&self) -> &LectureContext {
        &self.context
    }

    /// The shared text input.
    pub fn input(&self) -> &InputSlot {
        &self.input
    }

    /// Whether a turn is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Copy of the visible transcript.
    pub async fn transcript(&self) -> Vec<Message> {
        self.state.lock().await.transcript.clone()
    }

    /// The sticky rate-limit notice, while set.
    pub async fn rate_limit_notice(&self) -> Option<&'static str> {
        self.state.lock().await.rate.notice()
    }

    /// Current answer mode.
    pub async fn mode(&self) -> TeachingMode {
        self.state.lock().await.mode
    }

    /// Switch answer mode. Cached answers are kept.
    pub async fn set_mode(&self, mode: TeachingMode) {
        info!(mode = mode.as_str(), "teaching mode changed");
        self.state.lock().await.mode = mode;
    }

    /// Switch answer tone.
    pub async fn set_style(&self, style: ResponseStyle) {
        self.state.lock().await.style = style;
    }

    /// Replace the credential sent with each turn.
    pub async fn set_api_key(&self, api_key: impl Into<String>) {
        self.state.lock().await.api_key = api_key.into();
    }

    /// Current hint stage for `question`.
    pub async fn hint_stage(&self, question: &str) -> u8 {
        self.state.lock().await.hints.stage(question)
    }

    /// Cached answer for `question`, if any.
    pub async fn cached_answer(&self, question: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .cache
            .lookup(question, false)
            .map(str::to_owned)
    }

    /// Whether the advance/reveal hint controls should be offered.
    pub async fn hint_controls_visible(&self) -> bool {
        let state = self.state.lock().await;
        self.eligibility(&state).controls_visible()
    }

    fn eligibility(&self, state: &ChatState) -> HintEligibility {
        HintEligibility {
            teaching_mode: state.mode == TeachingMode::Teach,
            last_is_finalized_assistant: state
                .transcript
                .last()
                .is_some_and(Message::is_finalized_assistant),
            last_user_stage: last_user(&state.transcript).and_then(|m| m.hint_stage),
            busy: self.is_busy(),
        }
    }

    /// Submit `text` as a new question.
    ///
    /// Rejects empty or over-long text and concurrent submissions before
    /// any network activity. Backend failures are reported in the
    /// transcript and yield [`TurnOutcome::Failed`].
    pub async fn submit(&self, text: &str, attachment: Option<Attachment>) -> Result<TurnOutcome> {
        let question = self.validate(text)?;
        let _busy = BusyGuard::acquire(&self.busy)?;
        self.stop_dictation().await;

        let stage = self.state.lock().await.hints.stage(&question);
        self.run_turn(
            Turn {
                question,
                stage,
                attachment,
            },
            true,
        )
        .await
    }

    /// Submit whatever is in the text input, stopping dictation first.
    ///
    /// The input is cleared on acceptance and left intact on rejection.
    pub async fn submit_input(&self) -> Result<TurnOutcome> {
        if self.is_busy() {
            return Err(TutorError::Busy);
        }
        self.stop_dictation().await;
        let text = self.input.take();
        let result = self.submit(&text, None).await;
        if result.is_err() {
            self.input.set(text);
        }
        result
    }

    /// Raise the last question one hint stage and ask it again.
    pub async fn advance_hint(&self) -> Result<TurnOutcome> {
        self.escalate(false).await
    }

    /// Jump the last question to the full answer and ask it again.
    pub async fn reveal_hint(&self) -> Result<TurnOutcome> {
        self.escalate(true).await
    }

    async fn escalate(&self, reveal: bool) -> Result<TurnOutcome> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let turn = {
            let mut state = self.state.lock().await;
            let mut eligibility = self.eligibility(&state);
            // Our own guard is what set the flag.
            eligibility.busy = false;
            if !eligibility.controls_visible() {
                return Err(TutorError::Validation(
                    "hint controls are not available right now".into(),
                ));
            }
            let Some(question) = last_user(&state.transcript).map(|m| m.content.clone()) else {
                return Err(TutorError::Validation("no question to escalate".into()));
            };
            let stage = if reveal {
                state.hints.reveal(&question)
            } else {
                state.hints.advance(&question)
            };
            Turn {
                question,
                stage,
                attachment: None,
            }
        };
        self.stop_dictation().await;
        self.run_turn(turn, false).await
    }

    /// Clear this lecture's transcript, cache, hint stages and notice.
    pub async fn reset(&self) -> Result<()> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let mut state = self.state.lock().await;
        state.transcript.clear();
        state.cache.clear();
        state.hints.reset();
        let was_limited = state.rate.is_limited();
        state.rate = RateLimitMonitor::new();
        self.sessions.reset(&self.context.lecture_id).await;
        info!(lecture_id = %self.context.lecture_id, "chat reset");
        if was_limited {
            self.emit(ChatUpdate::RateLimitNotice { visible: false });
        }
        self.emit(ChatUpdate::TranscriptChanged { len: 0 });
        Ok(())
    }

    fn validate(&self, text: &str) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TutorError::Validation("message must not be empty".into()));
        }
        let chars = trimmed.chars().count();
        if chars > self.max_chars {
            return Err(TutorError::Validation(format!(
                "message is {chars} characters; the limit is {}",
                self.max_chars
            )));
        }
        Ok(trimmed.to_owned())
    }

    async fn stop_dictation(&self) {
        if let Some(dictation) = &self.dictation
            && dictation.is_active()
        {
            debug!("stopping dictation before turn");
            if let Err(e) = dictation.stop().await {
                warn!("failed to stop dictation: {e}");
            }
        }
    }

    fn emit(&self, update: ChatUpdate) {
        if let Some(tx) = &self.updates {
            let _ = tx.send(update);
        }
    }

    async fn persist(&self, transcript: &[Message]) {
        self.sessions.save(&self.context.lecture_id, transcript).await;
    }

    fn history(&self, transcript: &[Message]) -> Vec<HistoryEntry> {
        let finalized: Vec<&Message> = transcript.iter().filter(|m| !m.is_streaming()).collect();
        let start = finalized.len().saturating_sub(self.max_history);
        finalized[start..]
            .iter()
            .map(|m| HistoryEntry {
                role: m.role.as_str().to_owned(),
                content: m.content.clone(),
            })
            .collect()
    }

    async fn run_turn(&self, turn: Turn, consult_cache: bool) -> Result<TurnOutcome> {
        let request = {
            let mut state = self.state.lock().await;

            if consult_cache && turn.cacheable() {
                let cached = state.cache.lookup(&turn.question, false).map(str::to_owned);
                if let Some(answer) = cached {
                    info!(lecture_id = %self.context.lecture_id, "answering repeat question from cache");
                    state.transcript.push(Message::user(&turn.question, turn.stage));
                    state.transcript.push(Message::assistant(answer));
                    self.persist(&state.transcript).await;
                    self.emit(ChatUpdate::CacheHit {
                        question: turn.question.clone(),
                    });
                    self.emit(ChatUpdate::TranscriptChanged {
                        len: state.transcript.len(),
                    });
                    return Ok(TurnOutcome::Cached);
                }
            }

            let history = self.history(&state.transcript);
            state.transcript.push(Message::user(&turn.question, turn.stage));
            self.persist(&state.transcript).await;
            self.emit(ChatUpdate::TurnStarted {
                question: turn.question.clone(),
                hint_stage: turn.stage,
            });
            self.emit(ChatUpdate::TranscriptChanged {
                len: state.transcript.len(),
            });

            TurnRequest {
                api_key: state.api_key.clone(),
                message: turn.question.clone(),
                course_title: self.context.course_title.clone(),
                current_lecture_order: self.context.lecture_order,
                lecture_id: self.context.lecture_id.clone(),
                history,
                teaching_mode: state.mode,
                response_style: state.style,
                hint_stage: turn.stage,
                image_base64: turn.attachment.clone(),
            }
        };

        info!(
            lecture_id = %self.context.lecture_id,
            hint_stage = turn.stage,
            attachment = turn.attachment.is_some(),
            "turn started"
        );
        self.emit(ChatUpdate::Composing { active: true });

        let outcome = match self.backend.open_stream(&request).await {
            Ok(stream) => self.consume(stream, &turn).await,
            Err(TutorError::Unavailable(reason)) if self.fallback_on_unavailable => {
                self.fallback(&request, &turn, &reason).await
            }
            Err(e) => self.fail(&e).await,
        };

        self.emit(ChatUpdate::Composing { active: false });
        info!(lecture_id = %self.context.lecture_id, ?outcome, "turn finished");
        Ok(outcome)
    }

    async fn consume(&self, mut stream: TurnEventStream, turn: &Turn) -> TurnOutcome {
        let mut reconciler = MessageReconciler::new(StreamId::generate());
        let mut answered = None;

        while let Some(item) = stream.next().await {
            let mut state = self.state.lock().await;
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!(stream_id = %reconciler.stream_id(), "answer stream failed: {e}");
                    reconciler.abort(&mut state.transcript, &e.message());
                    if state.rate.observe_error(&e) {
                        self.emit(ChatUpdate::RateLimitNotice { visible: true });
                    }
                    self.persist(&state.transcript).await;
                    self.emit_error_message(&state.transcript);
                    break;
                }
            };

            match reconciler.apply(&mut state.transcript, &event) {
                Applied::Started | Applied::Extended => {
                    if let StreamEvent::Token { content } = &event {
                        self.emit(ChatUpdate::Composing { active: false });
                        self.emit(ChatUpdate::Token {
                            stream_id: reconciler.stream_id().clone(),
                            text: content.clone(),
                        });
                    }
                }
                Applied::Finalized { content, payload } => {
                    let response_type = payload.response_type;
                    answered = Some(response_type);
                    // A turn that already reported an error is not a success.
                    let clean = !reconciler.saw_error();
                    if (clean || response_type == ResponseType::RateLimited)
                        && state.rate.observe_done(response_type)
                    {
                        self.emit(ChatUpdate::RateLimitNotice {
                            visible: state.rate.is_limited(),
                        });
                    }
                    if payload.cache_hit {
                        debug!("backend served this answer from its own cache");
                    }
                    if clean
                        && response_type.is_success()
                        && turn.cacheable()
                        && let Some(content) = content
                    {
                        state.cache.record(&turn.question, &content);
                    }
                    self.emit(ChatUpdate::Finalized {
                        response_type,
                        references: payload.references,
                        show_references: payload.show_references,
                    });
                }
                Applied::ErrorAppended { raw } => {
                    warn!(stream_id = %reconciler.stream_id(), "backend reported an error: {raw}");
                    if state.rate.observe_error_text(&raw) {
                        self.emit(ChatUpdate::RateLimitNotice { visible: true });
                    }
                    self.emit_error_message(&state.transcript);
                }
                Applied::Ignored => continue,
            }

            self.persist(&state.transcript).await;
            self.emit(ChatUpdate::TranscriptChanged {
                len: state.transcript.len(),
            });
        }

        if !reconciler.is_finalized() {
            let mut state = self.state.lock().await;
            if reconciler.saw_error() {
                reconciler.freeze(&mut state.transcript);
            } else {
                warn!(stream_id = %reconciler.stream_id(), "answer stream ended without done");
                reconciler.abort(
                    &mut state.transcript,
                    "the answer stream ended before completing",
                );
                self.emit_error_message(&state.transcript);
            }
            self.persist(&state.transcript).await;
            self.emit(ChatUpdate::TranscriptChanged {
                len: state.transcript.len(),
            });
        }

        match answered {
            Some(response_type) => TurnOutcome::Answered { response_type },
            None => TurnOutcome::Failed,
        }
    }

    async fn fallback(&self, request: &TurnRequest, turn: &Turn, reason: &str) -> TurnOutcome {
        warn!("streaming unavailable ({reason}); using the non-streaming endpoint");
        let reply = match self.backend.complete(request).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(&e).await,
        };

        let response_type = if reply.is_not_answerable {
            ResponseType::OffTopic
        } else {
            ResponseType::InScope
        };
        let mut message = Message::assistant(reply.message.clone());
        message.references = Some(Vec::new());
        message.response_type = Some(response_type);
        message.show_references = Some(false);

        let mut state = self.state.lock().await;
        state.transcript.push(message);
        if state.rate.observe_done(response_type) {
            self.emit(ChatUpdate::RateLimitNotice { visible: false });
        }
        if turn.cacheable() {
            state.cache.record(&turn.question, &reply.message);
        }
        self.persist(&state.transcript).await;
        self.emit(ChatUpdate::Finalized {
            response_type,
            references: Vec::new(),
            show_references: false,
        });
        self.emit(ChatUpdate::TranscriptChanged {
            len: state.transcript.len(),
        });
        TurnOutcome::Fallback { response_type }
    }

    async fn fail(&self, err: &TutorError) -> TurnOutcome {
        warn!(code = err.code(), "turn failed: {err}");
        let mut state = self.state.lock().await;
        state
            .transcript
            .push(Message::assistant(friendly_message_for(err)));
        if state.rate.observe_error(err) {
            self.emit(ChatUpdate::RateLimitNotice { visible: true });
        }
        self.persist(&state.transcript).await;
        self.emit_error_message(&state.transcript);
        self.emit(ChatUpdate::TranscriptChanged {
            len: state.transcript.len(),
        });
        TurnOutcome::Failed
    }

    fn emit_error_message(&self, transcript: &[Message]) {
        if let Some(last) = transcript.last() {
            self.emit(ChatUpdate::ErrorMessage {
                text: last.content.clone(),
            });
        }
    }
}

fn last_user(transcript: &[Message]) -> Option<&Message> {
    transcript.iter().rev().find(|m| m.role == Role::User)
}
