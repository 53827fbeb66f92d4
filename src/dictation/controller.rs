//! Dictation controller, its tokio driver and the async handle.
//!
//! [`DictationController`] applies the machine's effects to the real
//! recognizer, audio input and text input. [`DictationDriver`] owns a
//! controller and multiplexes user commands, recognizer events and timers
//! in one `select!` loop. [`DictationHandle`] is the cloneable front end.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::{AudioInput, AudioLease};
use super::machine::{DictationInput, DictationPhase, DictationState, DictationTimings, Effect};
use super::recognizer::{RecognitionEvent, RecognizerOptions, SpeechRecognizer};
use crate::config::DictationConfig;
use crate::error::TutorError;
use crate::input::InputSlot;

/// Observable dictation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictationSnapshot {
    /// Current phase.
    pub phase: DictationPhase,
    /// Accumulated final transcript.
    pub final_text: String,
    /// Latest interim text.
    pub interim: String,
    /// Confidence estimate, 0–100.
    pub confidence: u8,
    /// Transient inline hint.
    pub hint: Option<String>,
    /// Whether an audio lease is held.
    pub audio_held: bool,
}

/// Synchronous core: state machine plus the resources it drives.
pub struct DictationController {
    state: DictationState,
    options: RecognizerOptions,
    recognizer: Box<dyn SpeechRecognizer>,
    audio: Box<dyn AudioInput>,
    lease: Option<AudioLease>,
    input: InputSlot,
}

impl std::fmt::Debug for DictationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictationController")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl DictationController {
    /// Build a controller writing into `input`.
    pub fn new(
        config: &DictationConfig,
        recognizer: Box<dyn SpeechRecognizer>,
        audio: Box<dyn AudioInput>,
        input: InputSlot,
    ) -> Self {
        Self {
            state: DictationState::new(DictationTimings::from(config)),
            options: RecognizerOptions::from(config),
            recognizer,
            audio,
            lease: None,
            input,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> DictationPhase {
        self.state.phase()
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.next_deadline()
    }

    /// Snapshot for observers.
    pub fn snapshot(&self) -> DictationSnapshot {
        DictationSnapshot {
            phase: self.state.phase(),
            final_text: self.state.final_text().to_owned(),
            interim: self.state.interim().to_owned(),
            confidence: self.state.confidence(),
            hint: self.state.hint().map(str::to_owned),
            audio_held: self.lease.is_some(),
        }
    }

    /// Feed one input through the machine and perform its effects.
    pub fn handle(&mut self, input: DictationInput, now: Instant) {
        let effects = self.state.handle(input, now);
        self.perform(effects, now);
    }

    /// Fire due timers.
    pub fn on_timer(&mut self, now: Instant) {
        let effects = self.state.on_timer(now);
        self.perform(effects, now);
    }

    fn perform(&mut self, effects: Vec<Effect>, now: Instant) {
        let mut queue = std::collections::VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            debug!(?effect, "dictation effect");
            let failure = match effect {
                Effect::AcquireAudio => {
                    match self.audio.acquire() {
                        Ok(lease) => self.lease = Some(lease),
                        Err(e) => warn!("audio input unavailable, continuing without it: {e}"),
                    }
                    None
                }
                Effect::ReleaseAudio => {
                    self.lease = None;
                    None
                }
                Effect::StartRecognizer => self.recognizer.start(&self.options).err(),
                Effect::StopRecognizer => {
                    self.recognizer.stop();
                    None
                }
                Effect::AbortRecognizer => {
                    self.recognizer.abort();
                    None
                }
                Effect::RestartRecognizer => {
                    self.recognizer.abort();
                    self.recognizer.start(&self.options).err()
                }
                Effect::Commit(text) => {
                    self.commit(&text);
                    None
                }
            };
            if let Some(e) = failure {
                queue.extend(self.state.handle(DictationInput::StartFailed(e.message()), now));
            }
        }
    }

    fn commit(&self, text: &str) {
        let existing = self.input.get();
        let combined = if existing.trim().is_empty() {
            text.to_owned()
        } else {
            format!("{} {text}", existing.trim_end())
        };
        info!(chars = text.len(), "dictation committed to input");
        self.input.set(combined);
    }
}

enum Command {
    Start(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    Cancel(oneshot::Sender<()>),
}

/// Tokio task running a [`DictationController`].
pub struct DictationDriver {
    controller: DictationController,
    events: mpsc::UnboundedReceiver<RecognitionEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<DictationSnapshot>,
    cancel: CancellationToken,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl DictationDriver {
    /// Spawn the driver on the current runtime.
    ///
    /// `events` is the channel the recognizer publishes on.
    pub fn spawn(
        controller: DictationController,
        events: mpsc::UnboundedReceiver<RecognitionEvent>,
    ) -> (DictationHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let cancel = CancellationToken::new();

        let driver = Self {
            controller,
            events,
            commands: command_rx,
            snapshots: snapshot_tx,
            cancel: cancel.clone(),
            idle_waiters: Vec::new(),
        };
        let task = tokio::spawn(driver.run());

        let handle = DictationHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            cancel,
        };
        (handle, task)
    }

    async fn run(mut self) {
        let mut events_open = true;
        loop {
            let deadline = self.controller.next_deadline();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.on_command(command);
                }
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.controller.handle(DictationInput::Recognition(event), Instant::now()),
                    None => {
                        debug!("recognizer event channel closed");
                        events_open = false;
                    }
                },
                _ = sleep_until(deadline) => self.controller.on_timer(Instant::now()),
            }
            self.publish();
        }

        self.controller.handle(DictationInput::Cancel, Instant::now());
        self.publish();
        info!("dictation driver stopped");
    }

    fn on_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Start(ack) => {
                self.controller.handle(DictationInput::Start, now);
                let _ = ack.send(());
            }
            Command::Stop(ack) => {
                self.controller.handle(DictationInput::Stop, now);
                self.idle_waiters.push(ack);
            }
            Command::Cancel(ack) => {
                self.controller.handle(DictationInput::Cancel, now);
                self.idle_waiters.push(ack);
            }
        }
    }

    fn publish(&mut self) {
        let snapshot = self.controller.snapshot();
        let idle = snapshot.phase == DictationPhase::Idle;
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        // Waiters observe the idle snapshot once woken.
        if idle {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable async front end to a running [`DictationDriver`].
#[derive(Debug, Clone)]
pub struct DictationHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<DictationSnapshot>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Start(_) => "Start",
            Self::Stop(_) => "Stop",
            Self::Cancel(_) => "Cancel",
        })
    }
}

impl DictationHandle {
    async fn send(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> Result<(), TutorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| TutorError::Dictation("dictation driver is not running".into()))?;
        rx.await
            .map_err(|_| TutorError::Dictation("dictation driver stopped".into()))
    }

    /// Begin listening. No-op while a session is active.
    pub async fn start(&self) -> Result<(), TutorError> {
        self.send(Command::Start).await
    }

    /// Stop listening and commit the transcript. Resolves once idle.
    pub async fn stop(&self) -> Result<(), TutorError> {
        self.send(Command::Stop).await
    }

    /// Stop listening and discard the transcript. Resolves once idle.
    pub async fn cancel(&self) -> Result<(), TutorError> {
        self.send(Command::Cancel).await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> DictationSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Whether a session is listening or finalizing.
    pub fn is_active(&self) -> bool {
        self.snapshots.borrow().phase != DictationPhase::Idle
    }

    /// Receiver of state changes.
    pub fn subscribe(&self) -> watch::Receiver<DictationSnapshot> {
        self.snapshots.clone()
    }

    /// Shut the driver down, releasing any held resources.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
