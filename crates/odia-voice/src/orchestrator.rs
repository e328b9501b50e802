//! Conversation orchestrator: wires the pipeline together, one turn at a time.
//!
//! The orchestrator runs as a single task that owns every pipeline stage.
//! Callers talk to it through an [`OrchestratorHandle`] and observe it through
//! the [`ConversationEvent`] receiver returned by [`ConversationOrchestrator::new`].
//!
//! ```text
//!   Idle → AwaitingFirstToken → Streaming → Draining → Completed
//!                 │                 │           │
//!                 └─────────────────┴───────────┴──→ Interrupted / Errored
//! ```
//!
//! Each turn gets a fresh [`TurnToken`] shared by the reader, the synthesis
//! queue and the interruption controller. Within a turn the task waits on
//! all suspension points at once (next token, next synthesis result, playback
//! completion, next microphone frame, next command), so a cancellation is
//! observed at whichever wait is in progress. When the token is set, every
//! stage is torn down and acknowledges it before the next turn may start.
//!
//! With a [`SpeechToTextPort`] wired in, an utterance that ends a listening
//! session is transcribed and submitted like typed text. A transcript that
//! arrives while a turn is active supersedes it.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use odia_core::{
    AudioOutputPort, CancelReason, ChatRequest, ChatStreamPort, ConversationEvent,
    MicrophonePort, NoopTranscriptSink, PipelineConfig, SpeechSynthesisPort, SpeechToTextPort,
    SynthesisError, TextChunk, TranscriptSink, TranscriptionError, TransportError, Turn, TurnId,
    TurnToken, Utterance, WidgetConfig, WidgetStatus,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::VoiceError;
use crate::interruption::{InterruptionController, InterruptionEvent};
use crate::playback::{PlaybackEvent, PlaybackQueue};
use crate::segmenter::SentenceSegmenter;
use crate::synthesis::{SkipReason, SynthesisOutput, SynthesisQueue};
use crate::token_stream::{ReadOutcome, TokenStreamReader};

/// Shown to the user when a turn fails on the token stream.
pub const TURN_ERROR_MESSAGE: &str =
    "Sorry, there was an error processing your request. Please try again.";

/// Shown to the user when voice input could not be transcribed.
pub const TRANSCRIPTION_ERROR_MESSAGE: &str = "Sorry, I didn't catch that. Please try again.";

type Transcription = BoxFuture<'static, Result<String, TranscriptionError>>;

// ── Dependencies ───────────────────────────────────────────────────

/// Collaborators injected into the orchestrator.
///
/// Only `chat` is required. Without a synthesizer and an output the
/// orchestrator runs text-only; without a microphone there is no barge-in;
/// without a transcriber the microphone is only used for barge-in.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub chat: Arc<dyn ChatStreamPort>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesisPort>>,
    pub output: Option<Arc<dyn AudioOutputPort>>,
    pub microphone: Option<Arc<dyn MicrophonePort>>,
    pub transcriber: Option<Arc<dyn SpeechToTextPort>>,
    pub transcripts: Arc<dyn TranscriptSink>,
}

impl OrchestratorDeps {
    pub fn text_only(chat: Arc<dyn ChatStreamPort>) -> Self {
        Self {
            chat,
            synthesizer: None,
            output: None,
            microphone: None,
            transcriber: None,
            transcripts: Arc::new(NoopTranscriptSink),
        }
    }

    #[must_use]
    pub fn with_voice(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesisPort>,
        output: Arc<dyn AudioOutputPort>,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_microphone(mut self, microphone: Arc<dyn MicrophonePort>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn SpeechToTextPort>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    #[must_use]
    pub fn with_transcripts(mut self, transcripts: Arc<dyn TranscriptSink>) -> Self {
        self.transcripts = transcripts;
        self
    }
}

// ── Turn bookkeeping ───────────────────────────────────────────────

/// Non-terminal phase of the active turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingFirstToken,
    Streaming,
    /// Stream finished; synthesis and playback are emptying.
    Draining,
}

/// What each stage reported when a turn was torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub stream_aborted: bool,
    pub text_discarded: usize,
    pub requests_aborted: usize,
    pub audio_discarded: usize,
}

// ── Commands & handle ──────────────────────────────────────────────

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<TurnId, VoiceError>>,
    },
    /// Transcribed voice input; never sent through the handle.
    Heard {
        text: String,
    },
    Interrupt {
        reply: oneshot::Sender<bool>,
    },
    StartListening {
        reply: oneshot::Sender<Result<(), VoiceError>>,
    },
    StopListening,
    Shutdown {
        reply: oneshot::Sender<Vec<Turn>>,
    },
}

/// Cloneable handle to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl OrchestratorHandle {
    /// Start a new turn. Any active turn is interrupted and torn down first;
    /// this resolves once the new turn has been accepted.
    pub async fn submit(&self, text: impl Into<String>) -> Result<TurnId, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            text: text.into(),
            reply,
        })?;
        rx.await.map_err(|_| VoiceError::OrchestratorStopped)?
    }

    /// Explicit user interruption. Returns `true` if a turn was cancelled.
    pub async fn interrupt(&self) -> Result<bool, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Interrupt { reply })?;
        rx.await.map_err(|_| VoiceError::OrchestratorStopped)
    }

    pub async fn start_listening(&self) -> Result<(), VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartListening { reply })?;
        rx.await.map_err(|_| VoiceError::OrchestratorStopped)?
    }

    pub fn stop_listening(&self) -> Result<(), VoiceError> {
        self.send(Command::StopListening)
    }

    /// Cancel any active turn, stop the task and return the turn history.
    pub async fn shutdown(&self) -> Result<Vec<Turn>, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        rx.await.map_err(|_| VoiceError::OrchestratorStopped)
    }

    fn send(&self, command: Command) -> Result<(), VoiceError> {
        self.commands
            .send(command)
            .map_err(|_| VoiceError::OrchestratorStopped)
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

pub struct ConversationOrchestrator {
    deps: OrchestratorDeps,
    config: PipelineConfig,
    widget: WidgetConfig,
    interruption: InterruptionController,
    transcription: Option<Transcription>,
    history: Vec<Turn>,
    status: WidgetStatus,
    event_tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl ConversationOrchestrator {
    pub fn new(
        deps: OrchestratorDeps,
        config: PipelineConfig,
        widget: WidgetConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut interruption =
            InterruptionController::new(config.vad.clone(), deps.microphone.clone());
        if deps.transcriber.is_some() {
            interruption = interruption.capturing(config.transcription.max_utterance());
        }
        let orchestrator = Self {
            deps,
            config,
            widget,
            interruption,
            transcription: None,
            history: Vec::new(),
            status: WidgetStatus::Idle,
            event_tx,
        };
        (orchestrator, event_rx)
    }

    /// Run the orchestrator on the current tokio runtime.
    pub fn spawn(self) -> OrchestratorHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        OrchestratorHandle { commands }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub const fn status(&self) -> WidgetStatus {
        self.status
    }

    /// Whether replies will be synthesized and played.
    pub fn voice_enabled(&self) -> bool {
        self.widget.voice_enabled() && self.deps.synthesizer.is_some() && self.deps.output.is_some()
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::info!(voice = self.voice_enabled(), "Conversation orchestrator started");
        let mut deferred: Option<Command> = None;

        loop {
            let command = match deferred.take() {
                Some(command) => command,
                None => {
                    let listening = self.interruption.has_work();
                    let transcribing = self.transcription.is_some();
                    tokio::select! {
                        command = commands.recv() => match command {
                            Some(command) => command,
                            None => break,
                        },
                        event = self.interruption.next_event(), if listening => {
                            if let Some(event) = event {
                                self.on_interruption_event(event);
                            }
                            continue;
                        }
                        result = next_transcription(&mut self.transcription), if transcribing => {
                            match result.and_then(|r| self.on_transcription(r)) {
                                Some(text) => Command::Heard { text },
                                None => continue,
                            }
                        }
                    }
                }
            };

            match command {
                Command::Submit { text, reply } => {
                    let text = text.trim();
                    if text.is_empty() {
                        let _ = reply.send(Err(VoiceError::EmptyInput));
                        continue;
                    }
                    let turn = Turn::new(text);
                    let _ = reply.send(Ok(turn.id));
                    deferred = self.drive_turn(turn, &mut commands).await;
                }
                Command::Heard { text } => {
                    deferred = self.drive_turn(Turn::new(text), &mut commands).await;
                }
                Command::Interrupt { reply } => {
                    let _ = reply.send(false);
                }
                Command::StartListening { reply } => {
                    let result = self.start_listening().await;
                    let _ = reply.send(result);
                }
                Command::StopListening => self.stop_listening(),
                Command::Shutdown { reply } => {
                    self.stop_listening();
                    let _ = reply.send(self.history.clone());
                    break;
                }
            }
        }

        self.interruption.stop_listening();
        tracing::info!(turns = self.history.len(), "Conversation orchestrator stopped");
    }

    // ── Turn driver ────────────────────────────────────────────────

    /// Run one turn to a terminal status.
    ///
    /// Returns a command received mid-turn that must be handled after
    /// teardown (a superseding submit or transcript, or a shutdown).
    #[allow(clippy::too_many_lines)]
    async fn drive_turn(
        &mut self,
        mut turn: Turn,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Option<Command> {
        let turn_id = turn.id;
        let token = TurnToken::new();
        tracing::info!(%turn_id, "Turn started");
        self.emit(ConversationEvent::TurnStarted {
            turn_id,
            user_text: turn.user_text.clone(),
        });
        self.set_status(WidgetStatus::Thinking);

        let request = ChatRequest::for_turn(
            &self.config.system_prompt,
            &self.history,
            &turn.user_text,
            self.config.history_limit,
            self.config.generation,
        );
        let mut reader = TokenStreamReader::new(
            Arc::clone(&self.deps.chat),
            request,
            token.clone(),
            self.config.stream.clone(),
        );
        let mut segmenter = SentenceSegmenter::new(self.config.segmenter.soft_limit);
        let (mut synthesis, mut playback) = self.voice_lane(&token);
        let mut playback_drained = false;
        self.interruption.arm(token.clone());

        let mut phase = TurnPhase::AwaitingFirstToken;
        let mut deferred = None;
        let mut failure: Option<TransportError> = None;

        loop {
            if token.is_cancelled() {
                break;
            }
            if phase == TurnPhase::Draining {
                match (synthesis.as_ref(), playback.as_mut()) {
                    (Some(synth), Some(play)) => {
                        if synth.is_drained() && !play.is_closed() {
                            play.close();
                        }
                        if playback_drained {
                            break;
                        }
                    }
                    _ => break,
                }
            }

            let reading = phase != TurnPhase::Draining;
            let listening = self.interruption.has_work();
            let synthesizing = synthesis.as_ref().is_some_and(SynthesisQueue::has_pending);
            let playing = playback.as_ref().is_some_and(PlaybackQueue::has_work);
            let transcribing = self.transcription.is_some();

            tokio::select! {
                biased;

                () = token.cancelled() => break,

                command = commands.recv() => {
                    self.on_turn_command(command, &token, &mut deferred).await;
                }

                event = self.interruption.next_event(), if listening => {
                    if let Some(event) = event {
                        self.on_interruption_event(event);
                    }
                }

                result = next_transcription(&mut self.transcription), if transcribing => {
                    if let Some(text) = result.and_then(|r| self.on_transcription(r)) {
                        token.cancel(CancelReason::Superseded);
                        deferred = Some(Command::Heard { text });
                    }
                }

                output = next_synthesis(&mut synthesis), if synthesizing => match output {
                    Some(SynthesisOutput::Ready(unit)) => {
                        if let Some(play) = playback.as_mut() {
                            play.enqueue(unit);
                        }
                    }
                    Some(SynthesisOutput::Skipped { index, reason }) => {
                        if let SkipReason::Failed(SynthesisError::Unavailable(ref detail)) = reason {
                            tracing::warn!(%detail, "Speech synthesis unavailable, later turns are text-only");
                            self.widget.synthesis_available = false;
                        }
                        self.emit(ConversationEvent::AudioSkipped { turn_id, index });
                    }
                    None => {}
                },

                event = next_playback(&mut playback), if playing => match event {
                    Some(PlaybackEvent::Started { index }) => {
                        self.set_status(WidgetStatus::Speaking);
                        self.emit(ConversationEvent::AudioStarted { turn_id, index });
                    }
                    Some(PlaybackEvent::Finished { index }) => {
                        self.emit(ConversationEvent::AudioFinished { turn_id, index });
                    }
                    Some(PlaybackEvent::Failed { index, .. }) => {
                        self.emit(ConversationEvent::AudioSkipped { turn_id, index });
                    }
                    Some(PlaybackEvent::Drained) => playback_drained = true,
                    None => {}
                },

                outcome = reader.next(), if reading => match outcome {
                    ReadOutcome::Delta(delta) => {
                        if phase == TurnPhase::AwaitingFirstToken {
                            advance(&mut phase, TurnPhase::Streaming, turn_id);
                        }
                        turn.append_assistant(&delta);
                        let chunks = segmenter.push(&delta);
                        self.emit(ConversationEvent::TextDelta { turn_id, delta });
                        for chunk in chunks {
                            self.queue_chunk(turn_id, chunk, synthesis.as_mut());
                        }
                    }
                    ReadOutcome::Finished => {
                        if let Some(chunk) = segmenter.finish() {
                            self.queue_chunk(turn_id, chunk, synthesis.as_mut());
                        }
                        if let Some(synth) = synthesis.as_mut() {
                            synth.close();
                        }
                        advance(&mut phase, TurnPhase::Draining, turn_id);
                    }
                    // The token branch picks this up on the next iteration.
                    ReadOutcome::Cancelled => {}
                    ReadOutcome::Failed(e) => {
                        failure = Some(e);
                        break;
                    }
                },
            }
        }

        self.interruption.disarm();

        // ── Teardown ───────────────────────────────────────────────
        let completed = failure.is_none() && !token.is_cancelled();
        if !completed {
            let report = TeardownReport {
                stream_aborted: reader.abort(),
                text_discarded: segmenter.cancel(),
                requests_aborted: synthesis.as_mut().map_or(0, SynthesisQueue::cancel),
                audio_discarded: playback.as_mut().map_or(0, PlaybackQueue::stop),
            };
            let acknowledged = reader.is_terminal()
                && segmenter.is_closed()
                && synthesis.as_ref().is_none_or(SynthesisQueue::is_cancelled)
                && playback.as_ref().is_none_or(PlaybackQueue::is_stopped);
            debug_assert!(acknowledged, "every stage must acknowledge teardown");
            tracing::debug!(%turn_id, ?report, acknowledged, "Turn torn down");
        }
        drop((reader, synthesis, playback));

        // ── Terminal status ────────────────────────────────────────
        if let Some(error) = failure {
            turn.fail(error.to_string());
            tracing::warn!(%turn_id, error = %error, "Turn failed");
            self.emit(ConversationEvent::Error {
                turn_id: Some(turn_id),
                message: TURN_ERROR_MESSAGE.to_string(),
            });
        } else if token.is_cancelled() {
            let reason = token.reason().unwrap_or(CancelReason::UserAction);
            turn.interrupt();
            tracing::info!(%turn_id, ?reason, "Turn interrupted");
            self.emit(ConversationEvent::TurnInterrupted { turn_id, reason });
            self.set_status(WidgetStatus::Interrupted);
        } else {
            turn.complete();
            tracing::info!(%turn_id, chars = turn.assistant_text.len(), "Turn completed");
        }

        self.deps.transcripts.record(&turn);
        self.emit(ConversationEvent::TurnFinished { turn: turn.clone() });
        self.history.push(turn);
        self.set_status(self.resting_status());
        deferred
    }

    async fn on_turn_command(
        &mut self,
        command: Option<Command>,
        token: &TurnToken,
        deferred: &mut Option<Command>,
    ) {
        match command {
            Some(command @ (Command::Submit { .. } | Command::Heard { .. })) => {
                token.cancel(CancelReason::Superseded);
                *deferred = Some(command);
            }
            Some(Command::Interrupt { reply }) => {
                let cancelled = self.interruption.interrupt(CancelReason::UserAction)
                    || token.cancel(CancelReason::UserAction);
                let _ = reply.send(cancelled);
            }
            Some(Command::StartListening { reply }) => {
                let result = self.start_listening().await;
                let _ = reply.send(result);
            }
            Some(Command::StopListening) => self.stop_listening(),
            Some(command @ Command::Shutdown { .. }) => {
                token.cancel(CancelReason::Shutdown);
                *deferred = Some(command);
            }
            None => {
                token.cancel(CancelReason::Shutdown);
            }
        }
    }

    fn voice_lane(&self, token: &TurnToken) -> (Option<SynthesisQueue>, Option<PlaybackQueue>) {
        if !self.widget.voice_enabled() {
            return (None, None);
        }
        match (&self.deps.synthesizer, &self.deps.output) {
            (Some(synthesizer), Some(output)) => (
                Some(SynthesisQueue::new(
                    Arc::clone(synthesizer),
                    self.config.synthesis.clone(),
                    self.widget.voice.clone(),
                    token.clone(),
                )),
                Some(PlaybackQueue::new(Arc::clone(output))),
            ),
            _ => (None, None),
        }
    }

    fn queue_chunk(&self, turn_id: TurnId, chunk: TextChunk, synthesis: Option<&mut SynthesisQueue>) {
        tracing::debug!(%turn_id, index = chunk.index, boundary = ?chunk.boundary, "Chunk ready");
        self.emit(ConversationEvent::ChunkQueued {
            turn_id,
            index: chunk.index,
            text: chunk.text.clone(),
        });
        if let Some(synthesis) = synthesis {
            synthesis.submit(chunk);
        }
    }

    // ── Listening ──────────────────────────────────────────────────

    async fn start_listening(&mut self) -> Result<(), VoiceError> {
        if self.interruption.is_listening() {
            return Err(VoiceError::AlreadyListening);
        }
        if self.deps.microphone.is_none() {
            return Err(VoiceError::NoMicrophone);
        }
        match self.interruption.start_listening().await {
            Ok(()) => {
                if self.status == WidgetStatus::Idle {
                    self.set_status(WidgetStatus::Listening);
                }
                Ok(())
            }
            Err(e) => {
                self.emit(ConversationEvent::InterruptionUnavailable {
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn stop_listening(&mut self) {
        if self.interruption.stop_listening() && self.status == WidgetStatus::Listening {
            self.set_status(WidgetStatus::Idle);
        }
    }

    fn on_interruption_event(&mut self, event: InterruptionEvent) {
        match event {
            InterruptionEvent::Activity(state) => {
                self.emit(ConversationEvent::VoiceActivity { state });
            }
            InterruptionEvent::Triggered { reason } => {
                tracing::debug!(?reason, "Interruption triggered");
            }
            InterruptionEvent::Utterance(utterance) => self.transcribe(utterance),
            InterruptionEvent::ListeningEnded => {
                self.emit(ConversationEvent::ListeningEnded);
                if self.status == WidgetStatus::Listening {
                    self.set_status(WidgetStatus::Idle);
                }
            }
        }
    }

    // ── Voice input ────────────────────────────────────────────────

    /// Start transcribing `utterance`, replacing any transcription in flight.
    fn transcribe(&mut self, utterance: Utterance) {
        let Some(transcriber) = self.deps.transcriber.clone() else {
            return;
        };
        tracing::debug!(duration_ms = utterance.duration().as_millis(), "Transcribing utterance");
        let language = self.config.transcription.language.clone();
        let limit = self.config.transcription.request_timeout();
        self.transcription = Some(Box::pin(async move {
            tokio::time::timeout(limit, transcriber.transcribe(&utterance, &language))
                .await
                .unwrap_or(Err(TranscriptionError::Timeout(limit)))
        }));
    }

    /// The text to submit for a finished transcription, if any.
    fn on_transcription(&self, result: Result<String, TranscriptionError>) -> Option<String> {
        match result {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::debug!("Utterance transcribed to nothing");
                    return None;
                }
                tracing::info!(chars = text.len(), "Utterance transcribed");
                self.emit(ConversationEvent::Transcribed {
                    text: text.to_string(),
                });
                Some(text.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transcription failed");
                self.emit(ConversationEvent::Error {
                    turn_id: None,
                    message: TRANSCRIPTION_ERROR_MESSAGE.to_string(),
                });
                None
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    const fn resting_status(&self) -> WidgetStatus {
        if self.interruption.is_listening() {
            WidgetStatus::Listening
        } else {
            WidgetStatus::Idle
        }
    }

    fn set_status(&mut self, new_status: WidgetStatus) {
        if self.status != new_status {
            tracing::debug!(old = ?self.status, new = ?new_status, "Widget status transition");
            self.status = new_status;
            self.emit(ConversationEvent::StatusChanged { status: new_status });
        }
    }

    /// Emit an event. A dropped receiver is logged and otherwise ignored.
    fn emit(&self, event: ConversationEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::warn!("Conversation event receiver dropped");
        }
    }
}

fn advance(phase: &mut TurnPhase, next: TurnPhase, turn_id: TurnId) {
    tracing::debug!(%turn_id, old = ?*phase, new = ?next, "Turn phase transition");
    *phase = next;
}

/// Cancel-safe: the transcription stays in place until it resolves.
async fn next_transcription(
    pending: &mut Option<Transcription>,
) -> Option<Result<String, TranscriptionError>> {
    let result = pending.as_mut()?.await;
    *pending = None;
    Some(result)
}

async fn next_synthesis(queue: &mut Option<SynthesisQueue>) -> Option<SynthesisOutput> {
    match queue {
        Some(queue) => queue.next_output().await,
        None => None,
    }
}

async fn next_playback(queue: &mut Option<PlaybackQueue>) -> Option<PlaybackEvent> {
    match queue {
        Some(queue) => queue.next_event().await,
        None => None,
    }
}
