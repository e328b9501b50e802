//! Barge-in detection over the microphone.
//!
//! The controller owns the capture session for as long as the user is
//! listening and turns frames into two kinds of decisions:
//!
//! - **Barge-in.** While a turn is armed, sustained energy above the
//!   threshold for `activation_ms` cancels that turn's token:
//!   `Idle → Monitoring → ActivityDetected → Triggered → Idle`. A burst that
//!   dies before the activation window drops back to `Monitoring`.
//! - **End of utterance.** Once speech has been heard in a session,
//!   `silence_timeout_ms` of continuous silence ends the session and closes
//!   the microphone.
//!
//! With capture enabled the controller also keeps the samples of the
//! utterance, from the first frame of the loud run that became speech to the
//! last loud frame, and hands them out as [`InterruptionEvent::Utterance`]
//! when the session ends. An utterance that reaches the capture limit ends
//! the session early.
//!
//! Timing is measured in frame time (samples / sample rate), not wall time,
//! so the state machine is deterministic for a given frame sequence.
//!
//! This is a plain energy gate. Background noise can trigger it; that is the
//! price of reacting within one frame.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use odia_core::{
    CancelReason, MicFrame, MicStream, MicrophoneError, MicrophonePort, TurnToken, Utterance,
    VadConfig, VoiceActivityState,
};
use serde::{Deserialize, Serialize};

/// Barge-in detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionState {
    /// No turn armed (or not listening).
    Idle,
    /// Armed and listening, no activity yet.
    Monitoring,
    /// Energy above threshold, activation window not yet reached.
    ActivityDetected,
    /// Transient: the armed token is being cancelled.
    Triggered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterruptionEvent {
    Activity(VoiceActivityState),
    /// The armed turn was cancelled.
    Triggered { reason: CancelReason },
    /// What the user said this session. Always followed by `ListeningEnded`.
    Utterance(Utterance),
    /// The listening session ended and the microphone was released.
    ListeningEnded,
}

/// Samples of the utterance in progress.
#[derive(Debug)]
struct Capture {
    limit: Duration,
    samples: Vec<f32>,
    sample_rate: u32,
    captured: Duration,
    /// Length of `samples` at the last loud frame.
    speech_end: usize,
}

impl Capture {
    const fn new(limit: Duration) -> Self {
        Self {
            limit,
            samples: Vec::new(),
            sample_rate: 0,
            captured: Duration::ZERO,
            speech_end: 0,
        }
    }

    fn push(&mut self, frame: &MicFrame, loud: bool) {
        if self.samples.is_empty() {
            self.sample_rate = frame.sample_rate;
        }
        self.samples.extend_from_slice(&frame.samples);
        self.captured += frame.duration();
        if loud {
            self.speech_end = self.samples.len();
        }
    }

    fn is_full(&self) -> bool {
        self.captured >= self.limit
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.captured = Duration::ZERO;
        self.speech_end = 0;
    }

    /// The captured speech without its trailing silence.
    fn take(&mut self) -> Option<Utterance> {
        let mut samples = std::mem::take(&mut self.samples);
        samples.truncate(self.speech_end);
        self.clear();
        (!samples.is_empty()).then(|| Utterance::new(samples, self.sample_rate))
    }
}

pub struct InterruptionController {
    config: VadConfig,
    microphone: Option<Arc<dyn MicrophonePort>>,
    stream: Option<Box<dyn MicStream>>,
    state: InterruptionState,
    armed: Option<TurnToken>,
    activity: VoiceActivityState,
    active_for: Duration,
    silent_for: Duration,
    heard_speech: bool,
    supported: bool,
    capture: Option<Capture>,
    pending: VecDeque<InterruptionEvent>,
}

impl InterruptionController {
    pub fn new(config: VadConfig, microphone: Option<Arc<dyn MicrophonePort>>) -> Self {
        let supported = microphone.is_some();
        Self {
            config,
            microphone,
            stream: None,
            state: InterruptionState::Idle,
            armed: None,
            activity: VoiceActivityState::Silent,
            active_for: Duration::ZERO,
            silent_for: Duration::ZERO,
            heard_speech: false,
            supported,
            capture: None,
            pending: VecDeque::new(),
        }
    }

    /// Keep each session's utterance, up to `limit` long.
    #[must_use]
    pub fn capturing(mut self, limit: Duration) -> Self {
        self.capture = Some(Capture::new(limit));
        self
    }

    pub const fn state(&self) -> InterruptionState {
        self.state
    }

    pub const fn activity(&self) -> VoiceActivityState {
        self.activity
    }

    /// `false` once the microphone is missing or has failed to open.
    pub const fn is_supported(&self) -> bool {
        self.supported
    }

    pub const fn is_listening(&self) -> bool {
        self.stream.is_some()
    }

    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Whether [`next_event`](Self::next_event) can make progress.
    pub fn has_work(&self) -> bool {
        self.stream.is_some() || !self.pending.is_empty()
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Open the microphone and start a listening session.
    ///
    /// On failure, barge-in support is switched off for the rest of the
    /// controller's life; explicit interruption keeps working.
    pub async fn start_listening(&mut self) -> Result<(), MicrophoneError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let Some(microphone) = self.microphone.as_ref() else {
            self.supported = false;
            return Err(MicrophoneError::NoDevice);
        };
        match microphone.open().await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.reset_session();
                if self.armed.is_some() {
                    self.set_state(InterruptionState::Monitoring);
                }
                tracing::info!("Listening session started");
                Ok(())
            }
            Err(e) => {
                self.supported = false;
                tracing::warn!(error = %e, "Microphone unavailable, interruption disabled");
                Err(e)
            }
        }
    }

    /// Close the microphone. Returns `true` if a session was open.
    pub fn stop_listening(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };
        stream.close();
        self.reset_session();
        self.set_state(InterruptionState::Idle);
        tracing::info!("Listening session ended");
        true
    }

    // ── Turn arming ──────────────────────────────────────────────────

    /// Watch `token`'s turn for barge-in.
    pub fn arm(&mut self, token: TurnToken) {
        self.armed = Some(token);
        // Speech already in progress must be sustained again to count.
        self.active_for = Duration::ZERO;
        if self.stream.is_some() {
            self.set_state(InterruptionState::Monitoring);
        }
    }

    pub fn disarm(&mut self) {
        self.armed = None;
        self.set_state(InterruptionState::Idle);
    }

    /// Explicit user interruption. Returns `true` if a turn was cancelled.
    pub fn interrupt(&mut self, reason: CancelReason) -> bool {
        let cancelled = self.armed.take().is_some_and(|token| token.cancel(reason));
        self.set_state(InterruptionState::Idle);
        cancelled
    }

    // ── Frames ───────────────────────────────────────────────────────

    /// Wait for the next decision from the microphone.
    ///
    /// Returns `None` when no session is open. Cancel-safe as long as the
    /// microphone stream's `next_frame` is.
    pub async fn next_event(&mut self) -> Option<InterruptionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let stream = self.stream.as_mut()?;
            match stream.next_frame().await {
                Some(frame) => {
                    let events = self.process_frame(&frame);
                    self.pending.extend(events);
                }
                None => {
                    tracing::debug!("Microphone stream ended");
                    let mut events = Vec::new();
                    self.end_session(&mut events);
                    self.pending.extend(events);
                }
            }
        }
    }

    /// Advance the state machine by one frame.
    pub fn process_frame(&mut self, frame: &MicFrame) -> Vec<InterruptionEvent> {
        let mut events = Vec::new();
        let elapsed = frame.duration();
        let loud = frame.rms_energy() > self.config.threshold;

        if let Some(capture) = self.capture.as_mut() {
            if loud || self.heard_speech {
                capture.push(frame, loud);
            } else {
                // A burst that never became speech.
                capture.clear();
            }
        }

        if loud {
            self.silent_for = Duration::ZERO;
            self.active_for += elapsed;

            if self.activity == VoiceActivityState::Silent
                && self.active_for >= self.config.activation()
            {
                self.activity = VoiceActivityState::Speaking;
                self.heard_speech = true;
                events.push(InterruptionEvent::Activity(VoiceActivityState::Speaking));
            }

            if self.state == InterruptionState::Monitoring {
                self.set_state(InterruptionState::ActivityDetected);
            }
            if self.state == InterruptionState::ActivityDetected
                && self.active_for >= self.config.activation()
            {
                self.set_state(InterruptionState::Triggered);
                if let Some(token) = self.armed.take() {
                    if token.cancel(CancelReason::VoiceActivity) {
                        tracing::info!(
                            active_ms = self.active_for.as_millis(),
                            "Barge-in detected, cancelling turn"
                        );
                        events.push(InterruptionEvent::Triggered {
                            reason: CancelReason::VoiceActivity,
                        });
                    }
                }
                self.set_state(InterruptionState::Idle);
            }
        } else {
            self.active_for = Duration::ZERO;
            self.silent_for += elapsed;

            if self.state == InterruptionState::ActivityDetected {
                self.set_state(InterruptionState::Monitoring);
            }
            if self.activity == VoiceActivityState::Speaking
                && self.silent_for >= self.config.activation()
            {
                self.activity = VoiceActivityState::Silent;
                events.push(InterruptionEvent::Activity(VoiceActivityState::Silent));
            }
        }

        let capture_full = self.capture.as_ref().is_some_and(Capture::is_full);
        if self.heard_speech && (self.silent_for >= self.config.silence_timeout() || capture_full) {
            if capture_full {
                tracing::debug!("Utterance reached the capture limit");
            }
            self.end_session(&mut events);
        }
        events
    }

    /// Hand out the utterance (if any) and close the session.
    fn end_session(&mut self, events: &mut Vec<InterruptionEvent>) {
        let utterance = if self.heard_speech {
            self.capture.as_mut().and_then(Capture::take)
        } else {
            None
        };
        if let Some(utterance) = utterance {
            tracing::debug!(duration_ms = utterance.duration().as_millis(), "Utterance captured");
            events.push(InterruptionEvent::Utterance(utterance));
        }
        if !self.stop_listening() {
            self.reset_session();
        }
        events.push(InterruptionEvent::ListeningEnded);
    }

    fn reset_session(&mut self) {
        self.activity = VoiceActivityState::Silent;
        self.active_for = Duration::ZERO;
        self.silent_for = Duration::ZERO;
        self.heard_speech = false;
        if let Some(capture) = self.capture.as_mut() {
            capture.clear();
        }
    }

    fn set_state(&mut self, new_state: InterruptionState) {
        if self.state != new_state {
            tracing::debug!(old = ?self.state, new = ?new_state, "Interruption state transition");
            self.state = new_state;
        }
    }
}
