//! Pipelined speech synthesis with in-order release.
//!
//! Requests for consecutive chunks overlap (up to `max_in_flight`), so they
//! complete in whatever order the provider answers. Finished results wait in
//! a reorder buffer and are released strictly by chunk index. A failed chunk
//! is released as [`SynthesisOutput::Skipped`] so the chunks after it are not
//! held back.
//!
//! Request futures are polled by whoever awaits
//! [`next_output`](SynthesisQueue::next_output); nothing is spawned. Dropping
//! the queue, or calling [`cancel`](SynthesisQueue::cancel), drops every
//! in-flight future and with it the underlying HTTP request.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use odia_core::{
    AudioUnit, SpeechSynthesisPort, SynthesisConfig, SynthesisError, SynthesisRequest,
    SynthesizedAudio, TextChunk, TurnToken, estimate_speech_duration,
};

use crate::speakable::speakable_text;

/// Why a chunk produced no audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing pronounceable in the chunk.
    Unspeakable,
    /// The request failed or timed out.
    Failed(SynthesisError),
}

/// One in-order release from the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutput {
    Ready(AudioUnit),
    Skipped { index: u64, reason: SkipReason },
}

impl SynthesisOutput {
    pub const fn index(&self) -> u64 {
        match self {
            Self::Ready(unit) => unit.index,
            Self::Skipped { index, .. } => *index,
        }
    }
}

struct Completed {
    index: u64,
    text: String,
    result: Result<SynthesizedAudio, SynthesisError>,
}

pub struct SynthesisQueue {
    port: Arc<dyn SpeechSynthesisPort>,
    config: SynthesisConfig,
    voice: String,
    token: TurnToken,
    /// Accepted chunks waiting for a concurrency slot.
    waiting: VecDeque<(u64, String)>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completed>>,
    reorder: BTreeMap<u64, SynthesisOutput>,
    next_submit: u64,
    next_release: u64,
    closed: bool,
    cancelled: bool,
}

impl SynthesisQueue {
    pub fn new(
        port: Arc<dyn SpeechSynthesisPort>,
        config: SynthesisConfig,
        voice: impl Into<String>,
        token: TurnToken,
    ) -> Self {
        Self {
            port,
            config,
            voice: voice.into(),
            token,
            waiting: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            reorder: BTreeMap::new(),
            next_submit: 0,
            next_release: 0,
            closed: false,
            cancelled: false,
        }
    }

    /// Accept the next chunk. Chunks must arrive in index order.
    ///
    /// Returns `false` if the chunk was refused (queue closed or cancelled,
    /// or the index is not the next expected one).
    pub fn submit(&mut self, chunk: TextChunk) -> bool {
        if self.closed || self.cancelled || self.token.is_cancelled() {
            return false;
        }
        if chunk.index != self.next_submit {
            tracing::warn!(
                expected = self.next_submit,
                got = chunk.index,
                "Out-of-order chunk refused"
            );
            return false;
        }
        self.next_submit += 1;

        match speakable_text(&chunk.text) {
            Some(text) => {
                self.waiting.push_back((chunk.index, text));
                self.fill_slots();
            }
            None => {
                tracing::debug!(index = chunk.index, "Chunk has nothing to speak, skipping");
                self.reorder.insert(
                    chunk.index,
                    SynthesisOutput::Skipped {
                        index: chunk.index,
                        reason: SkipReason::Unspeakable,
                    },
                );
            }
        }
        true
    }

    /// No more chunks will be submitted for this turn.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether [`next_output`](Self::next_output) has anything to wait for.
    pub fn has_pending(&self) -> bool {
        !self.cancelled
            && (!self.in_flight.is_empty()
                || !self.waiting.is_empty()
                || self.reorder.contains_key(&self.next_release))
    }

    /// Closed and every submitted chunk has been released.
    pub fn is_drained(&self) -> bool {
        self.cancelled || (self.closed && self.next_release == self.next_submit)
    }

    /// Next output in index order, or `None` if nothing is pending right now
    /// (or the turn was cancelled).
    ///
    /// Cancel-safe: dropping the returned future loses no completed result.
    pub async fn next_output(&mut self) -> Option<SynthesisOutput> {
        loop {
            if self.cancelled {
                return None;
            }
            if self.token.is_cancelled() {
                self.cancel();
                return None;
            }
            if let Some(output) = self.reorder.remove(&self.next_release) {
                self.next_release += 1;
                return Some(output);
            }
            self.fill_slots();
            if self.in_flight.is_empty() {
                return None;
            }

            let completed = tokio::select! {
                biased;
                () = self.token.cancelled() => None,
                completed = self.in_flight.next() => completed,
            };
            // A result that lands after cancellation is discarded.
            if self.token.is_cancelled() {
                self.cancel();
                return None;
            }
            if let Some(completed) = completed {
                let output = self.settle(completed);
                self.reorder.insert(output.index(), output);
            }
        }
    }

    /// Drop all in-flight requests and buffered results.
    ///
    /// Returns the number of requests that were aborted.
    pub fn cancel(&mut self) -> usize {
        let aborted = self.in_flight.len();
        let discarded = self.reorder.len() + self.waiting.len();
        self.in_flight = FuturesUnordered::new();
        self.waiting.clear();
        self.reorder.clear();
        if !self.cancelled {
            tracing::debug!(aborted, discarded, "Synthesis queue cancelled");
        }
        self.cancelled = true;
        aborted
    }

    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn fill_slots(&mut self) {
        let limit = self.config.max_in_flight.max(1);
        while self.in_flight.len() < limit {
            let Some((index, text)) = self.waiting.pop_front() else {
                break;
            };
            let request = self.request(index, text);
            self.in_flight.push(request);
        }
    }

    fn request(&self, index: u64, text: String) -> BoxFuture<'static, Completed> {
        let port = Arc::clone(&self.port);
        let ceiling = self.config.request_timeout();
        let request = SynthesisRequest {
            text: text.clone(),
            voice: self.voice.clone(),
            speed: self.config.speed,
            pitch: self.config.pitch,
        };
        async move {
            tracing::debug!(index, chars = text.chars().count(), "Synthesis request started");
            let result = match tokio::time::timeout(ceiling, port.synthesize(request)).await {
                Ok(result) => result,
                Err(_) => Err(SynthesisError::Timeout(ceiling)),
            };
            Completed {
                index,
                text,
                result,
            }
        }
        .boxed()
    }

    fn settle(&self, completed: Completed) -> SynthesisOutput {
        let Completed {
            index,
            text,
            result,
        } = completed;
        match result {
            Ok(audio) => SynthesisOutput::Ready(AudioUnit {
                index,
                duration: audio
                    .duration
                    .unwrap_or_else(|| estimate_speech_duration(&text)),
                handle: audio.handle,
            }),
            Err(e) => {
                tracing::warn!(index, voice = %self.voice, error = %e, "Failed to synthesise chunk, skipping");
                SynthesisOutput::Skipped {
                    index,
                    reason: SkipReason::Failed(e),
                }
            }
        }
    }
}
