//! Strict FIFO playback over the single audio output.
//!
//! The queue owns the output port for the whole turn; nothing else writes to
//! it. One unit plays at a time and the next starts only after the current
//! one reports completion. [`PlaybackQueue::stop`] halts the current sound and
//! throws away the rest without emitting completion events for them.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use odia_core::{AudioOutputPort, AudioUnit, PlaybackError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { index: u64 },
    Finished { index: u64 },
    /// The unit could not be played; the queue moves on.
    Failed { index: u64, error: PlaybackError },
    /// Closed and every unit has been played. Emitted once.
    Drained,
}

struct Current {
    index: u64,
    play: BoxFuture<'static, Result<(), PlaybackError>>,
}

pub struct PlaybackQueue {
    output: Arc<dyn AudioOutputPort>,
    pending: VecDeque<AudioUnit>,
    current: Option<Current>,
    last_index: Option<u64>,
    closed: bool,
    drained_reported: bool,
    stopped: bool,
}

impl PlaybackQueue {
    pub fn new(output: Arc<dyn AudioOutputPort>) -> Self {
        Self {
            output,
            pending: VecDeque::new(),
            current: None,
            last_index: None,
            closed: false,
            drained_reported: false,
            stopped: false,
        }
    }

    /// Queue a unit behind everything already queued.
    ///
    /// Refused (returns `false`) after `stop`/`close`, or if `unit.index` is
    /// not greater than the last accepted index.
    pub fn enqueue(&mut self, unit: AudioUnit) -> bool {
        if self.stopped || self.closed {
            return false;
        }
        if self.last_index.is_some_and(|last| unit.index <= last) {
            tracing::warn!(
                index = unit.index,
                last = ?self.last_index,
                "Audio unit out of order, dropping"
            );
            return false;
        }
        self.last_index = Some(unit.index);
        self.pending.push_back(unit);
        true
    }

    /// No more units will be enqueued.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub const fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Index of the unit currently sounding.
    pub fn current_index(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.index)
    }

    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Nothing playing and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Whether [`next_event`](Self::next_event) would make progress.
    pub fn has_work(&self) -> bool {
        !self.stopped && (!self.is_idle() || (self.closed && !self.drained_reported))
    }

    /// Drive playback: start the head unit or wait for the current one.
    ///
    /// Returns `None` when there is nothing to do. Cancel-safe: the current
    /// playback future is kept across calls.
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        if self.stopped {
            return None;
        }

        let Some(current) = self.current.as_mut() else {
            if let Some(unit) = self.pending.pop_front() {
                return Some(self.start(unit));
            }
            if self.closed && !self.drained_reported {
                self.drained_reported = true;
                tracing::debug!("Playback queue drained");
                return Some(PlaybackEvent::Drained);
            }
            return None;
        };

        let result = (&mut current.play).await;
        let index = current.index;
        self.current = None;
        match result {
            Ok(()) => Some(PlaybackEvent::Finished { index }),
            Err(error) => {
                tracing::warn!(index, error = %error, "Playback failed, skipping unit");
                Some(PlaybackEvent::Failed { index, error })
            }
        }
    }

    /// Halt the current sound and discard everything queued.
    ///
    /// Returns how many units were dropped (including the one playing).
    pub fn stop(&mut self) -> usize {
        let was_playing = self.current.take().is_some();
        if was_playing {
            self.output.stop();
        }
        let dropped = self.pending.len() + usize::from(was_playing);
        self.pending.clear();
        if !self.stopped {
            tracing::debug!(dropped, "Playback stopped");
        }
        self.stopped = true;
        dropped
    }

    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn start(&mut self, unit: AudioUnit) -> PlaybackEvent {
        let index = unit.index;
        let output = Arc::clone(&self.output);
        let play = async move { output.play(&unit).await }.boxed();
        self.current = Some(Current { index, play });
        tracing::debug!(index, "Playback started");
        PlaybackEvent::Started { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use odia_core::AudioHandle;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingOutput {
        played: Mutex<Vec<u64>>,
        stops: AtomicUsize,
        fail_index: Option<u64>,
    }

    #[async_trait]
    impl AudioOutputPort for RecordingOutput {
        async fn play(&self, unit: &AudioUnit) -> Result<(), PlaybackError> {
            tokio::time::sleep(unit.duration).await;
            if self.fail_index == Some(unit.index) {
                return Err(PlaybackError::Decode("corrupt".into()));
            }
            self.played.lock().unwrap().push(unit.index);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn unit(index: u64, millis: u64) -> AudioUnit {
        AudioUnit {
            index,
            handle: AudioHandle::Url {
                url: format!("https://cdn.test/{index}.mp3"),
            },
            duration: Duration::from_millis(millis),
        }
    }

    async fn run_to_idle(queue: &mut PlaybackQueue) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Some(event) = queue.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_in_fifo_order() {
        let output = Arc::new(RecordingOutput::default());
        let mut queue = PlaybackQueue::new(output.clone());
        // Longer first unit must still finish before the second starts.
        queue.enqueue(unit(0, 500));
        queue.enqueue(unit(1, 10));
        queue.enqueue(unit(2, 10));
        queue.close();

        let events = run_to_idle(&mut queue).await;
        assert_eq!(
            events,
            vec![
                PlaybackEvent::Started { index: 0 },
                PlaybackEvent::Finished { index: 0 },
                PlaybackEvent::Started { index: 1 },
                PlaybackEvent::Finished { index: 1 },
                PlaybackEvent::Started { index: 2 },
                PlaybackEvent::Finished { index: 2 },
                PlaybackEvent::Drained,
            ]
        );
        assert_eq!(*output.played.lock().unwrap(), vec![0, 1, 2]);
        assert!(!queue.has_work());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_unit_does_not_block_queue() {
        let output = Arc::new(RecordingOutput {
            fail_index: Some(0),
            ..RecordingOutput::default()
        });
        let mut queue = PlaybackQueue::new(output.clone());
        queue.enqueue(unit(0, 10));
        queue.enqueue(unit(1, 10));

        let events = run_to_idle(&mut queue).await;
        assert!(matches!(events[1], PlaybackEvent::Failed { index: 0, .. }));
        assert_eq!(*output.played.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_rejects_non_increasing_index() {
        let mut queue = PlaybackQueue::new(Arc::new(RecordingOutput::default()));
        assert!(queue.enqueue(unit(0, 10)));
        assert!(queue.enqueue(unit(2, 10)));
        assert!(!queue.enqueue(unit(1, 10)));
        assert!(!queue.enqueue(unit(2, 10)));
        assert_eq!(queue.queued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_current_and_clears_pending() {
        let output = Arc::new(RecordingOutput::default());
        let mut queue = PlaybackQueue::new(output.clone());
        queue.enqueue(unit(0, 10_000));
        queue.enqueue(unit(1, 10));
        queue.close();

        assert_eq!(
            queue.next_event().await,
            Some(PlaybackEvent::Started { index: 0 })
        );
        // Playback is mid-unit when the interruption lands.
        let waited = tokio::time::timeout(Duration::from_millis(100), queue.next_event()).await;
        assert!(waited.is_err());
        assert_eq!(queue.current_index(), Some(0));

        assert_eq!(queue.stop(), 2);
        assert_eq!(output.stops.load(Ordering::SeqCst), 1);
        assert!(queue.is_idle());
        // No completion or drained signal for discarded units.
        assert_eq!(queue.next_event().await, None);
        assert!(output.played.lock().unwrap().is_empty());
        assert!(!queue.enqueue(unit(2, 10)));
    }

    #[tokio::test]
    async fn test_stop_when_idle_does_not_touch_output() {
        let output = Arc::new(RecordingOutput::default());
        let mut queue = PlaybackQueue::new(output.clone());
        assert_eq!(queue.stop(), 0);
        assert_eq!(output.stops.load(Ordering::SeqCst), 0);
    }
}
