use async_trait::async_trait;
use thiserror::Error;

use crate::domain::AudioUnit;

/// Failures while playing one unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// No output device could be opened.
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    /// The handle could not be fetched or decoded.
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// The output backend went away mid-playback.
    #[error("Audio output closed")]
    Closed,
}

/// The single sink audio is written to.
///
/// Owned exclusively by the playback queue.
#[async_trait]
pub trait AudioOutputPort: Send + Sync {
    /// Play `unit` and resolve once it has finished.
    async fn play(&self, unit: &AudioUnit) -> Result<(), PlaybackError>;

    /// Halt whatever is currently sounding. Must not block.
    fn stop(&self);
}
