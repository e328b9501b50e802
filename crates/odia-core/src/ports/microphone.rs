use async_trait::async_trait;
use thiserror::Error;

use crate::domain::MicFrame;

/// Why the microphone could not be opened or kept open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MicrophoneError {
    /// The user or OS refused access.
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// No input device is present.
    #[error("No audio input device found")]
    NoDevice,

    /// The capture stream failed.
    #[error("Microphone stream error: {0}")]
    Stream(String),
}

/// An open capture session. Closing (or dropping) it releases the device.
#[async_trait]
pub trait MicStream: Send {
    /// Next analysis frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<MicFrame>;

    fn close(&mut self);
}

#[async_trait]
pub trait MicrophonePort: Send + Sync {
    async fn open(&self) -> Result<Box<dyn MicStream>, MicrophoneError>;
}
