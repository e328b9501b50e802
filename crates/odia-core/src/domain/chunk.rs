use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why the segmenter closed a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryReason {
    SentenceEnd,
    LengthLimit,
    StreamEnd,
}

/// A contiguous speakable unit of assistant text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Monotonic per turn, starting at 0.
    pub index: u64,
    pub text: String,
    pub boundary: BoundaryReason,
}

/// Opaque playable audio reference.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioHandle {
    /// Remote audio the output must fetch.
    Url { url: String },
    /// Encoded audio (mp3, wav, ...).
    Bytes { data: Vec<u8>, mime: String },
    /// Raw mono PCM.
    Pcm { samples: Vec<f32>, sample_rate: u32 },
}

impl std::fmt::Debug for AudioHandle {
    // Sample buffers are large; keep log lines readable.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url { url } => f.debug_struct("Url").field("url", url).finish(),
            Self::Bytes { data, mime } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("mime", mime)
                .finish(),
            Self::Pcm {
                samples,
                sample_rate,
            } => f
                .debug_struct("Pcm")
                .field("samples", &samples.len())
                .field("sample_rate", sample_rate)
                .finish(),
        }
    }
}

/// Synthesized audio for one [`TextChunk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioUnit {
    /// Inherited from the chunk it was synthesized from.
    pub index: u64,
    pub handle: AudioHandle,
    pub duration: Duration,
}

/// Rough spoken duration when the synthesizer does not report one (50ms per char).
pub fn estimate_speech_duration(text: &str) -> Duration {
    let chars = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
    Duration::from_millis(chars.saturating_mul(50))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_speech_duration() {
        assert_eq!(estimate_speech_duration(""), Duration::ZERO);
        assert_eq!(estimate_speech_duration("Hello."), Duration::from_millis(300));
        // Counted in characters, not bytes.
        assert_eq!(
            estimate_speech_duration("\u{e9}t\u{e9}"),
            Duration::from_millis(150)
        );
    }

    #[test]
    fn test_audio_handle_debug_hides_samples() {
        let handle = AudioHandle::Pcm {
            samples: vec![0.0; 48_000],
            sample_rate: 24_000,
        };
        let rendered = format!("{handle:?}");
        assert!(rendered.contains("48000"));
        assert!(rendered.len() < 80);
    }
}
