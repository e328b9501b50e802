use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rolling estimate of whether the user is talking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceActivityState {
    Speaking,
    #[default]
    Silent,
}

/// One block of mono microphone samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MicFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MicFrame {
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Wall-clock span covered by this frame.
    pub fn duration(&self) -> Duration {
        span(self.samples.len(), self.sample_rate)
    }

    /// Root-mean-square energy, clamped to `0.0..=1.0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn rms_energy(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt().min(1.0)
    }
}

/// Everything the user said between taking the floor and falling silent,
/// mono samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Utterance {
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        span(self.samples.len(), self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encode as a 16-bit PCM mono WAV file, the format transcription APIs accept.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_wav(&self) -> Vec<u8> {
        const HEADER_LEN: usize = 44;
        let data_len = u32::try_from(self.samples.len() * 2).unwrap_or(u32::MAX - 36);

        let mut wav = Vec::with_capacity(HEADER_LEN + self.samples.len() * 2);
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&self.sample_rate.to_le_bytes());
        wav.extend_from_slice(&self.sample_rate.saturating_mul(2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        for sample in &self.samples {
            let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            wav.extend_from_slice(&pcm.to_le_bytes());
        }
        wav
    }
}

fn span(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let samples = u64::try_from(samples).unwrap_or(u64::MAX);
    Duration::from_nanos(samples.saturating_mul(1_000_000_000) / u64::from(sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = MicFrame::new(vec![0.0; 1600], 16_000);
        assert_eq!(frame.duration(), Duration::from_millis(100));
        assert_eq!(MicFrame::new(vec![0.0; 10], 0).duration(), Duration::ZERO);
    }

    #[test]
    fn test_rms_energy() {
        assert!(MicFrame::new(vec![], 16_000).rms_energy().abs() < f32::EPSILON);
        assert!(MicFrame::new(vec![0.0; 160], 16_000).rms_energy().abs() < f32::EPSILON);

        let loud = MicFrame::new(vec![0.5; 160], 16_000);
        assert!((loud.rms_energy() - 0.5).abs() < 1e-6);

        let alternating: Vec<f32> = (0..160).map(|i| if i % 2 == 0 { 0.2 } else { -0.2 }).collect();
        assert!((MicFrame::new(alternating, 16_000).rms_energy() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_utterance_wav_layout() {
        let utterance = Utterance::new(vec![0.0, 1.0, -1.0, 2.0], 16_000);
        assert_eq!(utterance.duration(), Duration::from_micros(250));

        let wav = utterance.to_wav();
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 8);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16_000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);

        let pcm: Vec<i16> = wav[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        // Out-of-range samples are clamped.
        assert_eq!(pcm, vec![0, i16::MAX, -i16::MAX, i16::MAX]);
    }
}
