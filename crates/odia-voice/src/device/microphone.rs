//! Microphone capture via `cpal`.

use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, Stream};
use odia_core::{MicFrame, MicStream, MicrophoneError, MicrophonePort};
use tokio::sync::{mpsc, oneshot};

/// Frames buffered between the capture callback and the controller.
const FRAME_BACKLOG: usize = 64;

/// The default input device. Each [`open`](MicrophonePort::open) starts a
/// capture thread that lives until the returned stream is closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceMicrophone;

impl DeviceMicrophone {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MicrophonePort for DeviceMicrophone {
    async fn open(&self) -> Result<Box<dyn MicStream>, MicrophoneError> {
        let (frame_tx, frames) = mpsc::channel(FRAME_BACKLOG);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (init_tx, init_rx) = oneshot::channel();

        thread::Builder::new()
            .name("odia-mic".into())
            .spawn(move || capture(frame_tx, &stop_rx, init_tx))
            .map_err(|e| MicrophoneError::Stream(format!("failed to spawn capture thread: {e}")))?;

        init_rx
            .await
            .map_err(|_| MicrophoneError::Stream("capture thread exited".to_string()))??;

        Ok(Box::new(DeviceMicStream {
            frames,
            stop: Some(stop_tx),
        }))
    }
}

struct DeviceMicStream {
    frames: mpsc::Receiver<MicFrame>,
    stop: Option<std_mpsc::Sender<()>>,
}

#[async_trait]
impl MicStream for DeviceMicStream {
    async fn next_frame(&mut self) -> Option<MicFrame> {
        if self.stop.is_none() {
            return None;
        }
        self.frames.recv().await
    }

    fn close(&mut self) {
        // Dropping the sender wakes the capture thread, which drops the stream.
        if self.stop.take().is_some() {
            self.frames.close();
        }
    }
}

impl Drop for DeviceMicStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Body of the capture thread. The `cpal::Stream` never leaves it.
fn capture(
    frame_tx: mpsc::Sender<MicFrame>,
    stop_rx: &std_mpsc::Receiver<()>,
    init_tx: oneshot::Sender<Result<(), MicrophoneError>>,
) {
    let stream = match build_stream(frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };
    if init_tx.send(Ok(())).is_err() {
        return;
    }

    // Blocks until the stream handle is closed or dropped.
    let _ = stop_rx.recv();
    drop(stream);
    tracing::debug!("Microphone capture stopped");
}

fn build_stream(frame_tx: mpsc::Sender<MicFrame>) -> Result<Stream, MicrophoneError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(MicrophoneError::NoDevice)?;
    let config = device
        .default_input_config()
        .map_err(|e| MicrophoneError::Stream(e.to_string()))?;

    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels().max(1));
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "Microphone capture initialized"
    );

    let err_fn = |err: cpal::StreamError| {
        tracing::error!(%err, "Audio input stream error");
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&frame_tx, data, channels, sample_rate, |s| s);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward(&frame_tx, data, channels, sample_rate, |s| f32::from(s) / 32_768.0);
            },
            err_fn,
            None,
        ),
        SampleFormat::I32 => device.build_input_stream(
            &stream_config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                #[allow(clippy::cast_precision_loss)]
                forward(&frame_tx, data, channels, sample_rate, |s| {
                    s as f32 / 2_147_483_648.0
                });
            },
            err_fn,
            None,
        ),
        other => {
            return Err(MicrophoneError::Stream(format!(
                "Unsupported sample format: {other:?}"
            )));
        }
    }
    .map_err(|e| match e {
        BuildStreamError::DeviceNotAvailable => MicrophoneError::NoDevice,
        other => MicrophoneError::Stream(other.to_string()),
    })?;

    stream
        .play()
        .map_err(|e| MicrophoneError::Stream(e.to_string()))?;
    Ok(stream)
}

/// Downmix one callback buffer to mono and hand it to the controller.
/// Frames are dropped when the controller falls behind.
fn forward<T: Copy>(
    frame_tx: &mpsc::Sender<MicFrame>,
    data: &[T],
    channels: usize,
    sample_rate: u32,
    convert: impl Fn(T) -> f32,
) {
    let samples = downmix(data, channels, convert);
    if samples.is_empty() {
        return;
    }
    if frame_tx.try_send(MicFrame::new(samples, sample_rate)).is_err() {
        tracing::trace!("Microphone frame dropped");
    }
}

#[allow(clippy::cast_precision_loss)]
fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<f32> {
    data.chunks_exact(channels)
        .map(|frame| frame.iter().map(|&s| convert(s)).sum::<f32>() / channels as f32)
        .collect()
}
