//! Speaker output via `rodio`.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use async_trait::async_trait;
use odia_core::{AudioHandle, AudioOutputPort, AudioUnit, PlaybackError};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;

/// Audio ready to hand to the sink.
enum Source {
    Encoded(Vec<u8>),
    Pcm { samples: Vec<f32>, sample_rate: u32 },
}

enum OutputCommand {
    Play {
        source: Source,
        done: oneshot::Sender<Result<(), PlaybackError>>,
    },
    Stop,
    Shutdown,
}

/// The default output device, driven from a dedicated thread.
///
/// One unit sounds at a time; `play` on a new unit replaces whatever is
/// still playing. URL handles are fetched with `reqwest` before they are
/// sent to the audio thread.
pub struct DeviceAudioOutput {
    cmd_tx: mpsc::Sender<OutputCommand>,
    client: reqwest::Client,
    thread: Option<thread::JoinHandle<()>>,
}

impl DeviceAudioOutput {
    /// Open the default output device.
    pub fn new() -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<OutputCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), PlaybackError>>();

        let thread = thread::Builder::new()
            .name("odia-audio-out".into())
            .spawn(move || run(&cmd_rx, &init_tx))
            .map_err(|e| PlaybackError::Unavailable(format!("failed to spawn audio thread: {e}")))?;

        init_rx.recv().map_err(|_| PlaybackError::Closed)??;

        Ok(Self {
            cmd_tx,
            client: reqwest::Client::new(),
            thread: Some(thread),
        })
    }

    async fn resolve(&self, handle: &AudioHandle) -> Result<Source, PlaybackError> {
        match handle {
            AudioHandle::Url { url } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(PlaybackError::Decode(format!(
                        "unsupported audio URL scheme: {url}"
                    )));
                }
                let bytes = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| PlaybackError::Decode(e.to_string()))?
                    .bytes()
                    .await
                    .map_err(|e| PlaybackError::Decode(e.to_string()))?;
                Ok(Source::Encoded(bytes.to_vec()))
            }
            AudioHandle::Bytes { data, .. } => Ok(Source::Encoded(data.clone())),
            AudioHandle::Pcm {
                samples,
                sample_rate,
            } => Ok(Source::Pcm {
                samples: samples.clone(),
                sample_rate: *sample_rate,
            }),
        }
    }
}

#[async_trait]
impl AudioOutputPort for DeviceAudioOutput {
    async fn play(&self, unit: &AudioUnit) -> Result<(), PlaybackError> {
        let source = self.resolve(&unit.handle).await?;
        let (done, rx) = oneshot::channel();
        self.cmd_tx
            .send(OutputCommand::Play { source, done })
            .map_err(|_| PlaybackError::Closed)?;
        rx.await.map_err(|_| PlaybackError::Closed)?
    }

    fn stop(&self) {
        let _ = self.cmd_tx.send(OutputCommand::Stop);
    }
}

impl Drop for DeviceAudioOutput {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// A sink plus the flag its watcher checks before reporting completion.
struct Playing {
    sink: Arc<Sink>,
    stopped: Arc<AtomicBool>,
}

impl Playing {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.sink.stop();
    }
}

/// Body of the audio thread. Owns the output stream for its whole life.
fn run(cmd_rx: &mpsc::Receiver<OutputCommand>, init_tx: &mpsc::Sender<Result<(), PlaybackError>>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(PlaybackError::Unavailable(e.to_string())));
            return;
        }
    };
    if init_tx.send(Ok(())).is_err() {
        return;
    }
    tracing::info!("Audio output initialized on default device");

    let mut current: Option<Playing> = None;
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            OutputCommand::Play { source, done } => {
                if let Some(playing) = current.take() {
                    playing.stop();
                }
                match start(&handle, source) {
                    Ok(sink) => current = Some(watch(sink, done)),
                    Err(e) => {
                        let _ = done.send(Err(e));
                    }
                }
            }
            OutputCommand::Stop => {
                if let Some(playing) = current.take() {
                    playing.stop();
                    tracing::debug!("Audio output stopped");
                }
            }
            OutputCommand::Shutdown => break,
        }
    }

    if let Some(playing) = current.take() {
        playing.stop();
    }
    tracing::debug!("Audio output thread shutting down");
}

fn start(handle: &OutputStreamHandle, source: Source) -> Result<Arc<Sink>, PlaybackError> {
    let sink = Sink::try_new(handle).map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
    match source {
        Source::Encoded(data) => {
            let decoder =
                Decoder::new(Cursor::new(data)).map_err(|e| PlaybackError::Decode(e.to_string()))?;
            sink.append(decoder);
        }
        Source::Pcm {
            samples,
            sample_rate,
        } => {
            sink.append(rodio::buffer::SamplesBuffer::new(1, sample_rate, samples));
        }
    }
    Ok(Arc::new(sink))
}

/// Resolve `done` once the sink drains. A stopped sink never reports
/// completion; its receiver sees the sender dropped.
fn watch(sink: Arc<Sink>, done: oneshot::Sender<Result<(), PlaybackError>>) -> Playing {
    let stopped = Arc::new(AtomicBool::new(false));
    let watcher_sink = Arc::clone(&sink);
    let watcher_stopped = Arc::clone(&stopped);
    thread::spawn(move || {
        watcher_sink.sleep_until_end();
        if !watcher_stopped.load(Ordering::SeqCst) {
            let _ = done.send(Ok(()));
        }
    });
    Playing { sink, stopped }
}
