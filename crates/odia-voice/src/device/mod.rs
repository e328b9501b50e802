//! Local audio devices behind the core ports (feature `device`).
//!
//! `rodio::OutputStream` and `cpal::Stream` are `!Send` on some platforms
//! (macOS CoreAudio in particular). Each adapter confines its handle to a
//! dedicated OS thread and talks to it over channels, so the port objects
//! themselves are `Send + Sync` without any `unsafe` impls.

mod microphone;
mod output;

pub use microphone::DeviceMicrophone;
pub use output::DeviceAudioOutput;
