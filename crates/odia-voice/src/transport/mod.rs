//! HTTP transports against the ODIA proxy.
//!
//! [`HttpChatStream`], [`HttpSynthesizer`] and [`HttpTranscriber`] implement
//! the core ports over the routes in [`odia_core::contracts::http`]. They
//! share one [`ProxyEndpoint`] (base URL, optional widget key, pooled client).

mod chat;
mod endpoint;
pub mod sse;
mod stt;
mod tts;

pub use chat::HttpChatStream;
pub use endpoint::ProxyEndpoint;
pub use stt::HttpTranscriber;
pub use tts::HttpSynthesizer;
