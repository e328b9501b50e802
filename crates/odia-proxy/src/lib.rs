#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by the integration tests
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tower as _;

pub mod config;
pub mod error;
pub mod forward;
pub mod server;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use server::{AppState, router, serve};
