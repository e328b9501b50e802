//! Transport contracts shared by the proxy and the HTTP transports.
//!
//! Route strings and JSON wire shapes only. Keep these free of framework
//! types so neither side drags in the other's dependencies.

pub mod http;
