//! rtc-agent Relay Library Crate
//!
//! The relay accepts a WebRTC offer from a local agent, forwards it to the
//! upstream realtime service with the server-side API key and hands back the
//! answer. The `bin/relay.rs` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
