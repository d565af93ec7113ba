//! WebRTC transport for the realtime agent bridge.
//!
//! [`WebRtcTransport`] implements the core crate's `PeerTransport` on top of
//! the `webrtc` crate: one Opus audio transceiver, one data channel for
//! control frames, and remote tracks routed to an [`InboundMediaSink`].

pub mod media;
pub mod transport;

pub use media::{InboundMediaSink, LoggingSink, OggRecorder};
pub use transport::{WebRtcConfig, WebRtcTransport};
