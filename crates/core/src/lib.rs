//! rtc-agent core
//!
//! Transport-agnostic heart of the bridge between this device and a remote
//! realtime agent:
//!
//! - `negotiator`: offer/answer exchange through the relay and ownership of the
//!   resulting [`negotiator::Session`].
//! - `channel`: the ordered control channel and its configuration handshake.
//! - `registry`: the static catalogue of local tools.
//! - `dispatcher`: matching remote function calls to local handlers.
//! - `bridge`: the session runner tying the pieces together.

pub mod bridge;
pub mod channel;
pub mod dispatcher;
pub mod negotiator;
pub mod protocol;
pub mod registry;
pub mod relay_client;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{Bridge, BridgeStats, SessionOptions};
pub use channel::{ChannelClosed, ChannelEvent, ChannelIo, ControlChannel, ControlSender, FrameSink};
pub use dispatcher::{Dispatch, ToolDispatcher};
pub use negotiator::{
    ConnectionState, NegotiationError, PeerTransport, Relay, SdpType, Session,
    SessionDescription, SessionNegotiator,
};
pub use protocol::{ClientEvent, FrameParseError, ServerEvent};
pub use registry::{RegistryError, ToolDefinition, ToolHandler, ToolRegistry};
pub use relay_client::HttpRelay;
