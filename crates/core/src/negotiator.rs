//! Session negotiation: one offer/answer round-trip through the relay.
//!
//! [`SessionNegotiator`] drives a [`PeerTransport`] through the steps needed
//! before the remote agent can be reached: local media attached, control
//! channel created, offer applied locally, answer fetched from the [`Relay`]
//! and applied remotely. The result is an explicitly owned [`Session`] that is
//! torn down with [`Session::close`].

use crate::channel::ChannelIo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Label of the control data channel.
pub const CONTROL_CHANNEL_LABEL: &str = "response";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description in SDP text form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Wraps a relay response body as the remote answer.
    ///
    /// The body must be an SDP document, i.e. begin with its `v=` line.
    pub fn answer(sdp: impl Into<String>) -> Result<Self, NegotiationError> {
        let sdp = sdp.into();
        if !sdp.trim_start().starts_with("v=") {
            let preview: String = sdp.chars().take(64).collect();
            return Err(NegotiationError::MalformedAnswer(preview));
        }
        Ok(Self {
            kind: SdpType::Answer,
            sdp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("relay unreachable: {0}")]
    RelayUnreachable(#[source] reqwest::Error),
    #[error("relay answered with status {status}: {body}")]
    RelayStatus { status: u16, body: String },
    #[error("relay returned something that is not a session description: {0:?}")]
    MalformedAnswer(String),
    #[error("peer transport failed to {stage}: {message}")]
    Transport { stage: &'static str, message: String },
}

impl NegotiationError {
    fn transport(stage: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |e| Self::Transport {
            stage,
            message: format!("{:#}", e),
        }
    }
}

/// The relay endpoint that forwards our offer to the remote agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Relay: Send + Sync {
    async fn exchange(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError>;
}

/// A peer connection as seen by the negotiator.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attaches every local media track in send/receive mode.
    async fn attach_local_media(&self) -> anyhow::Result<()>;
    /// Creates the reliable ordered data channel used for control traffic.
    async fn create_control_channel(&self, label: &str) -> anyhow::Result<ChannelIo>;
    async fn create_offer(&self) -> anyhow::Result<SessionDescription>;
    /// Applies `offer` locally and returns the description to send, which may
    /// carry candidates gathered while applying it.
    async fn set_local_description(
        &self,
        offer: &SessionDescription,
    ) -> anyhow::Result<SessionDescription>;
    async fn set_remote_description(&self, answer: &SessionDescription) -> anyhow::Result<()>;
    fn connection_state(&self) -> ConnectionState;
    /// Resolves once the connection reaches a terminal state, returning it.
    async fn terminated(&self) -> ConnectionState;
    async fn close(&self) -> anyhow::Result<()>;
}

pub struct SessionNegotiator {
    transport: Arc<dyn PeerTransport>,
    relay: Arc<dyn Relay>,
    channel_label: String,
}

impl SessionNegotiator {
    pub fn new(transport: Arc<dyn PeerTransport>, relay: Arc<dyn Relay>) -> Self {
        Self {
            transport,
            relay,
            channel_label: CONTROL_CHANNEL_LABEL.to_string(),
        }
    }

    pub fn with_channel_label(mut self, label: impl Into<String>) -> Self {
        self.channel_label = label.into();
        self
    }

    /// Runs the offer/answer exchange.
    ///
    /// Any failure closes the transport and yields no session. There is no
    /// retry here; that is the caller's call.
    #[instrument(name = "negotiate", skip_all, fields(label = %self.channel_label))]
    pub async fn negotiate(self) -> Result<Session, NegotiationError> {
        let transport = self.transport;
        match establish(transport.as_ref(), self.relay.as_ref(), &self.channel_label).await {
            Ok((control, local, remote)) => {
                info!(state = ?transport.connection_state(), "Remote description applied; session established");
                Ok(Session {
                    transport,
                    local,
                    remote,
                    control: Some(control),
                })
            }
            Err(e) => {
                warn!(error = %e, "Negotiation failed");
                if let Err(close_err) = transport.close().await {
                    debug!(error = ?close_err, "Error closing transport after failed negotiation");
                }
                Err(e)
            }
        }
    }
}

async fn establish(
    transport: &dyn PeerTransport,
    relay: &dyn Relay,
    label: &str,
) -> Result<(ChannelIo, SessionDescription, SessionDescription), NegotiationError> {
    transport
        .attach_local_media()
        .await
        .map_err(NegotiationError::transport("attach local media"))?;
    let control = transport
        .create_control_channel(label)
        .await
        .map_err(NegotiationError::transport("create the control channel"))?;
    let offer = transport
        .create_offer()
        .await
        .map_err(NegotiationError::transport("create an offer"))?;
    let local = transport
        .set_local_description(&offer)
        .await
        .map_err(NegotiationError::transport("apply the local description"))?;
    debug!(sdp_bytes = local.sdp.len(), "Local offer ready, contacting relay");

    let remote = relay.exchange(&local).await?;
    if remote.kind != SdpType::Answer {
        return Err(NegotiationError::MalformedAnswer(
            "relay returned an offer instead of an answer".to_string(),
        ));
    }
    transport
        .set_remote_description(&remote)
        .await
        .map_err(NegotiationError::transport("apply the remote description"))?;
    Ok((control, local, remote))
}

/// The negotiated transport. One per run.
pub struct Session {
    transport: Arc<dyn PeerTransport>,
    local: SessionDescription,
    remote: SessionDescription,
    control: Option<ChannelIo>,
}

impl Session {
    pub fn local_description(&self) -> &SessionDescription {
        &self.local
    }

    pub fn remote_description(&self) -> &SessionDescription {
        &self.remote
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    /// Resolves when the transport fails or closes. The control channel may
    /// outlive a failed transport, so callers running a session should watch
    /// this alongside it.
    pub async fn terminated(&self) -> ConnectionState {
        let state = self.transport.terminated().await;
        warn!(?state, "Peer connection ended");
        state
    }

    /// Hands out the control channel. Returns `None` once taken.
    pub fn take_control_channel(&mut self) -> Option<ChannelIo> {
        self.control.take()
    }

    pub async fn close(self) -> anyhow::Result<()> {
        info!("Closing session");
        self.transport.close().await
    }
}
