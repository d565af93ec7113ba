//! [`PeerTransport`] over a `webrtc` peer connection.

use crate::media::InboundMediaSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rtc_agent_core::{
    ChannelEvent, ChannelIo, ConnectionState, FrameSink, PeerTransport, SdpType,
    SessionDescription,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use webrtc::{
    api::{
        APIBuilder,
        interceptor_registry::register_default_interceptors,
        media_engine::{MIME_TYPE_OPUS, MediaEngine},
    },
    data_channel::{RTCDataChannel, data_channel_message::DataChannelMessage},
    ice_transport::ice_server::RTCIceServer,
    interceptor::registry::Registry,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::{
        RTCRtpTransceiver, RTCRtpTransceiverInit, rtp_codec::RTCRtpCodecCapability,
        rtp_receiver::RTCRtpReceiver, rtp_transceiver_direction::RTCRtpTransceiverDirection,
    },
    track::{
        track_local::{TrackLocal, track_local_static_sample::TrackLocalStaticSample},
        track_remote::TrackRemote,
    },
};

#[derive(Debug, Clone, Default)]
pub struct WebRtcConfig {
    /// STUN/TURN URLs. Empty means host candidates only.
    pub ice_servers: Vec<String>,
}

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    audio: Arc<TrackLocalStaticSample>,
    state: watch::Receiver<ConnectionState>,
}

impl WebRtcTransport {
    /// Creates the peer connection. Remote tracks are handed to `sink` as they
    /// arrive.
    pub async fn new(config: &WebRtcConfig, sink: Arc<dyn InboundMediaSink>) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .context("Failed to create peer connection")?,
        );

        let (state_tx, state_rx) = watch::channel(ConnectionState::New);
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            info!(state = %s, "Peer connection state changed");
            state_tx.send_replace(map_state(s));
            Box::pin(async {})
        }));

        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                info!(kind = %track.kind(), ssrc = track.ssrc(), "Remote track arrived");
                sink.attach(track);
                Box::pin(async {})
            },
        ));

        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            "rtc-agent".to_owned(),
        ));

        Ok(Self {
            pc,
            audio,
            state: state_rx,
        })
    }

    /// The outgoing audio track. A capture source writes Opus samples here.
    pub fn local_audio(&self) -> Arc<TrackLocalStaticSample> {
        self.audio.clone()
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn attach_local_media(&self) -> Result<()> {
        let track: Arc<dyn TrackLocal + Send + Sync> = self.audio.clone();
        self.pc
            .add_transceiver_from_track(
                track,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendrecv,
                    send_encodings: vec![],
                }),
            )
            .await
            .context("Failed to add audio transceiver")?;
        Ok(())
    }

    async fn create_control_channel(&self, label: &str) -> Result<ChannelIo> {
        let channel = self
            .pc
            .create_data_channel(label, None)
            .await
            .context("Failed to create data channel")?;
        let events = bind_channel_events(&channel);
        Ok(ChannelIo {
            sink: Arc::new(DataChannelSink(channel)),
            events,
        })
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription> {
        let description = RTCSessionDescription::offer(offer.sdp.clone())?;
        // The relay exchange is a single round-trip, so every candidate has to
        // be in the offer we hand it.
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(description).await?;
        let _ = gathered.recv().await;
        debug!("ICE gathering complete");

        let local = self
            .pc
            .local_description()
            .await
            .context("Local description missing after it was set")?;
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn set_remote_description(&self, answer: &SessionDescription) -> Result<()> {
        let description = match answer.kind {
            SdpType::Answer => RTCSessionDescription::answer(answer.sdp.clone())?,
            SdpType::Offer => RTCSessionDescription::offer(answer.sdp.clone())?,
        };
        self.pc.set_remote_description(description).await?;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn terminated(&self) -> ConnectionState {
        let mut state = self.state.clone();
        // The sender lives in the peer connection's callback; losing it means
        // the connection is gone.
        let reached = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        reached.unwrap_or(ConnectionState::Closed)
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

fn map_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        // A disconnected peer may recover on its own; only Failed is final.
        RTCPeerConnectionState::Disconnected => ConnectionState::Connecting,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
    }
}

/// Turns the data channel's callbacks into an ordered event stream.
fn bind_channel_events(channel: &Arc<RTCDataChannel>) -> mpsc::Receiver<ChannelEvent> {
    let (tx, rx) = mpsc::channel(256);

    let open_tx = tx.clone();
    let label = channel.label().to_owned();
    channel.on_open(Box::new(move || {
        info!(label = %label, "Data channel open");
        Box::pin(async move {
            let _ = open_tx.send(ChannelEvent::Open).await;
        })
    }));

    let message_tx = tx.clone();
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let tx = message_tx.clone();
        Box::pin(async move {
            if !message.is_string {
                warn!(bytes = message.data.len(), "Ignoring binary data channel message");
                return;
            }
            let text = String::from_utf8_lossy(&message.data).into_owned();
            let _ = tx.send(ChannelEvent::Frame(text)).await;
        })
    }));

    channel.on_close(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(ChannelEvent::Closed).await;
        })
    }));

    rx
}

struct DataChannelSink(Arc<RTCDataChannel>);

#[async_trait]
impl FrameSink for DataChannelSink {
    async fn send_text(&self, frame: String) -> Result<()> {
        self.0
            .send_text(frame)
            .await
            .context("Data channel send failed")?;
        Ok(())
    }
}
