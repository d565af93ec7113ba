//! The control channel: an ordered, reliable message channel to the remote
//! agent layered on the negotiated transport.
//!
//! A transport hands over a [`ChannelIo`]: a [`FrameSink`] for outbound text
//! frames and a receiver of [`ChannelEvent`]s. [`ControlChannel::open`] turns
//! that into two tasks:
//!
//! - the reader, which reacts to `Open` by queueing the session-configuration
//!   handshake and decodes every inbound frame into the inbound stream;
//! - the writer, the single owner of the sink, which drains the outbound queue
//!   so frames are written whole and in `send` order.

use crate::protocol::{ClientEvent, FrameParseError, ServerEvent, SessionConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Raw notifications from the underlying data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Frame(String),
    Closed,
}

/// The write half of a transport's data channel.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, frame: String) -> anyhow::Result<()>;
}

/// Both halves of a data channel as surfaced by a transport.
pub struct ChannelIo {
    pub sink: Arc<dyn FrameSink>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("control channel is not open")]
pub struct ChannelClosed;

/// Inbound messages, one item per frame. Ends when the channel closes.
pub type InboundEvents = ReceiverStream<Result<ServerEvent, FrameParseError>>;

/// Cloneable handle onto the outbound queue.
#[derive(Clone)]
pub struct ControlSender {
    queue: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Receiver<ChannelState>,
}

impl ControlSender {
    /// Queues `event` for transmission as one frame.
    pub fn send(&self, event: ClientEvent) -> Result<(), ChannelClosed> {
        if *self.state.borrow() != ChannelState::Open {
            return Err(ChannelClosed);
        }
        self.queue.send(event).map_err(|_| ChannelClosed)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Waits until the channel has opened. Fails if it closes first.
    pub async fn opened(&self) -> Result<(), ChannelClosed> {
        let mut state = self.state.clone();
        let reached = *state
            .wait_for(|s| *s != ChannelState::Connecting)
            .await
            .map_err(|_| ChannelClosed)?;
        match reached {
            ChannelState::Open => Ok(()),
            _ => Err(ChannelClosed),
        }
    }
}

pub struct ControlChannel {
    sender: ControlSender,
    inbound: InboundEvents,
}

impl ControlChannel {
    /// Starts the reader and writer tasks for `io`.
    ///
    /// `handshake` becomes the first frame written once the transport reports
    /// the channel open.
    pub fn open(io: ChannelIo, handshake: SessionConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        tokio::spawn(write_frames(io.sink, queue_rx));
        tokio::spawn(read_frames(
            io.events,
            ClientEvent::SessionUpdate { session: handshake },
            queue_tx.clone(),
            state_tx,
            inbound_tx,
        ));

        Self {
            sender: ControlSender {
                queue: queue_tx,
                state: state_rx,
            },
            inbound: ReceiverStream::new(inbound_rx),
        }
    }

    pub fn sender(&self) -> ControlSender {
        self.sender.clone()
    }

    pub fn split(self) -> (ControlSender, InboundEvents) {
        (self.sender, self.inbound)
    }
}

async fn read_frames(
    mut events: mpsc::Receiver<ChannelEvent>,
    handshake: ClientEvent,
    queue: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Sender<ChannelState>,
    inbound: mpsc::Sender<Result<ServerEvent, FrameParseError>>,
) {
    let mut handshake = Some(handshake);
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Open => {
                let Some(handshake) = handshake.take() else {
                    debug!("Ignoring repeated open notification");
                    continue;
                };
                info!("Control channel open, sending session configuration");
                // Queued before the state flips, so nothing else can get ahead of it.
                if queue.send(handshake).is_err() {
                    error!("Control channel writer stopped before the handshake");
                    break;
                }
                state.send_replace(ChannelState::Open);
            }
            ChannelEvent::Frame(text) => {
                let parsed = ServerEvent::from_frame(&text);
                if inbound.send(parsed).await.is_err() {
                    debug!("Inbound consumer dropped; discarding frame");
                }
            }
            ChannelEvent::Closed => break,
        }
    }
    state.send_replace(ChannelState::Closed);
    info!("Control channel closed");
}

async fn write_frames(sink: Arc<dyn FrameSink>, mut queue: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = queue.recv().await {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(kind = event.kind(), error = %e, "Failed to serialize control frame");
                continue;
            }
        };
        if let Err(e) = sink.send_text(frame).await {
            warn!(kind = event.kind(), error = ?e, "Failed to write control frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryChannel;
    use futures::StreamExt;
    use serde_json::Value;

    fn config() -> SessionConfig {
        SessionConfig {
            modalities: vec!["text".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn handshake_is_first_frame_after_open() {
        let mut memory = MemoryChannel::new();
        let channel = ControlChannel::open(memory.io(), config());
        let sender = channel.sender();

        assert_eq!(sender.send(ClientEvent::function_call_output("early", "{}")), Err(ChannelClosed));

        memory.open().await;
        sender.opened().await.unwrap();
        sender
            .send(ClientEvent::function_call_output("c1", "{}"))
            .unwrap();

        let first: Value = serde_json::from_str(&memory.next_frame().await).unwrap();
        assert_eq!(first["type"], "session.update");
        assert_eq!(first["session"]["modalities"][0], "text");
        let second: Value = serde_json::from_str(&memory.next_frame().await).unwrap();
        assert_eq!(second["item"]["call_id"], "c1");
    }

    #[tokio::test]
    async fn repeated_open_sends_one_handshake() {
        let mut memory = MemoryChannel::new();
        let channel = ControlChannel::open(memory.io(), config());
        memory.open().await;
        memory.open().await;
        channel.sender().opened().await.unwrap();
        channel
            .sender()
            .send(ClientEvent::function_call_output("c1", "{}"))
            .unwrap();

        let first: Value = serde_json::from_str(&memory.next_frame().await).unwrap();
        let second: Value = serde_json::from_str(&memory.next_frame().await).unwrap();
        assert_eq!(first["type"], "session.update");
        assert_eq!(second["type"], "conversation.item.create");
    }

    #[tokio::test]
    async fn malformed_frame_does_not_end_stream() {
        let mut memory = MemoryChannel::new();
        let (_sender, mut inbound) = ControlChannel::open(memory.io(), config()).split();
        memory.open().await;
        memory.frame("{oops").await;
        memory
            .frame(r#"{"type":"session.created","session":{}}"#)
            .await;

        assert!(inbound.next().await.unwrap().is_err());
        let next = inbound.next().await.unwrap().unwrap();
        assert_eq!(next.kind(), "session.created");
    }

    #[tokio::test]
    async fn close_ends_stream_and_rejects_sends() {
        let mut memory = MemoryChannel::new();
        let (sender, mut inbound) = ControlChannel::open(memory.io(), config()).split();
        memory.open().await;
        sender.opened().await.unwrap();
        memory.close().await;

        assert!(inbound.next().await.is_none());
        assert_eq!(sender.state(), ChannelState::Closed);
        assert_eq!(
            sender.send(ClientEvent::function_call_output("late", "{}")),
            Err(ChannelClosed)
        );
    }

    #[tokio::test]
    async fn opened_fails_when_closed_before_open() {
        let memory = MemoryChannel::new();
        let channel = ControlChannel::open(memory.io(), config());
        memory.close().await;
        assert_eq!(channel.sender().opened().await, Err(ChannelClosed));
    }
}
