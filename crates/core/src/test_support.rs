//! In-memory data channel used by unit tests.

use crate::channel::{ChannelEvent, ChannelIo, FrameSink};
use async_trait::async_trait;
use std::{sync::Arc, sync::Mutex, time::Duration};
use tokio::sync::mpsc;

struct RecordingSink {
    frames: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&self, frame: String) -> anyhow::Result<()> {
        self.frames
            .send(frame)
            .map_err(|_| anyhow::anyhow!("frame recorder dropped"))
    }
}

/// Plays the transport side of a data channel: injects events and records
/// every frame written by the channel.
pub(crate) struct MemoryChannel {
    events: mpsc::Sender<ChannelEvent>,
    pending: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
    sink: Arc<RecordingSink>,
    frames: mpsc::UnboundedReceiver<String>,
}

impl MemoryChannel {
    pub(crate) fn new() -> Self {
        let (events, pending) = mpsc::channel(64);
        let (frames_tx, frames) = mpsc::unbounded_channel();
        Self {
            events,
            pending: Mutex::new(Some(pending)),
            sink: Arc::new(RecordingSink { frames: frames_tx }),
            frames,
        }
    }

    /// The transport-facing halves. Can be taken once.
    pub(crate) fn io(&self) -> ChannelIo {
        let events = self
            .pending
            .lock()
            .unwrap()
            .take()
            .expect("channel io already taken");
        ChannelIo {
            sink: self.sink.clone(),
            events,
        }
    }

    pub(crate) async fn open(&self) {
        self.events.send(ChannelEvent::Open).await.unwrap();
    }

    pub(crate) async fn frame(&self, text: &str) {
        self.events
            .send(ChannelEvent::Frame(text.to_string()))
            .await
            .unwrap();
    }

    pub(crate) async fn close(&self) {
        self.events.send(ChannelEvent::Closed).await.unwrap();
    }

    /// Next frame written by the channel; panics after one second of silence.
    pub(crate) async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(1), self.frames.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("frame recorder closed")
    }

    /// Frames written so far, without waiting.
    pub(crate) fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
