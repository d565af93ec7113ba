//! Session runner.
//!
//! Opens the control channel with the configuration handshake built from the
//! registry, then feeds every inbound event to the dispatcher until the
//! channel closes.

use crate::{
    channel::{ChannelIo, ControlChannel},
    dispatcher::{Dispatch, ToolDispatcher},
    protocol::{ServerEvent, SessionConfig},
    registry::ToolRegistry,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, trace, warn};

/// Session parameters other than the tool catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub modalities: Vec<String>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: None,
            voice: None,
        }
    }
}

/// Counters for one run of the control channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub frames: u64,
    pub malformed: u64,
    pub dispatched: u64,
    pub unresolved: u64,
    pub abandoned: u64,
}

pub struct Bridge {
    registry: Arc<ToolRegistry>,
    options: SessionOptions,
    events: broadcast::Sender<ServerEvent>,
}

impl Bridge {
    pub fn new(registry: Arc<ToolRegistry>, options: SessionOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            registry,
            options,
            events,
        }
    }

    /// The handshake payload: session options plus every registered tool.
    pub fn handshake(&self) -> SessionConfig {
        SessionConfig {
            modalities: self.options.modalities.clone(),
            instructions: self.options.instructions.clone(),
            voice: self.options.voice.clone(),
            tools: self.registry.all_definitions(),
        }
    }

    /// Every decoded inbound event, for observers outside the core.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Runs until the control channel closes, then waits for in-flight tool
    /// calls to finish.
    #[instrument(name = "control_channel", skip_all, fields(tools = self.registry.len()))]
    pub async fn run(&self, io: ChannelIo) -> BridgeStats {
        let (sender, mut inbound) = ControlChannel::open(io, self.handshake()).split();
        let mut dispatcher = ToolDispatcher::new(self.registry.clone(), sender);
        let mut stats = BridgeStats::default();

        while let Some(item) = inbound.next().await {
            stats.frames += 1;
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    stats.malformed += 1;
                    warn!(error = %e, "Dropping malformed control frame");
                    continue;
                }
            };

            observe(&event);
            match dispatcher.handle(&event) {
                Dispatch::Executing => stats.dispatched += 1,
                Dispatch::Unresolved => stats.unresolved += 1,
                Dispatch::Abandoned => stats.abandoned += 1,
                Dispatch::Ignored => {}
            }
            // No subscribers is fine.
            let _ = self.events.send(event);
        }

        if dispatcher.in_flight() > 0 {
            info!(in_flight = dispatcher.in_flight(), "Waiting for tool calls to finish");
        }
        dispatcher.drain().await;
        info!(?stats, "Control channel finished");
        stats
    }
}

fn observe(event: &ServerEvent) {
    match event {
        ServerEvent::OutputItemDone(done) => {
            if let Some(transcript) = done.transcript() {
                info!(transcript = %transcript, "Agent message");
            }
        }
        ServerEvent::Error(e) => {
            warn!(
                kind = e.error.kind.as_deref().unwrap_or("unknown"),
                code = e.error.code.as_deref().unwrap_or(""),
                message = %e.error.message,
                "Remote agent reported an error"
            );
        }
        ServerEvent::FunctionCallArgumentsDone(_) => {}
        ServerEvent::Other { kind, .. } => trace!(kind = %kind, "Ignoring control event"),
    }
}
