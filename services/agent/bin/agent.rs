//! Main Entrypoint for the Agent
//!
//! Loads configuration, registers this device's tools, negotiates a WebRTC
//! session through the relay and runs the control channel until the remote
//! side closes it or the user presses Ctrl+C.

use anyhow::Context;
use clap::Parser;
use rtc_agent::{
    config::Config,
    hand::{HandActuator, HttpHand},
    page::PageSurface,
    tools::build_registry,
};
use rtc_agent_core::{Bridge, HttpRelay, SessionNegotiator};
use rtc_agent_webrtc::{InboundMediaSink, LoggingSink, OggRecorder, WebRtcTransport};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Connects this device to a remote realtime agent over WebRTC")]
struct Cli {
    /// Relay endpoint that exchanges the SDP offer for an answer
    #[arg(long)]
    relay_url: Option<String>,
    /// Instructions for the remote agent
    #[arg(long)]
    instructions: Option<String>,
    #[arg(long)]
    voice: Option<String>,
    /// HTML document the color tools act on
    #[arg(long)]
    page: Option<PathBuf>,
    /// Hand controller URL; enables the showFingers tool
    #[arg(long)]
    hand_url: Option<String>,
    /// Record inbound audio to this Ogg file
    #[arg(long)]
    record: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.relay_url {
            config.relay_url = v;
        }
        if let Some(v) = self.instructions {
            config.instructions = Some(v);
        }
        if let Some(v) = self.voice {
            config.voice = Some(v);
        }
        if let Some(v) = self.page {
            config.page_path = Some(v);
        }
        if let Some(v) = self.hand_url {
            config.hand_url = Some(v);
        }
        if let Some(v) = self.record {
            config.record_path = Some(v);
        }
    }
}

/// Resolves on `Ctrl+C`. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Closing session...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid command line override")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Registering tools...");

    // --- 3. Register Tools ---
    let page = Arc::new(match &config.page_path {
        Some(path) => PageSurface::load(path)?,
        None => PageSurface::default(),
    });
    let hand = config
        .hand_url
        .as_ref()
        .map(|url| Arc::new(HttpHand::new(url.clone())) as Arc<dyn HandActuator>);
    let registry = Arc::new(build_registry(page, hand).context("Failed to register tools")?);
    info!(tools = ?registry.names(), "Tools registered");

    // --- 4. Negotiate ---
    let sink: Arc<dyn InboundMediaSink> = match &config.record_path {
        Some(path) => Arc::new(OggRecorder::new(path.clone())),
        None => Arc::new(LoggingSink),
    };
    let transport = Arc::new(WebRtcTransport::new(&config.webrtc_config(), sink).await?);
    let relay = Arc::new(HttpRelay::new(config.relay_url.clone()));
    info!(relay = %config.relay_url, "Negotiating session...");
    let mut session = SessionNegotiator::new(transport, relay)
        .negotiate()
        .await
        .context("Session negotiation failed")?;
    let control = session
        .take_control_channel()
        .context("Negotiated session has no control channel")?;

    // --- 5. Run Until Closed ---
    let bridge = Bridge::new(registry, config.session_options());
    tokio::select! {
        stats = bridge.run(control) => info!(?stats, "Remote side closed the control channel"),
        state = session.terminated() => warn!(?state, "Transport ended; tearing down session"),
        _ = shutdown_signal() => {}
    }

    session.close().await?;
    info!("Session closed.");
    Ok(())
}
