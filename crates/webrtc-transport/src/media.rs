//! Inbound media
//!
//! Remote tracks arrive through the peer connection's `on_track` callback and
//! are handed to an [`InboundMediaSink`]. Playback devices are out of scope
//! here; the sinks below either account for the packets or record the audio
//! to an Ogg/Opus file.

use std::{
    fs::File,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, error, info, warn};
use webrtc::{
    media::io::{Writer, ogg_writer::OggWriter},
    rtp_transceiver::rtp_codec::RTPCodecType,
    track::track_remote::TrackRemote,
};

/// Receives each remote track once, as soon as it is negotiated.
///
/// Implementations must return quickly: `attach` runs inside the peer
/// connection's callback, so reading the track belongs in a spawned task.
pub trait InboundMediaSink: Send + Sync {
    fn attach(&self, track: Arc<TrackRemote>);
}

/// Drains every track and logs what came through.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl InboundMediaSink for LoggingSink {
    fn attach(&self, track: Arc<TrackRemote>) {
        tokio::spawn(drain(track));
    }
}

async fn drain(track: Arc<TrackRemote>) {
    let kind = track.kind();
    let ssrc = track.ssrc();
    let mut packets = 0u64;
    let mut bytes = 0usize;
    while let Ok((packet, _)) = track.read_rtp().await {
        packets += 1;
        bytes += packet.payload.len();
        if packets % 500 == 0 {
            debug!(%kind, ssrc, packets, bytes, "Remote media flowing");
        }
    }
    info!(%kind, ssrc, packets, bytes, "Remote track ended");
}

/// Writes the first remote audio track to an Ogg/Opus file. Anything else is
/// drained like [`LoggingSink`] does.
pub struct OggRecorder {
    path: PathBuf,
    claimed: AtomicBool,
}

impl OggRecorder {
    pub const SAMPLE_RATE: u32 = 48000;
    pub const CHANNELS: u16 = 2;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            claimed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl InboundMediaSink for OggRecorder {
    fn attach(&self, track: Arc<TrackRemote>) {
        let is_audio = track.kind() == RTPCodecType::Audio;
        if !is_audio || self.claimed.swap(true, Ordering::SeqCst) {
            tokio::spawn(drain(track));
            return;
        }

        let path = self.path.clone();
        tokio::spawn(async move {
            let file = match File::create(&path) {
                Ok(file) => file,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Cannot create recording, draining instead");
                    return drain(track).await;
                }
            };
            let mut writer = match OggWriter::new(file, OggRecorder::SAMPLE_RATE, OggRecorder::CHANNELS as u8) {
                Ok(writer) => writer,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Cannot start Ogg stream, draining instead");
                    return drain(track).await;
                }
            };

            info!(path = %path.display(), ssrc = track.ssrc(), "Recording remote audio");
            let mut packets = 0u64;
            while let Ok((packet, _)) = track.read_rtp().await {
                if let Err(e) = writer.write_rtp(&packet) {
                    warn!(error = %e, "Dropping audio packet");
                    continue;
                }
                packets += 1;
            }
            if let Err(e) = writer.close() {
                warn!(error = %e, "Failed to finalize recording");
            }
            info!(path = %path.display(), packets, "Recording finished");
        });
    }
}
