//! Receive statistics for a remote audio track

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::peer::RemoteAudioTrack;

/// Interval between progress log lines
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Running totals of received RTP
#[derive(Debug, Clone)]
pub struct RtpProgress {
    started: Instant,
    first_sequence: Option<u16>,
    packets: u16,
    bytes: usize,
}

impl RtpProgress {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            first_sequence: None,
            packets: 0,
            bytes: 0,
        }
    }

    /// Account for one packet
    pub fn record(&mut self, sequence_number: u16, payload_len: usize) {
        let first = *self.first_sequence.get_or_insert(sequence_number);
        self.packets = sequence_number.wrapping_sub(first);
        self.bytes += payload_len;
    }

    /// Packets since the first one, by sequence number
    pub fn packets(&self) -> u16 {
        self.packets
    }

    /// Payload bytes received
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RtpProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RtpProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.elapsed().as_secs_f64().max(f64::EPSILON);
        write!(
            f,
            "packet {}, data: {} bytes, speed: {:.0} bytes/sec, {:.0} pack/sec, duration: {:.1} sec",
            self.packets,
            self.bytes,
            self.bytes as f64 / seconds,
            f64::from(self.packets) / seconds,
            seconds
        )
    }
}

/// Read `track` until it ends.
///
/// Reading keeps the RTP pipeline flowing. With `report` set, throughput is
/// logged every [`PROGRESS_INTERVAL`].
pub async fn drain_remote_track(track: RemoteAudioTrack, report: bool) -> RtpProgress {
    let mut progress = RtpProgress::new();
    let mut last_report = Instant::now();

    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                progress.record(packet.header.sequence_number, packet.payload.len());
                if report && last_report.elapsed() >= PROGRESS_INTERVAL {
                    info!("ssrc {}: {}", track.ssrc(), progress);
                    last_report = Instant::now();
                }
            }
            Err(e) => {
                warn!("Remote track {} ended: {}", track.ssrc(), e);
                break;
            }
        }
    }
    progress
}
