use util::time::{MilliSecs, Ptimes};

/// Jitter buffer configuration. Delay values are in ptime units, matching
/// how depth is measured.
#[derive(Debug, Clone)]
pub struct JitterConfig {
    pub ptime: MilliSecs,
    pub sample_rate: u32,
    /// Depth at which the buffer primes and starts delivering.
    pub target_delay: Ptimes,
    pub min_delay: Ptimes,
    /// Hard depth cap; exceeding it drops the oldest entry.
    pub max_depth: Ptimes,
    /// Longest run of consecutive lost media packets that will be repaired.
    pub max_pkt_repair: Ptimes,
    /// RTP-unit gap that triggers a large-gap resync (or a reject when
    /// resync is not allowed).
    pub max_timestamp_gap: u32,
    /// Consecutive undeliverable pulls before an underrun resync.
    pub underrun_resync_pulls: u32,
    /// In-order packets required before delivery starts. Zero disables.
    pub probation_packets: u32,
    pub enable_dedup: bool,
    pub enable_sid_repair: bool,
    pub enable_dtx: bool,
    pub enable_holdoff: bool,
    pub enable_packet_repair: bool,
    pub allow_timestamp_jump: bool,
    pub allow_gap_resync: bool,
}

impl Default for JitterConfig {
    fn default() -> Self {
        JitterConfig {
            ptime: MilliSecs(20),
            sample_rate: 8000,
            target_delay: Ptimes(10),
            min_delay: Ptimes(2),
            max_depth: Ptimes(64),
            max_pkt_repair: Ptimes(3),
            max_timestamp_gap: 8000 * 30, // 30 s at narrowband
            underrun_resync_pulls: 3,
            probation_packets: 0,
            enable_dedup: true,
            enable_sid_repair: true,
            enable_dtx: true,
            enable_holdoff: false,
            enable_packet_repair: true,
            allow_timestamp_jump: false,
            allow_gap_resync: true,
        }
    }
}

impl JitterConfig {
    /// RTP timestamp units per packetization interval.
    pub fn units_per_ptime(&self) -> u32 {
        (self.ptime.0 as u32) * (self.sample_rate / 1000)
    }
}
