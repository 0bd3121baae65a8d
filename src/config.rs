use serde::{Deserialize, Serialize};
use util::time::{MicroSecs, MilliSecs};

/// Hard ceiling on the worker pool size.
pub const MAX_PKT_MEDIA_THREADS: usize = 16;
/// Default ceiling on concurrent stream groups.
pub const MAX_STREAM_GROUPS: usize = 256;

/// Engine-wide configuration. All capacity ceilings are fixed at
/// construction; the tables are pre-allocated to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_sessions: usize,
    pub max_stream_groups: usize,
    pub num_workers: usize,
    /// Per-session per-direction queue capacity in packets.
    pub queue_capacity: usize,
    /// No input for this long puts a worker into energy saver. Zero
    /// disables the state.
    pub energy_saver_inactivity: MilliSecs,
    /// Sleep per cycle while in energy saver.
    pub energy_saver_sleep: MicroSecs,
    /// A tick running longer than this logs a WARNING.
    pub preemption_alarm: MilliSecs,
    /// With the alarm enabled, no push for this long logs a WARNING.
    pub push_alarm: MilliSecs,
    pub enable_push_alarm: bool,
    /// Consecutive packets on a new SSRC before an RFC 8108 child becomes
    /// the current channel.
    pub ssrc_run_threshold: u32,
    pub max_history_entries_per_chan: usize,
    /// Linear assignment fills a worker to these nominal counts before
    /// spilling to the next.
    pub linear_capacity_sessions: usize,
    pub linear_capacity_groups: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_sessions: 128,
            max_stream_groups: MAX_STREAM_GROUPS,
            num_workers: 1,
            queue_capacity: 512,
            energy_saver_inactivity: MilliSecs(20_000),
            energy_saver_sleep: MicroSecs(1000),
            preemption_alarm: MilliSecs(40),
            push_alarm: MilliSecs(1000),
            enable_push_alarm: false,
            ssrc_run_threshold: 2,
            max_history_entries_per_chan: 300_000,
            linear_capacity_sessions: 51,
            linear_capacity_groups: 17,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.num_workers == 0 || self.num_workers > MAX_PKT_MEDIA_THREADS {
            return Err(crate::error::Error::BadConfig(
                "num_workers must be 1..=16",
            ));
        }
        if self.max_sessions == 0 || self.queue_capacity == 0 {
            return Err(crate::error::Error::BadConfig(
                "max_sessions and queue_capacity must be nonzero",
            ));
        }
        Ok(())
    }
}
