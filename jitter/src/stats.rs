/// Cumulative jitter buffer counters, all readable through `info`.
#[derive(Debug, Default, Clone)]
pub struct JitterStats {
    pub input_pkts: u64,
    pub output_pkts: u64,
    pub dedup_drops: u64,
    pub duplicate_drops: u64,
    pub rtcp_drops: u64,
    pub timestamp_jump_drops: u64,
    pub input_ooo: u64,
    pub max_input_ooo: u32,
    pub output_ooo: u64,
    pub max_output_ooo: u32,
    pub missing_seq: u64,
    pub max_consec_missing: u32,
    pub repaired_media: u64,
    pub repaired_sid: u64,
    pub sid_reuse_generated: u64,
    pub underrun_resyncs: u64,
    pub overrun_resyncs: u64,
    pub gap_resyncs: u64,
    pub holdoffs: u64,
    pub holdoff_deliveries: u64,
    pub min_seq: Option<u16>,
    pub max_seq: Option<u16>,
    pub min_timestamp: Option<u32>,
    pub max_timestamp: Option<u32>,
    pub cumulative_pulled_units: u64,
}

/// Readable info items, mirroring the engine's get/set info surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoItem {
    InputPktCount,
    OutputPktCount,
    DedupDrops,
    DuplicateDrops,
    InputOoo,
    MaxInputOoo,
    OutputOoo,
    MaxOutputOoo,
    MissingSeqNum,
    MaxConsecMissingSeqNum,
    RepairedMedia,
    RepairedSid,
    SidReuseGenerated,
    UnderrunResyncCount,
    OverrunResyncCount,
    TimestampGapResyncCount,
    HoldoffCount,
    HoldoffDeliveries,
    MinSeqNum,
    MaxSeqNum,
    MinTimestamp,
    MaxTimestamp,
    CumulativeTimestamp,
    TargetDelay,
    MinDelay,
    MaxDepthPtimes,
    NumPkts,
    SidRepairEnable,
}

/// Writable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetItem {
    TargetDelay,
    MinDelay,
    MaxDepthPtimes,
    SidRepairEnable,
    StatsReset,
}
