use bytes::Bytes;
use util::time::MicroSecs;

/// Classification of an RTP payload, supplied by the caller (the session
/// layer knows the codec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Media,
    Sid,
    Event,
}

/// What the buffer needs to know about one arriving packet.
#[derive(Debug, Clone)]
pub struct PacketMeta {
    pub seq: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload_type: u8,
    pub marker: bool,
    pub payload: Bytes,
    pub kind: PayloadKind,
    pub arrival: MicroSecs,
}

/// Outcome of an `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    Buffered,
    /// RFC 7198 duplicate within the dedup window.
    DedupDrop,
    /// Same sequence number already buffered.
    DuplicateDrop,
    /// RTCP payload type.
    RtcpDrop,
    /// Timestamp outside the accepted range with jump and resync disabled.
    TimestampJumpDrop,
    /// Packet for a different SSRC than the channel's.
    SsrcMismatchDrop,
}

impl AddResult {
    pub fn buffered(self) -> bool {
        self == AddResult::Buffered
    }
}

/// Flags for an ordered pull.
#[derive(Debug, Default, Clone, Copy)]
pub struct PullFlags {
    /// Deliver everything queued regardless of the timestamp window.
    pub return_all: bool,
    /// Faster than real time: the delivery clock advances one ptime per
    /// call instead of following wall time.
    pub ftrt: bool,
    /// Final drain: like `return_all` and the buffer rejects further adds.
    pub flush: bool,
    /// Request a large-gap resync check on this pull. Ignored while
    /// `return_all` (or `flush`) is in effect.
    pub timestamp_gap_resync: bool,
}

/// Disposition bits on a delivered packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveredFlags(pub u32);

impl DeliveredFlags {
    pub const REPAIRED: u32 = 1 << 0;
    pub const SID_REUSE: u32 = 1 << 1;
    pub const SID_NODATA: u32 = 1 << 2;
    /// An unrepaired gap immediately precedes this packet.
    pub const SEQ_GAP: u32 = 1 << 3;
    pub const HOLDOFF_DELIVERY: u32 = 1 << 4;

    pub fn set(&mut self, bit: u32) {
        self.0 |= bit;
    }

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// One packet leaving the buffer in timestamp order.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub seq: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload_type: u8,
    pub marker: bool,
    pub payload: Bytes,
    pub kind: PayloadKind,
    pub flags: DeliveredFlags,
}
