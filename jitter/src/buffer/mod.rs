#[cfg(test)]
mod buffer_test;

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use log::warn;
use util::time::{MicroSecs, Ptimes};

use crate::config::JitterConfig;
use crate::error::{Error, Result};
use crate::stats::{InfoItem, JitterStats, SetItem};
use crate::types::{
    AddResult, Delivered, DeliveredFlags, PacketMeta, PayloadKind, PullFlags,
};

const DEDUP_WINDOW: usize = 16;

#[derive(Debug, Clone)]
struct Entry {
    seq: u16,
    ext: u64,
    timestamp: u32,
    payload_type: u8,
    marker: bool,
    payload: Bytes,
    kind: PayloadKind,
    arrival: MicroSecs,
}

#[derive(Debug, Clone)]
struct LastDelivered {
    seq: u16,
    ext: u64,
    timestamp: u32,
    payload_type: u8,
    payload: Bytes,
    kind: PayloadKind,
}

/// Wrap-aware "a is before or equal to b" on 32-bit RTP timestamps.
fn ts_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) < 0x8000_0000
}

/// Forward distance from `a` to `b`, negative when `b` is behind `a`.
fn ts_diff(a: u32, b: u32) -> i64 {
    let d = b.wrapping_sub(a);
    if d < 0x8000_0000 {
        d as i64
    } else {
        -((u32::MAX - d + 1) as i64)
    }
}

/// Per-channel ordered delivery with repair, DTX expansion, dedup and
/// resync. Entries are keyed by extended (wrap-free) sequence number;
/// delivery follows a sync timestamp that advances one ptime per interval.
pub struct JitterBuffer {
    cfg: JitterConfig,
    entries: BTreeMap<u64, Entry>,
    ssrc: Option<u32>,
    highest_ext: Option<u64>,
    /// Next extended seq expected out.
    next_ext: Option<u64>,
    /// Sync timestamp; `None` until the buffer primes. The original engine
    /// used 0 as the unprimed marker, which collides with a legal RTP
    /// timestamp of zero.
    sync_ts: Option<u32>,
    base_pull_time: Option<MicroSecs>,
    elapsed_ptimes: u64,
    last_delivered: Option<LastDelivered>,
    /// Last seen comfort-noise payload, refreshed by every SID delivery.
    cn_payload: Option<Bytes>,
    dedup_window: VecDeque<(u16, u32)>,
    undeliverable_pulls: u32,
    holdoff_done_for: Option<u64>,
    probation_run: u32,
    probation_done: bool,
    last_added_ext: Option<u64>,
    flushed: bool,
    stats: JitterStats,
}

impl JitterBuffer {
    pub fn new(cfg: JitterConfig) -> Self {
        let probation_done = cfg.probation_packets == 0;
        JitterBuffer {
            cfg,
            entries: BTreeMap::new(),
            ssrc: None,
            highest_ext: None,
            next_ext: None,
            sync_ts: None,
            base_pull_time: None,
            elapsed_ptimes: 0,
            last_delivered: None,
            cn_payload: None,
            dedup_window: VecDeque::with_capacity(DEDUP_WINDOW),
            undeliverable_pulls: 0,
            holdoff_done_for: None,
            probation_run: 0,
            probation_done,
            last_added_ext: None,
            flushed: false,
            stats: JitterStats::default(),
        }
    }

    pub fn config(&self) -> &JitterConfig {
        &self.cfg
    }

    pub fn stats(&self) -> &JitterStats {
        &self.stats
    }

    pub fn depth_pkts(&self) -> usize {
        self.entries.len()
    }

    pub fn is_primed(&self) -> bool {
        self.sync_ts.is_some()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Maps a 16-bit sequence number onto the wrap-free axis, choosing the
    /// cycle closest to the highest sequence seen.
    fn extend_seq(&self, seq: u16) -> u64 {
        match self.highest_ext {
            None => (1u64 << 16) | seq as u64,
            Some(highest) => {
                let cycle = highest >> 16;
                let mut best = (cycle << 16) | seq as u64;
                let mut best_dist = best.abs_diff(highest);
                for c in [cycle.wrapping_sub(1), cycle + 1] {
                    if c == 0 && cycle == 0 {
                        continue;
                    }
                    let cand = (c << 16) | seq as u64;
                    let dist = cand.abs_diff(highest);
                    if dist < best_dist {
                        best = cand;
                        best_dist = dist;
                    }
                }
                best
            }
        }
    }

    /// Validates and inserts one packet.
    pub fn add(&mut self, pkt: PacketMeta) -> Result<AddResult> {
        if self.flushed {
            return Err(Error::ErrFlushed);
        }

        if crate::is_rtcp_pt(pkt.payload_type) {
            self.stats.rtcp_drops += 1;
            return Ok(AddResult::RtcpDrop);
        }

        match self.ssrc {
            None => self.ssrc = Some(pkt.ssrc),
            Some(s) if s != pkt.ssrc => {
                self.stats.duplicate_drops += 1;
                return Ok(AddResult::SsrcMismatchDrop);
            }
            _ => {}
        }

        // RFC 7198 temporal redundancy: identical (seq, timestamp) within
        // a short window.
        if self.cfg.enable_dedup
            && self
                .dedup_window
                .iter()
                .any(|&(s, t)| s == pkt.seq && t == pkt.timestamp)
        {
            self.stats.dedup_drops += 1;
            return Ok(AddResult::DedupDrop);
        }

        let ext = self.extend_seq(pkt.seq);

        if self.entries.contains_key(&ext) {
            self.stats.duplicate_drops += 1;
            return Ok(AddResult::DuplicateDrop);
        }
        if let Some(next) = self.next_ext {
            if ext < next {
                // already delivered past this point
                self.stats.duplicate_drops += 1;
                return Ok(AddResult::DuplicateDrop);
            }
        }

        // timestamp range screen against the expected delivery point
        if let Some(expected) = self.expected_next_ts() {
            let d = ts_diff(expected, pkt.timestamp);
            if d.unsigned_abs() > self.cfg.max_timestamp_gap as u64 {
                if self.cfg.allow_gap_resync && d > 0 {
                    self.resync_to(pkt.timestamp, ext);
                    self.stats.gap_resyncs += 1;
                    warn!(
                        "jitter buffer timestamp gap resync to ts {} (gap {})",
                        pkt.timestamp, d
                    );
                } else if !self.cfg.allow_timestamp_jump {
                    self.stats.timestamp_jump_drops += 1;
                    return Ok(AddResult::TimestampJumpDrop);
                }
            }
        }

        if self.dedup_window.len() == DEDUP_WINDOW {
            self.dedup_window.pop_front();
        }
        self.dedup_window.push_back((pkt.seq, pkt.timestamp));

        // ooo accounting against the high-water sequence
        if let Some(highest) = self.highest_ext {
            if ext < highest {
                self.stats.input_ooo += 1;
                let displacement = (highest - ext) as u32;
                self.stats.max_input_ooo = self.stats.max_input_ooo.max(displacement);
            } else {
                self.highest_ext = Some(ext);
            }
        } else {
            self.highest_ext = Some(ext);
        }

        // probation: require a run of consecutive in-order packets
        if !self.probation_done {
            match self.last_added_ext {
                Some(last) if ext == last + 1 => self.probation_run += 1,
                _ => self.probation_run = 1,
            }
            if self.probation_run >= self.cfg.probation_packets {
                self.probation_done = true;
            }
        }
        self.last_added_ext = Some(ext);

        self.stats.input_pkts += 1;
        self.stats.min_seq = Some(self.stats.min_seq.map_or(pkt.seq, |s| s.min(pkt.seq)));
        self.stats.max_seq = Some(self.stats.max_seq.map_or(pkt.seq, |s| s.max(pkt.seq)));
        self.stats.min_timestamp = Some(match self.stats.min_timestamp {
            Some(t) if ts_le(t, pkt.timestamp) => t,
            _ => pkt.timestamp,
        });
        self.stats.max_timestamp = Some(match self.stats.max_timestamp {
            Some(t) if ts_le(pkt.timestamp, t) => t,
            _ => pkt.timestamp,
        });

        self.entries.insert(
            ext,
            Entry {
                seq: pkt.seq,
                ext,
                timestamp: pkt.timestamp,
                payload_type: pkt.payload_type,
                marker: pkt.marker,
                payload: pkt.payload,
                kind: pkt.kind,
                arrival: pkt.arrival,
            },
        );

        // overrun: hard depth cap, drop oldest and advance
        while self.entries.len() > self.cfg.max_depth.0 as usize {
            if let Some((&oldest, _)) = self.entries.iter().next() {
                self.entries.remove(&oldest);
                self.stats.overrun_resyncs += 1;
                if let Some((&new_first, first)) = self.entries.iter().next() {
                    self.next_ext = Some(new_first);
                    if self.sync_ts.is_some() {
                        self.sync_ts = Some(first.timestamp);
                        self.elapsed_ptimes = 0;
                        self.base_pull_time = None;
                    }
                }
                warn!("jitter buffer overrun, dropped oldest entry");
            }
        }

        self.try_prime();
        Ok(AddResult::Buffered)
    }

    /// Timestamp the next delivery is expected to carry.
    fn expected_next_ts(&self) -> Option<u32> {
        if let Some(last) = &self.last_delivered {
            Some(last.timestamp.wrapping_add(self.cfg.units_per_ptime()))
        } else {
            self.sync_ts
        }
    }

    fn resync_to(&mut self, ts: u32, ext: u64) {
        self.sync_ts = Some(ts);
        self.next_ext = Some(ext);
        self.elapsed_ptimes = 0;
        self.base_pull_time = None;
        self.last_delivered = None;
    }

    fn try_prime(&mut self) {
        if self.sync_ts.is_some() {
            return;
        }
        if self.entries.len() >= self.cfg.target_delay.0 as usize {
            if let Some((&first_ext, first)) = self.entries.iter().next() {
                self.sync_ts = Some(first.timestamp);
                self.next_ext = Some(first_ext);
            }
        }
    }

    /// Delivers everything currently orderable and refuses further adds.
    pub fn flush(&mut self, now: MicroSecs) -> Vec<Delivered> {
        let out = self.pull(
            now,
            PullFlags {
                flush: true,
                ..Default::default()
            },
        );
        out
    }

    /// Ordered pull. `now` drives the delivery window unless FTRT or
    /// return-all/flush are in effect.
    pub fn pull(&mut self, now: MicroSecs, flags: PullFlags) -> Vec<Delivered> {
        let drain = flags.return_all || flags.flush;

        if flags.flush {
            self.flushed = true;
        }
        if !self.probation_done && !drain {
            return Vec::new();
        }

        if self.sync_ts.is_none() {
            if drain && !self.entries.is_empty() {
                // prime off the earliest entry so ordering rules apply
                if let Some((&first_ext, first)) = self.entries.iter().next() {
                    self.sync_ts = Some(first.timestamp);
                    self.next_ext = Some(first_ext);
                }
            } else {
                return Vec::new();
            }
        }

        // advance the delivery clock
        if !drain {
            if flags.ftrt {
                self.elapsed_ptimes += 1;
            } else {
                match self.base_pull_time {
                    None => {
                        self.base_pull_time = Some(now);
                        self.elapsed_ptimes = 1;
                    }
                    Some(base) => {
                        let ptime_us = self.cfg.ptime.as_micros().0.max(1);
                        self.elapsed_ptimes = (now.saturating_sub(base).0 / ptime_us) + 1;
                    }
                }
            }
        }

        let units = self.cfg.units_per_ptime();
        let sync = self.sync_ts.expect("primed above");
        let window_end = sync.wrapping_add(
            (self.elapsed_ptimes as u32).wrapping_mul(units),
        );

        let mut out = Vec::new();

        loop {
            let (first_ext, deliverable) = match self.entries.iter().next() {
                None => break,
                Some((&e, entry)) => {
                    let ok = drain || ts_le(entry.timestamp, window_end.wrapping_sub(units));
                    (e, ok)
                }
            };
            if !deliverable {
                break;
            }

            // single-packet hold-off: give a late outlier one more ptime
            if self.cfg.enable_holdoff
                && !drain
                && self.entries.len() == 1
                && self.holdoff_done_for != Some(first_ext)
            {
                self.holdoff_done_for = Some(first_ext);
                self.stats.holdoffs += 1;
                break;
            }

            let entry = self.entries.remove(&first_ext).expect("checked above");
            let next = self.next_ext.unwrap_or(first_ext);

            let mut flags_out = DeliveredFlags::default();
            if first_ext > next {
                let gap = (first_ext - next) as u32;
                self.stats.missing_seq += gap as u64;
                self.stats.max_consec_missing = self.stats.max_consec_missing.max(gap);
                if !self.emit_gap_fill(gap, next, &mut out) {
                    flags_out.set(DeliveredFlags::SEQ_GAP);
                }
            }
            if self.holdoff_done_for == Some(first_ext) {
                flags_out.set(DeliveredFlags::HOLDOFF_DELIVERY);
                self.stats.holdoff_deliveries += 1;
            }

            if entry.kind == PayloadKind::Sid {
                self.cn_payload = Some(entry.payload.clone());
            }

            self.stats.output_pkts += 1;
            self.stats.cumulative_pulled_units += units as u64;
            self.last_delivered = Some(LastDelivered {
                seq: entry.seq,
                ext: entry.ext,
                timestamp: entry.timestamp,
                payload_type: entry.payload_type,
                payload: entry.payload.clone(),
                kind: entry.kind,
            });
            self.next_ext = Some(entry.ext + 1);

            out.push(Delivered {
                seq: entry.seq,
                timestamp: entry.timestamp,
                ssrc: self.ssrc.unwrap_or(0),
                payload_type: entry.payload_type,
                marker: entry.marker,
                payload: entry.payload,
                kind: entry.kind,
                flags: flags_out,
            });
        }

        // DTX expansion: fill silence after a SID up to the window edge
        if self.cfg.enable_dtx && !drain {
            self.expand_dtx(window_end, &mut out);
        }

        // underrun bookkeeping
        if out.is_empty() && !drain {
            if !self.entries.is_empty() {
                self.undeliverable_pulls += 1;
                if self.undeliverable_pulls >= self.cfg.underrun_resync_pulls {
                    if let Some((&first_ext, first)) = self.entries.iter().next() {
                        let ts = first.timestamp;
                        self.resync_to(ts, first_ext);
                        self.stats.underrun_resyncs += 1;
                        warn!("jitter buffer underrun resync to ts {ts}");
                    }
                    self.undeliverable_pulls = 0;
                }
            }
        } else if !out.is_empty() {
            self.undeliverable_pulls = 0;
        }

        out
    }

    /// Repairs a run of missing packets. Returns false when repair does not
    /// apply, in which case the caller flags the gap on the next delivery.
    fn emit_gap_fill(&mut self, gap: u32, next: u64, out: &mut Vec<Delivered>) -> bool {
        let units = self.cfg.units_per_ptime();
        let repairable = self.cfg.enable_packet_repair
            && gap <= self.cfg.max_pkt_repair.0
            && matches!(
                self.last_delivered.as_ref().map(|l| l.kind),
                Some(PayloadKind::Media)
            );
        let sid_repairable = self.cfg.enable_sid_repair
            && matches!(
                self.last_delivered.as_ref().map(|l| l.kind),
                Some(PayloadKind::Sid)
            );

        if repairable {
            let last = self.last_delivered.clone().expect("media last checked");
            for k in 0..gap {
                let mut f = DeliveredFlags::default();
                f.set(DeliveredFlags::REPAIRED);
                let ts = last.timestamp.wrapping_add(units.wrapping_mul(k + 1));
                out.push(Delivered {
                    seq: (next + k as u64) as u16,
                    timestamp: ts,
                    ssrc: self.ssrc.unwrap_or(0),
                    payload_type: last.payload_type,
                    marker: false,
                    payload: last.payload.clone(),
                    kind: PayloadKind::Media,
                    flags: f,
                });
                self.stats.repaired_media += 1;
                self.stats.output_pkts += 1;
            }
            self.last_delivered = Some(LastDelivered {
                seq: (next + gap as u64 - 1) as u16,
                ext: next + gap as u64 - 1,
                timestamp: last.timestamp.wrapping_add(units.wrapping_mul(gap)),
                ..last
            });
            true
        } else if sid_repairable {
            let last = self.last_delivered.clone().expect("sid last checked");
            let payload = self.cn_payload.clone().unwrap_or_else(|| last.payload.clone());
            for k in 0..gap {
                let mut f = DeliveredFlags::default();
                f.set(DeliveredFlags::SID_REUSE);
                out.push(Delivered {
                    seq: (next + k as u64) as u16,
                    timestamp: last.timestamp.wrapping_add(units.wrapping_mul(k + 1)),
                    ssrc: self.ssrc.unwrap_or(0),
                    payload_type: last.payload_type,
                    marker: false,
                    payload: payload.clone(),
                    kind: PayloadKind::Sid,
                    flags: f,
                });
                self.stats.repaired_sid += 1;
                self.stats.output_pkts += 1;
            }
            true
        } else {
            false
        }
    }

    /// Emits SID_REUSE / SID_NODATA packets at ptime cadence while the last
    /// delivered packet was a SID and no media is due.
    fn expand_dtx(&mut self, window_end: u32, out: &mut Vec<Delivered>) {
        let units = self.cfg.units_per_ptime();
        loop {
            let last = match &self.last_delivered {
                Some(l) if l.kind == PayloadKind::Sid => l.clone(),
                _ => break,
            };
            let next_ts = last.timestamp.wrapping_add(units);
            if !ts_le(next_ts, window_end.wrapping_sub(units)) {
                break;
            }
            // stop at the next queued packet
            if let Some((_, first)) = self.entries.iter().next() {
                if ts_le(first.timestamp, next_ts) {
                    break;
                }
            }
            let (payload, bit) = match &self.cn_payload {
                Some(p) => (p.clone(), DeliveredFlags::SID_REUSE),
                None => (Bytes::new(), DeliveredFlags::SID_NODATA),
            };
            let mut f = DeliveredFlags::default();
            f.set(bit);
            out.push(Delivered {
                seq: last.seq,
                timestamp: next_ts,
                ssrc: self.ssrc.unwrap_or(0),
                payload_type: last.payload_type,
                marker: false,
                payload,
                kind: PayloadKind::Sid,
                flags: f,
            });
            self.stats.sid_reuse_generated += 1;
            self.last_delivered = Some(LastDelivered {
                timestamp: next_ts,
                ..last
            });
        }
    }

    /// Readable counter surface.
    pub fn info(&self, item: InfoItem) -> i64 {
        use InfoItem::*;
        match item {
            InputPktCount => self.stats.input_pkts as i64,
            OutputPktCount => self.stats.output_pkts as i64,
            DedupDrops => self.stats.dedup_drops as i64,
            DuplicateDrops => self.stats.duplicate_drops as i64,
            InputOoo => self.stats.input_ooo as i64,
            MaxInputOoo => self.stats.max_input_ooo as i64,
            OutputOoo => self.stats.output_ooo as i64,
            MaxOutputOoo => self.stats.max_output_ooo as i64,
            MissingSeqNum => self.stats.missing_seq as i64,
            MaxConsecMissingSeqNum => self.stats.max_consec_missing as i64,
            RepairedMedia => self.stats.repaired_media as i64,
            RepairedSid => self.stats.repaired_sid as i64,
            SidReuseGenerated => self.stats.sid_reuse_generated as i64,
            UnderrunResyncCount => self.stats.underrun_resyncs as i64,
            OverrunResyncCount => self.stats.overrun_resyncs as i64,
            TimestampGapResyncCount => self.stats.gap_resyncs as i64,
            HoldoffCount => self.stats.holdoffs as i64,
            HoldoffDeliveries => self.stats.holdoff_deliveries as i64,
            MinSeqNum => self.stats.min_seq.map_or(-1, |v| v as i64),
            MaxSeqNum => self.stats.max_seq.map_or(-1, |v| v as i64),
            MinTimestamp => self.stats.min_timestamp.map_or(-1, |v| v as i64),
            MaxTimestamp => self.stats.max_timestamp.map_or(-1, |v| v as i64),
            CumulativeTimestamp => self.stats.cumulative_pulled_units as i64,
            TargetDelay => self.cfg.target_delay.0 as i64,
            MinDelay => self.cfg.min_delay.0 as i64,
            MaxDepthPtimes => self.cfg.max_depth.0 as i64,
            NumPkts => self.entries.len() as i64,
            SidRepairEnable => self.cfg.enable_sid_repair as i64,
        }
    }

    /// Writable knobs.
    pub fn set_info(&mut self, item: SetItem, value: i64) -> Result<()> {
        match item {
            SetItem::TargetDelay => {
                if !(0..=1024).contains(&value) {
                    return Err(Error::ErrValueOutOfRange(value, "target delay"));
                }
                self.cfg.target_delay = Ptimes(value as u32);
            }
            SetItem::MinDelay => {
                if !(0..=1024).contains(&value) {
                    return Err(Error::ErrValueOutOfRange(value, "min delay"));
                }
                self.cfg.min_delay = Ptimes(value as u32);
            }
            SetItem::MaxDepthPtimes => {
                if !(1..=4096).contains(&value) {
                    return Err(Error::ErrValueOutOfRange(value, "max depth"));
                }
                self.cfg.max_depth = Ptimes(value as u32);
            }
            SetItem::SidRepairEnable => {
                self.cfg.enable_sid_repair = value != 0;
            }
            SetItem::StatsReset => {
                self.stats = JitterStats::default();
            }
        }
        Ok(())
    }
}
